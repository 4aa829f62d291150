//! Feed posts
//!
//! [`RawPost`] is whatever the feed handed us, every field optional so a
//! bad record can be reported instead of failing the whole page.
//! [`Post`] is the validated, immutable record stored in the ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// Longest post text kept (in chars); the rest is dropped at ingestion
pub const MAX_TEXT_CHARS: usize = 20_000;

/// Post identifier as delivered by the feed (string or number)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawId {
    Text(String),
    Number(i64),
}

impl RawId {
    fn into_string(self) -> String {
        match self {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

/// Author as delivered by the feed: a bare name or a profile object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawAuthor {
    Name(String),
    Profile { name: Option<String> },
}

/// Raw feed record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPost {
    #[serde(default)]
    pub id: Option<RawId>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, alias = "content")]
    pub text: Option<String>,
    #[serde(default)]
    pub author: Option<RawAuthor>,
    /// ISO-8601 publication time
    #[serde(default, alias = "created_at")]
    pub timestamp: Option<String>,
    #[serde(default, alias = "upvotes")]
    pub likes: Option<i64>,
    #[serde(default, alias = "comment_count")]
    pub comments: Option<i64>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl RawPost {
    /// Convenience constructor for the common `{id, text, author, likes, comments}` shape
    pub fn new(id: &str, text: &str, author: &str, likes: i64, comments: i64) -> Self {
        Self {
            id: Some(RawId::Text(id.to_string())),
            title: None,
            text: Some(text.to_string()),
            author: Some(RawAuthor::Name(author.to_string())),
            timestamp: None,
            likes: Some(likes),
            comments: Some(comments),
            tags: Vec::new(),
        }
    }

    /// Identifier for log lines, even when the record is malformed
    pub fn display_id(&self) -> String {
        match &self.id {
            Some(RawId::Text(s)) => s.clone(),
            Some(RawId::Number(n)) => n.to_string(),
            None => "<missing>".to_string(),
        }
    }
}

/// Validated feed post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: Option<String>,
    pub text: String,
    pub author: String,
    pub posted_at: DateTime<Utc>,
    pub likes: u64,
    pub comments: u64,
    pub tags: Vec<String>,
    pub ingested_at: DateTime<Utc>,
}

impl Post {
    /// Validate and normalize a raw record
    ///
    /// Missing or blank `id`/`text` and unparsable timestamps are
    /// [`PipelineError::MalformedInput`]. A missing timestamp falls back to
    /// `ingested_at`; negative counters clamp to zero.
    pub fn from_raw(raw: RawPost, ingested_at: DateTime<Utc>) -> Result<Self, PipelineError> {
        let id = raw
            .id
            .map(RawId::into_string)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty())
            .ok_or_else(|| PipelineError::MalformedInput("post has no id".to_string()))?;

        let text = raw
            .text
            .map(|t| truncate_chars(t.trim(), MAX_TEXT_CHARS))
            .filter(|t| !t.is_empty())
            .ok_or_else(|| PipelineError::MalformedInput(format!("post {} has no text", id)))?;

        let posted_at = match raw.timestamp.as_deref().map(str::trim) {
            None | Some("") => ingested_at,
            Some(ts) => DateTime::parse_from_rfc3339(ts)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| {
                    PipelineError::MalformedInput(format!(
                        "post {} has invalid timestamp {:?}: {}",
                        id, ts, e
                    ))
                })?,
        };

        let author = match raw.author {
            Some(RawAuthor::Name(name)) => name,
            Some(RawAuthor::Profile { name: Some(name) }) => name,
            _ => String::new(),
        };
        let author = match author.trim() {
            "" => "unknown".to_string(),
            name => name.to_string(),
        };

        let title = raw
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());

        let tags = raw
            .tags
            .into_iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect();

        Ok(Self {
            id,
            title,
            text,
            author,
            posted_at,
            likes: raw.likes.unwrap_or(0).max(0) as u64,
            comments: raw.comments.unwrap_or(0).max(0) as u64,
            tags,
            ingested_at,
        })
    }
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((byte_idx, _)) => s[..byte_idx].to_string(),
        None => s.to_string(),
    }
}
