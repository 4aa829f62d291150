//! Ingestion Buffer
//!
//! Validates raw feed records, drops already-seen post ids and persists
//! the post together with its derived candidate.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::db::posts::{insert_post_with_candidate, post_exists};
use crate::error::PipelineError;
use crate::models::{Candidate, Category, Post, RawPost, TextFeatures};
use crate::utils::db_retry::{retry_on_lock, DEFAULT_MAX_LOCK_WAIT_MS};

/// Matches a category needs before it is chosen over `other`
pub const MIN_CATEGORY_MATCHES: usize = 2;

/// Keyword list per category, in tie-break order
pub const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::AiApplication,
        &["ai", "agent", "llm", "gpt", "chatbot", "assistant", "智能", "人工智能"],
    ),
    (
        Category::Automation,
        &["automation", "workflow", "pipeline", "automate", "no-code", "自动化", "工作流"],
    ),
    (
        Category::Tool,
        &[
            "tool", "cli", "library", "framework", "sdk", "api", "template", "generator",
            "dashboard", "工具", "模板",
        ],
    ),
    (
        Category::Platform,
        &["platform", "marketplace", "saas", "subscription", "平台"],
    ),
];

/// Result of offering one raw post to the buffer
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// New post; persisted with its candidate
    Ingested(Candidate),
    /// Post id already in the ledger; nothing written
    Skipped { post_id: String },
}

pub struct IngestionBuffer {
    db: SqlitePool,
}

impl IngestionBuffer {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn ingest(&self, raw: RawPost) -> Result<IngestOutcome, PipelineError> {
        self.ingest_at(raw, Utc::now()).await
    }

    /// Ingest with an explicit ingestion time
    pub async fn ingest_at(
        &self,
        raw: RawPost,
        now: DateTime<Utc>,
    ) -> Result<IngestOutcome, PipelineError> {
        let post = Post::from_raw(raw, now)?;

        if post_exists(&self.db, &post.id).await? {
            debug!(post_id = %post.id, "Post already seen, skipping");
            return Ok(IngestOutcome::Skipped { post_id: post.id });
        }

        let candidate = derive_candidate(&post);

        let inserted = retry_on_lock("ingest_post", DEFAULT_MAX_LOCK_WAIT_MS, || {
            insert_post_with_candidate(&self.db, &post, &candidate)
        })
        .await?;

        if !inserted {
            // Lost a race with a concurrent ingestion of the same id
            debug!(post_id = %post.id, "Post inserted concurrently, skipping");
            return Ok(IngestOutcome::Skipped { post_id: post.id });
        }

        info!(
            post_id = %candidate.post_id,
            category = %candidate.category,
            "Ingested new candidate"
        );
        Ok(IngestOutcome::Ingested(candidate))
    }
}

/// Derive the candidate for a validated post
///
/// Title, text and tags are folded into one normalized text; the
/// category comes from [`classify`].
pub fn derive_candidate(post: &Post) -> Candidate {
    let features = TextFeatures::from_parts(
        post.title
            .as_deref()
            .into_iter()
            .chain(std::iter::once(post.text.as_str()))
            .chain(post.tags.iter().map(String::as_str)),
    );
    let (category, signals) = classify(&features);

    Candidate {
        post_id: post.id.clone(),
        category,
        features,
        signals,
        seed_text: post.text.clone(),
        title: post.title.clone(),
        likes: post.likes,
        comments: post.comments,
        created_at: post.ingested_at,
    }
}

/// Pick the category with the most distinct keyword matches
///
/// The winner needs at least [`MIN_CATEGORY_MATCHES`]; ties go to the
/// earlier entry of [`CATEGORY_KEYWORDS`]. Returns the winning category
/// and every category keyword that matched.
pub fn classify(features: &TextFeatures) -> (Category, Vec<String>) {
    let mut best: Option<(Category, usize)> = None;
    let mut signals = Vec::new();

    for (category, keywords) in CATEGORY_KEYWORDS {
        let mut matches = 0;
        for keyword in keywords.iter().filter(|k| features.matches(k)) {
            matches += 1;
            if !signals.iter().any(|s| s == keyword) {
                signals.push(keyword.to_string());
            }
        }

        let better = match best {
            Some((_, best_matches)) => matches > best_matches,
            None => true,
        };
        if better {
            best = Some((*category, matches));
        }
    }

    let category = match best {
        Some((category, matches)) if matches >= MIN_CATEGORY_MATCHES => category,
        _ => Category::Other,
    };
    (category, signals)
}
