//! Feed sources
//!
//! A feed hands out pages of raw posts, newest first, with an opaque
//! cursor for the next page. [`HttpFeedClient`] talks to the real API;
//! [`StaticFeed`] serves fixed pages (demo mode and tests).

pub mod http;

pub use http::HttpFeedClient;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use crate::error::PipelineError;
use crate::models::RawPost;

/// One page of raw records
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeedPage {
    pub posts: Vec<RawPost>,
    /// Records that were not even shaped like a post
    pub unparsable: u32,
    pub next_cursor: Option<String>,
}

#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &str;

    /// Fetch the page at `cursor` (`None` = first page)
    ///
    /// Transport and server errors are [`PipelineError::FeedUnavailable`].
    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, PipelineError>;
}

/// Decode records one by one so a single bad record does not sink the page
pub fn decode_posts(records: Vec<Value>) -> (Vec<RawPost>, u32) {
    let mut posts = Vec::with_capacity(records.len());
    let mut unparsable = 0;

    for record in records {
        match serde_json::from_value::<RawPost>(record) {
            Ok(post) => posts.push(post),
            Err(e) => {
                warn!(error = %e, "Dropping feed record that is not a post");
                unparsable += 1;
            }
        }
    }

    (posts, unparsable)
}

/// Feed serving fixed pages; the cursor is the page index
#[derive(Debug, Clone, Default)]
pub struct StaticFeed {
    pages: Vec<Vec<RawPost>>,
}

impl StaticFeed {
    pub fn new(pages: Vec<Vec<RawPost>>) -> Self {
        Self { pages }
    }

    pub fn single_page(posts: Vec<RawPost>) -> Self {
        Self::new(vec![posts])
    }

    /// Sample posts used when no feed API key is configured
    pub fn demo() -> Self {
        let post = |id: &str, title: &str, text: &str, author: &str, likes: i64, tags: &[&str]| {
            let mut raw = RawPost::new(id, text, author, likes, 0);
            raw.title = Some(title.to_string());
            raw.tags = tags.iter().map(|t| t.to_string()).collect();
            raw
        };

        Self::single_page(vec![
            post(
                "demo-1",
                "AI agent collaboration platform",
                "A platform where several AI agents cooperate on complex tasks",
                "agent_builder",
                150,
                &["ai", "agent", "collaboration"],
            ),
            post(
                "demo-2",
                "Automated content generator",
                "Generate blog posts, product descriptions and social content from keywords",
                "content_creator",
                89,
                &["ai", "content", "automation"],
            ),
            post(
                "demo-3",
                "Developer dashboard templates",
                "Collect and share high quality developer dashboard templates and components",
                "dev_tools",
                76,
                &["dashboard", "template", "ui"],
            ),
            post(
                "demo-4",
                "Open source discovery engine",
                "An AI powered recommendation and discovery platform for GitHub projects",
                "open_source",
                234,
                &["github", "ai", "discovery"],
            ),
            post(
                "demo-5",
                "No-code workflow automation",
                "Build automation workflows visually with drag and drop, no coding needed",
                "automation_pro",
                312,
                &["no-code", "workflow", "automation"],
            ),
        ])
    }
}

#[async_trait]
impl FeedSource for StaticFeed {
    fn name(&self) -> &str {
        "static"
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<FeedPage, PipelineError> {
        let index = match cursor {
            None => 0,
            Some(c) => c
                .parse::<usize>()
                .map_err(|_| PipelineError::FeedUnavailable(format!("invalid cursor {:?}", c)))?,
        };

        let posts = self.pages.get(index).cloned().unwrap_or_default();
        let next_cursor = (index + 1 < self.pages.len()).then(|| (index + 1).to_string());

        Ok(FeedPage {
            posts,
            unparsable: 0,
            next_cursor,
        })
    }
}
