//! Candidates: normalized ideas derived from posts

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Fixed idea category enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    AiApplication,
    Automation,
    Tool,
    Platform,
    Other,
}

impl Category {
    pub const ALL: [Category; 5] = [
        Category::AiApplication,
        Category::Automation,
        Category::Tool,
        Category::Platform,
        Category::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::AiApplication => "ai_application",
            Category::Automation => "automation",
            Category::Tool => "tool",
            Category::Platform => "platform",
            Category::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "ai_application" => Ok(Category::AiApplication),
            "automation" => Ok(Category::Automation),
            "tool" => Ok(Category::Tool),
            "platform" => Ok(Category::Platform),
            "other" => Ok(Category::Other),
            other => Err(format!("unknown category: {}", other)),
        }
    }
}

/// Text derived from a post, prepared for keyword matching
///
/// Normalization lowercases, turns every non-alphanumeric char into a
/// space and collapses runs of whitespace, so `Real-Time` and `real time`
/// both become `real time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextFeatures {
    pub normalized_text: String,
}

impl TextFeatures {
    pub fn from_parts<'a>(parts: impl IntoIterator<Item = &'a str>) -> Self {
        let joined = parts.into_iter().collect::<Vec<_>>().join(" ");
        Self {
            normalized_text: normalize_text(&joined),
        }
    }

    /// Does the text contain `signal`?
    ///
    /// ASCII signals match whole words only (`ai` does not match `email`);
    /// signals with non-ASCII chars (CJK has no word separators) match as
    /// substrings.
    pub fn matches(&self, signal: &str) -> bool {
        let signal = normalize_text(signal);
        if signal.is_empty() {
            return false;
        }
        if signal.is_ascii() {
            format!(" {} ", self.normalized_text).contains(&format!(" {} ", signal))
        } else {
            self.normalized_text.contains(&signal)
        }
    }
}

/// Lowercase, strip punctuation, collapse whitespace
pub fn normalize_text(text: &str) -> String {
    let mapped: String = text
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect::<String>()
        .to_lowercase();
    mapped.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Normalized idea, the unit of scoring and admission
///
/// Never mutated after creation; engagement counters are copied from the
/// post so scoring stays a pure function of the candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub post_id: String,
    pub category: Category,
    pub features: TextFeatures,
    /// Category keywords that matched during classification
    pub signals: Vec<String>,
    /// Human-readable seed passed to the materializer
    pub seed_text: String,
    pub title: Option<String>,
    pub likes: u64,
    pub comments: u64,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_text() {
        assert_eq!(normalize_text("  Real-Time   AI, now!! "), "real time ai now");
        assert_eq!(normalize_text("自动化 Workflow"), "自动化 workflow");
        assert_eq!(normalize_text("---"), "");
    }

    #[test]
    fn test_ascii_signals_match_whole_words() {
        let f = TextFeatures::from_parts(["Send email reminders", "to maintainers"]);
        assert!(!f.matches("ai"));
        assert!(f.matches("email"));

        let f = TextFeatures::from_parts(["An AI agent for real-time alerts"]);
        assert!(f.matches("ai"));
        assert!(f.matches("real-time"));
        assert!(f.matches("real time"));
    }

    #[test]
    fn test_cjk_signals_match_substrings() {
        let f = TextFeatures::from_parts(["构建自动化工作流平台"]);
        assert!(f.matches("自动化"));
        assert!(f.matches("平台"));
        assert!(!f.matches("模板"));
    }

    #[test]
    fn test_category_round_trip_names() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!("AI-Application".parse::<Category>().unwrap(), Category::AiApplication);
        assert!("games".parse::<Category>().is_err());
    }
}
