//! Idea insights
//!
//! Pure function of a [`Candidate`], like scoring: why an idea ranked where
//! it did, plus suggested project directions, monetization models and a
//! starter tech stack. Suggestions are advisory and never affect admission.

use serde::Serialize;

use crate::models::{Candidate, TextFeatures};

/// Likes for the "high popularity" reason
pub const HIGH_POPULARITY_LIKES: u64 = 100;
/// Likes for the "moderate popularity" reason
pub const MODERATE_POPULARITY_LIKES: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    High,
    Medium,
    Low,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::High => "high",
            Priority::Medium => "medium",
            Priority::Low => "low",
        }
    }
}

/// One kind of project the idea could become
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectDirection {
    pub kind: &'static str,
    pub description: &'static str,
    pub priority: Priority,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TechStack {
    pub frontend: Vec<&'static str>,
    pub backend: Vec<&'static str>,
    pub database: Vec<&'static str>,
    pub deployment: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdeaInsights {
    pub reasons: Vec<String>,
    pub directions: Vec<ProjectDirection>,
    pub monetization: Vec<&'static str>,
    pub tech_stack: TechStack,
}

struct DirectionRule {
    terms: &'static [&'static str],
    direction: ProjectDirection,
}

const DIRECTIONS: &[DirectionRule] = &[
    DirectionRule {
        terms: &["dashboard", "monitor", "monitoring", "analytics", "监控"],
        direction: ProjectDirection {
            kind: "data_dashboard",
            description: "Real-time monitoring and visualization dashboard",
            priority: Priority::High,
        },
    },
    DirectionRule {
        terms: &["generator", "create", "build", "生成"],
        direction: ProjectDirection {
            kind: "generator",
            description: "One-click generator for content or project structure",
            priority: Priority::High,
        },
    },
    DirectionRule {
        terms: &["agent", "ai", "智能"],
        direction: ProjectDirection {
            kind: "ai_agent",
            description: "AI assistant or agent application",
            priority: Priority::High,
        },
    },
    DirectionRule {
        terms: &["platform", "marketplace", "平台"],
        direction: ProjectDirection {
            kind: "saas_platform",
            description: "Extensible online service platform",
            priority: Priority::Medium,
        },
    },
    DirectionRule {
        terms: &["tool", "工具"],
        direction: ProjectDirection {
            kind: "tool_website",
            description: "Small online tool website",
            priority: Priority::Medium,
        },
    },
    DirectionRule {
        terms: &["blog", "article", "文章"],
        direction: ProjectDirection {
            kind: "content_site",
            description: "Content site or blog",
            priority: Priority::Medium,
        },
    },
];

const PROTOTYPE: ProjectDirection = ProjectDirection {
    kind: "prototype",
    description: "Quick prototype to validate the idea",
    priority: Priority::Low,
};

/// First matching rule wins, else [`DEFAULT_MONETIZATION`]
const MONETIZATION: &[(&[&str], &[&str])] = &[
    (
        &["saas", "platform", "enterprise", "企业"],
        &["subscription", "enterprise edition", "private deployment"],
    ),
    (&["tool", "工具", "免费"], &["freemium", "advertising", "sponsorship"]),
    (&["api", "service", "服务"], &["per-call api billing", "pay as you go"]),
];
const DEFAULT_MONETIZATION: &[&str] = &["advertising", "sponsorship", "affiliate marketing"];

const REASONS: &[(&[&str], &str)] = &[
    (&["ai", "agent", "llm"], "AI / agent related"),
    (&["automation", "workflow"], "Automation related"),
    (&["platform", "saas"], "Platform potential"),
    (&["tool", "generator"], "Practical tool"),
    (&["trending", "popular"], "Trending tag"),
];

pub fn derive_insights(candidate: &Candidate) -> IdeaInsights {
    let features = &candidate.features;

    let mut directions: Vec<ProjectDirection> = DIRECTIONS
        .iter()
        .filter(|rule| mentions(features, rule.terms))
        .map(|rule| rule.direction.clone())
        .collect();
    if directions.is_empty() {
        directions.push(PROTOTYPE);
    }

    let monetization = MONETIZATION
        .iter()
        .find(|(terms, _)| mentions(features, terms))
        .map(|(_, models)| *models)
        .unwrap_or(DEFAULT_MONETIZATION)
        .to_vec();

    IdeaInsights {
        reasons: reasons(candidate),
        directions,
        monetization,
        tech_stack: tech_stack(features),
    }
}

fn reasons(candidate: &Candidate) -> Vec<String> {
    let mut reasons = Vec::new();
    if candidate.likes >= HIGH_POPULARITY_LIKES {
        reasons.push(format!("High popularity ({} likes)", candidate.likes));
    } else if candidate.likes >= MODERATE_POPULARITY_LIKES {
        reasons.push(format!("Moderate popularity ({} likes)", candidate.likes));
    }
    reasons.extend(
        REASONS
            .iter()
            .filter(|(terms, _)| mentions(&candidate.features, terms))
            .map(|(_, reason)| reason.to_string()),
    );
    reasons
}

fn tech_stack(features: &TextFeatures) -> TechStack {
    let frontend = if mentions(features, &["dashboard", "ui", "frontend", "web"]) {
        vec!["React", "Vue.js", "Next.js"]
    } else {
        vec!["React", "Vue.js"]
    };

    let backend = if mentions(features, &["api", "ai", "ml", "智能"]) {
        vec!["FastAPI", "Python", "Node.js"]
    } else if mentions(features, &["real-time", "realtime", "socket", "实时"]) {
        vec!["Node.js", "FastAPI"]
    } else {
        vec!["FastAPI", "Express"]
    };

    let database = if mentions(features, &["analytics", "data", "分析"]) {
        vec!["PostgreSQL", "TimescaleDB", "InfluxDB"]
    } else {
        vec!["PostgreSQL", "SQLite"]
    };

    TechStack {
        frontend,
        backend,
        database,
        deployment: vec!["Vercel", "Railway", "Docker"],
    }
}

fn mentions(features: &TextFeatures, terms: &[&str]) -> bool {
    terms.iter().any(|t| features.matches(t))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Post, RawPost};
    use crate::services::ingest::derive_candidate;
    use chrono::Utc;

    fn candidate(text: &str, likes: i64) -> Candidate {
        let post = Post::from_raw(RawPost::new("p1", text, "alice", likes, 0), Utc::now()).unwrap();
        derive_candidate(&post)
    }

    #[test]
    fn test_agent_platform_insights() {
        let insights = derive_insights(&candidate(
            "An AI agent SaaS platform with a monitoring dashboard and an API",
            150,
        ));

        assert_eq!(
            insights.reasons,
            vec![
                "High popularity (150 likes)",
                "AI / agent related",
                "Platform potential"
            ]
        );
        let kinds: Vec<&str> = insights.directions.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec!["data_dashboard", "ai_agent", "saas_platform"]);
        assert_eq!(insights.directions[0].priority, Priority::High);
        assert_eq!(
            insights.monetization,
            vec!["subscription", "enterprise edition", "private deployment"]
        );
        assert_eq!(insights.tech_stack.frontend, vec!["React", "Vue.js", "Next.js"]);
        assert_eq!(insights.tech_stack.backend, vec!["FastAPI", "Python", "Node.js"]);
    }

    #[test]
    fn test_plain_post_falls_back_to_prototype() {
        let insights = derive_insights(&candidate("what a quiet afternoon", 60));

        assert_eq!(insights.reasons, vec!["Moderate popularity (60 likes)"]);
        assert_eq!(insights.directions, vec![PROTOTYPE]);
        assert_eq!(insights.monetization, DEFAULT_MONETIZATION.to_vec());
        assert_eq!(insights.tech_stack.database, vec!["PostgreSQL", "SQLite"]);
    }

    #[test]
    fn test_words_match_whole() {
        // "email" is not "ai" and "toolkit" is not "tool"
        let insights = derive_insights(&candidate("an email toolkit", 0));
        assert!(insights.reasons.is_empty());
        assert_eq!(insights.directions, vec![PROTOTYPE]);

        let insights = derive_insights(&candidate("a handy tool for data analytics", 0));
        assert_eq!(insights.monetization, vec!["freemium", "advertising", "sponsorship"]);
        assert_eq!(
            insights.tech_stack.database,
            vec!["PostgreSQL", "TimescaleDB", "InfluxDB"]
        );
    }
}
