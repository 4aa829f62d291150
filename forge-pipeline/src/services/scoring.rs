//! Scoring Engine
//!
//! Pure function of a [`Candidate`]: no ledger access, no clock, no
//! randomness. Keyword dimensions are declarative `(signal, points)`
//! tables so each can be tested and swapped on its own.

use serde::Serialize;

use crate::config::CategoryBonusTable;
use crate::models::score::{
    BUSINESS_POTENTIAL_MAX, ENGAGEMENT_MAX, PRACTICAL_VALUE_MAX, TECHNICAL_INNOVATION_MAX,
};
use crate::models::{Candidate, Score, TextFeatures};

/// Likes at which the like component reaches ~63% of its share
const LIKES_SCALE: f64 = 100.0;
/// Comments at which the comment component reaches ~63% of its share
const COMMENTS_SCALE: f64 = 20.0;
/// Part of the engagement dimension driven by likes; comments get the rest
const LIKES_SHARE: f64 = 7.5;

/// One keyword dimension
#[derive(Debug, Clone, Copy)]
pub struct DimensionTable {
    pub name: &'static str,
    pub max: f64,
    pub signals: &'static [(&'static str, f64)],
}

impl DimensionTable {
    /// Sum the points of every matching signal, capped at `max`
    pub fn evaluate(&self, features: &TextFeatures) -> (f64, Vec<&'static str>) {
        let matched: Vec<&'static str> = self
            .signals
            .iter()
            .filter(|(term, _)| features.matches(term))
            .map(|(term, _)| *term)
            .collect();
        let points: f64 = self
            .signals
            .iter()
            .filter(|(term, _)| matched.contains(term))
            .map(|(_, points)| points)
            .sum();
        (points.min(self.max), matched)
    }
}

pub const TECHNICAL_INNOVATION: DimensionTable = DimensionTable {
    name: "technical_innovation",
    max: TECHNICAL_INNOVATION_MAX,
    signals: &[
        ("ai", 5.0),
        ("agent", 5.0),
        ("llm", 5.0),
        ("gpt", 5.0),
        ("machine learning", 5.0),
        ("deep learning", 5.0),
        ("automation", 5.0),
        ("workflow", 5.0),
        ("api", 5.0),
        ("integration", 5.0),
        ("plugin", 5.0),
        ("blockchain", 5.0),
        ("web3", 5.0),
        ("crypto", 5.0),
        ("cloud", 5.0),
        ("serverless", 5.0),
        ("iot", 5.0),
        ("edge", 5.0),
        ("real-time", 5.0),
        ("机器学习", 5.0),
        ("深度学习", 5.0),
        ("自动化", 5.0),
        ("工作流", 5.0),
        ("集成", 5.0),
        ("插件", 5.0),
        ("云原生", 5.0),
        ("边缘计算", 5.0),
    ],
};

pub const BUSINESS_POTENTIAL: DimensionTable = DimensionTable {
    name: "business_potential",
    max: BUSINESS_POTENTIAL_MAX,
    signals: &[
        ("saas", 8.0),
        ("platform", 8.0),
        ("marketplace", 8.0),
        ("subscription", 8.0),
        ("enterprise", 8.0),
        ("b2b", 8.0),
        ("startup", 8.0),
        ("launch", 8.0),
        ("monetization", 8.0),
        ("平台", 8.0),
        ("市场", 8.0),
        ("订阅", 8.0),
        ("付费", 8.0),
        ("商业化", 8.0),
        ("企业级", 8.0),
        ("创业", 8.0),
    ],
};

pub const PRACTICAL_VALUE: DimensionTable = DimensionTable {
    name: "practical_value",
    max: PRACTICAL_VALUE_MAX,
    signals: &[
        ("tool", 6.0),
        ("library", 6.0),
        ("framework", 6.0),
        ("template", 6.0),
        ("generator", 6.0),
        ("dashboard", 6.0),
        ("analytics", 6.0),
        ("monitoring", 6.0),
        ("cli", 6.0),
        ("sdk", 6.0),
        ("工具", 6.0),
        ("框架", 6.0),
        ("模板", 6.0),
        ("生成器", 6.0),
        ("仪表板", 6.0),
        ("监控", 6.0),
        ("命令行", 6.0),
    ],
};

/// Score plus the signals behind each keyword dimension
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreBreakdown {
    pub score: Score,
    pub technical_signals: Vec<&'static str>,
    pub business_signals: Vec<&'static str>,
    pub practical_signals: Vec<&'static str>,
}

impl ScoreBreakdown {
    /// Matched signals across the three keyword dimensions
    pub fn signals(&self) -> Vec<&'static str> {
        self.technical_signals
            .iter()
            .chain(&self.business_signals)
            .chain(&self.practical_signals)
            .copied()
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    technical: DimensionTable,
    business: DimensionTable,
    practical: DimensionTable,
    category_bonus: CategoryBonusTable,
}

impl ScoringEngine {
    /// Engine with the built-in vocabularies
    pub fn new(category_bonus: CategoryBonusTable) -> Self {
        Self::with_tables(
            TECHNICAL_INNOVATION,
            BUSINESS_POTENTIAL,
            PRACTICAL_VALUE,
            category_bonus,
        )
    }

    pub fn with_tables(
        technical: DimensionTable,
        business: DimensionTable,
        practical: DimensionTable,
        category_bonus: CategoryBonusTable,
    ) -> Self {
        Self {
            technical,
            business,
            practical,
            category_bonus,
        }
    }

    pub fn score(&self, candidate: &Candidate) -> Score {
        self.explain(candidate).score
    }

    pub fn explain(&self, candidate: &Candidate) -> ScoreBreakdown {
        let (technical, technical_signals) = self.technical.evaluate(&candidate.features);
        let (business, business_signals) = self.business.evaluate(&candidate.features);
        let (practical, practical_signals) = self.practical.evaluate(&candidate.features);

        let score = Score::from_parts(
            technical,
            business,
            practical,
            engagement_score(candidate.likes, candidate.comments),
            self.category_bonus.bonus(candidate.category),
        );

        ScoreBreakdown {
            score,
            technical_signals,
            business_signals,
            practical_signals,
        }
    }
}

/// Saturating engagement transform, bounded 0–10
///
/// Strictly increasing in both counts with diminishing returns.
pub fn engagement_score(likes: u64, comments: u64) -> f64 {
    let likes_part = LIKES_SHARE * (1.0 - (-(likes as f64) / LIKES_SCALE).exp());
    let comments_part =
        (ENGAGEMENT_MAX - LIKES_SHARE) * (1.0 - (-(comments as f64) / COMMENTS_SCALE).exp());
    (likes_part + comments_part).clamp(0.0, ENGAGEMENT_MAX)
}
