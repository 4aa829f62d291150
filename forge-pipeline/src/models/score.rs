//! Candidate scores
//!
//! Sub-scores are kept at one-decimal precision. All arithmetic that
//! decides admission happens on integer tenths so the threshold boundary
//! is exact.

use serde::{Deserialize, Serialize};

/// Upper bound of each dimension; the bounds sum to 100
pub const TECHNICAL_INNOVATION_MAX: f64 = 35.0;
pub const BUSINESS_POTENTIAL_MAX: f64 = 25.0;
pub const PRACTICAL_VALUE_MAX: f64 = 20.0;
pub const ENGAGEMENT_MAX: f64 = 10.0;
pub const CATEGORY_BONUS_MAX: f64 = 10.0;

/// Width of the normalized display scale
pub const NORMALIZED_SCALE: f64 = 15.0;

/// Weighted multi-dimensional quality score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Score {
    pub technical_innovation: f64,
    pub business_potential: f64,
    pub practical_value: f64,
    pub engagement: f64,
    pub category_bonus: f64,
    /// Sum of the five sub-scores, 0–100
    pub total: f64,
}

impl Score {
    /// Build a score from sub-scores, clamping each to its bound and
    /// rounding to one decimal
    pub fn from_parts(
        technical_innovation: f64,
        business_potential: f64,
        practical_value: f64,
        engagement: f64,
        category_bonus: f64,
    ) -> Self {
        let parts = [
            to_tenths(technical_innovation, TECHNICAL_INNOVATION_MAX),
            to_tenths(business_potential, BUSINESS_POTENTIAL_MAX),
            to_tenths(practical_value, PRACTICAL_VALUE_MAX),
            to_tenths(engagement, ENGAGEMENT_MAX),
            to_tenths(category_bonus, CATEGORY_BONUS_MAX),
        ];
        let total: i64 = parts.iter().sum();

        Self {
            technical_innovation: parts[0] as f64 / 10.0,
            business_potential: parts[1] as f64 / 10.0,
            practical_value: parts[2] as f64 / 10.0,
            engagement: parts[3] as f64 / 10.0,
            category_bonus: parts[4] as f64 / 10.0,
            total: total as f64 / 10.0,
        }
    }

    /// Total in integer tenths of a point
    pub fn total_tenths(&self) -> i64 {
        (self.total * 10.0).round() as i64
    }

    /// Total on the 0–15 display scale
    pub fn normalized(&self) -> f64 {
        let scale_tenths = (NORMALIZED_SCALE * 10.0) as i64;
        // Round half up in integer tenths
        let tenths = (self.total_tenths() * scale_tenths + 500) / 1000;
        tenths as f64 / 10.0
    }
}

fn to_tenths(value: f64, max: f64) -> i64 {
    let clamped = if value.is_finite() { value.clamp(0.0, max) } else { 0.0 };
    (clamped * 10.0).round() as i64
}
