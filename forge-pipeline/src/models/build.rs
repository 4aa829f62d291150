//! Admission decisions and build records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a candidate's single build record
///
/// `(none)` → admitted | rejected_low_score | rejected_quota_exhausted;
/// admitted → built | build_failed. Everything except `admitted` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Admitted,
    RejectedLowScore,
    RejectedQuotaExhausted,
    Built,
    BuildFailed,
}

impl BuildStatus {
    pub const ALL: [BuildStatus; 5] = [
        BuildStatus::Admitted,
        BuildStatus::RejectedLowScore,
        BuildStatus::RejectedQuotaExhausted,
        BuildStatus::Built,
        BuildStatus::BuildFailed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Admitted => "admitted",
            BuildStatus::RejectedLowScore => "rejected_low_score",
            BuildStatus::RejectedQuotaExhausted => "rejected_quota_exhausted",
            BuildStatus::Built => "built",
            BuildStatus::BuildFailed => "build_failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, BuildStatus::Admitted)
    }

    /// Decision that produced a record in this status
    pub fn decision(&self) -> Decision {
        match self {
            BuildStatus::RejectedLowScore => Decision::RejectedLowScore,
            BuildStatus::RejectedQuotaExhausted => Decision::RejectedQuotaExhausted,
            BuildStatus::Admitted | BuildStatus::Built | BuildStatus::BuildFailed => {
                Decision::Admitted
            }
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BuildStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        BuildStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown build status: {}", s))
    }
}

/// Admission controller verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Admitted,
    RejectedLowScore,
    RejectedQuotaExhausted,
}

/// Ledger row describing the admission/build outcome of one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRecord {
    pub post_id: String,
    pub status: BuildStatus,
    /// Quota day whose slot this record consumed (admitted records only)
    pub quota_day: Option<String>,
    /// Materialized project location, present only when built
    pub project_ref: Option<String>,
    /// Failure detail for build_failed
    pub detail: Option<String>,
    /// Builder that claimed the admitted record (a scan cycle id when
    /// built from a cycle)
    pub claimed_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Result of a build attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum BuildOutcome {
    Built { project_ref: String },
    Failed { error: String },
}
