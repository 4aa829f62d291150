//! Ledger access for forge-pipeline
//!
//! The ledger is the single source of truth for dedup and quota state.
//! Every function here takes the pool explicitly; nothing is cached in
//! process memory.

pub mod builds;
pub mod cycles;
pub mod posts;
pub mod quota;
pub mod reports;
pub mod scores;
pub mod settings;

pub use forge_common::db::{init_database, init_memory_database};

use chrono::{DateTime, SecondsFormat, Utc};
use forge_common::{Error, Result};

/// Timestamp format stored in TEXT columns (sortable RFC 3339, UTC)
pub fn to_db_time(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse a stored timestamp
pub fn from_db_time(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Internal(format!("Invalid timestamp in ledger {:?}: {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_time_is_sortable_utc() {
        let dt = DateTime::parse_from_rfc3339("2026-05-04T03:02:01.5+02:00")
            .unwrap()
            .with_timezone(&Utc);
        let stored = to_db_time(&dt);
        assert_eq!(stored, "2026-05-04T01:02:01.500Z");
        assert_eq!(from_db_time(&stored).unwrap(), dt);
    }
}
