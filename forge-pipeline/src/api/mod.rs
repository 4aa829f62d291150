//! HTTP API handlers for forge-pipeline
//!
//! Everything here reads the ledger; nothing mutates it.

pub mod analyze;
pub mod health;
pub mod pagination;
pub mod reports;
pub mod sse;

pub use analyze::analyze_post;
pub use health::health_routes;
pub use reports::{
    get_builds, get_cycles, get_export, get_report, get_stats, get_top_candidates,
};
pub use sse::event_stream;
