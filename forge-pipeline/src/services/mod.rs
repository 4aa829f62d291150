//! Pipeline services
//!
//! Ingestion → scoring → admission → build, plus the scan cycle that
//! drives them and the scheduler that repeats it. Insights and the report
//! are read-only views over scored candidates.

pub mod admission;
pub mod builder;
pub mod ingest;
pub mod insights;
pub mod materializer;
pub mod report;
pub mod scanner;
pub mod scheduler;
pub mod scoring;

pub use admission::AdmissionController;
pub use builder::BuildOrchestrator;
pub use ingest::{IngestOutcome, IngestionBuffer};
pub use insights::{derive_insights, IdeaInsights};
pub use materializer::{MaterializeError, MaterializeRequest, Materializer, ScaffoldMaterializer};
pub use report::{load_report_entries, render_report, ReportEntry};
pub use scanner::{CycleReport, Pipeline};
pub use scheduler::ScanScheduler;
pub use scoring::{ScoreBreakdown, ScoringEngine};
