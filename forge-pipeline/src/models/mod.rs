//! Domain models for the idea pipeline

pub mod build;
pub mod candidate;
pub mod post;
pub mod score;

pub use build::{BuildOutcome, BuildRecord, BuildStatus, Decision};
pub use candidate::{normalize_text, Candidate, Category, TextFeatures};
pub use post::{Post, RawAuthor, RawId, RawPost};
pub use score::Score;
