//! # Idea Forge Common Library
//!
//! Shared code for the idea-forge workspace including:
//! - Error type used across the ledger and configuration layers
//! - Configuration loading (root folder, TOML file)
//! - Ledger schema initialization
//! - Pipeline event types and the broadcast event bus

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
pub use events::{EventBus, ForgeEvent};
