//! Ledger database initialization

pub mod init;

pub use init::{create_schema, init_database, init_memory_database};
