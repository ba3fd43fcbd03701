#![forbid(unsafe_code)]

//! Core domain model and storage for the sleep log.
//!
//! This crate provides:
//! - Domain types (sleep records, quality ratings)
//! - Record storage (in-memory and WAL-backed)
//! - The query and mutation layer with its aggregates
//! - Configuration, logging and CSV export

pub mod types;
pub mod error;
pub mod clock;
pub mod config;
pub mod logging;
pub mod store;
pub mod wal;
pub mod service;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use clock::{Clock, IdSource, SystemClock, UuidSource};
pub use config::Config;
pub use store::{MemoryStore, RecordStore};
pub use wal::WalStore;
pub use service::SleepLog;
pub use export::export_csv;
