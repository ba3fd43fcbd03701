//! Timestamp and identifier sources.
//!
//! The query layer never reads the wall clock or generates ids itself; it
//! asks these sources, so tests can substitute deterministic ones.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Source of the current time
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time via `Utc::now()`
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Source of unique record identifiers
///
/// Implementations must never return an id they have returned before, even
/// if that record has since been deleted. The query layer only re-draws ids
/// that are currently live.
pub trait IdSource {
    fn next_id(&self) -> String;
}

/// Random UUID v4 identifiers, unique by collision odds
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidSource;

impl IdSource for UuidSource {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }
}
