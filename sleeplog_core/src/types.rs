//! Core domain types for the sleep log.
//!
//! This module defines:
//! - Sleep quality ratings
//! - The persisted sleep record
//! - The caller-supplied payload used to create and update records

use crate::{Error, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Calendar date format records are expected to use
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// Quality
// ============================================================================

/// Subjective quality of a night's sleep
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Quality {
    Good,
    Average,
    Poor,
}

impl Quality {
    /// All ratings in declaration order. Aggregates break ties in this order.
    pub const ALL: [Quality; 3] = [Quality::Good, Quality::Average, Quality::Poor];

    pub fn as_str(&self) -> &'static str {
        match self {
            Quality::Good => "good",
            Quality::Average => "average",
            Quality::Poor => "poor",
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Quality {
    type Err = Error;

    /// Accepts exactly one of the enumerated values.
    fn from_str(s: &str) -> Result<Self> {
        Quality::ALL
            .into_iter()
            .find(|q| q.as_str() == s)
            .ok_or_else(|| Error::invalid_quality(s))
    }
}

// ============================================================================
// Records
// ============================================================================

/// A single logged night of sleep
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepRecord {
    pub id: String,
    pub date: String,
    pub hours_slept: f64,
    pub quality: Quality,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SleepRecord {
    /// Whether `date` falls within `[start, end]`, compared as strings
    pub fn in_range(&self, start: &str, end: &str) -> bool {
        self.date.as_str() >= start && self.date.as_str() <= end
    }
}

/// Fields a caller supplies when creating or replacing a record
///
/// `quality` stays a raw string here; the query layer validates it before
/// anything is written.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SleepPayload {
    pub date: String,
    pub hours_slept: f64,
    pub quality: String,
}

impl SleepPayload {
    pub fn new(date: impl Into<String>, hours_slept: f64, quality: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            hours_slept,
            quality: quality.into(),
        }
    }
}

/// Check whether a date string is a zero-padded `YYYY-MM-DD` calendar date.
///
/// Range queries compare dates lexicographically, which only matches calendar
/// order for this format.
pub fn is_canonical_date(date: &str) -> bool {
    date.len() == 10 && NaiveDate::parse_from_str(date, DATE_FORMAT).is_ok()
}
