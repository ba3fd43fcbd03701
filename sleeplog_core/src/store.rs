//! Ordered record storage.
//!
//! The store is a plain keyed map: it has no opinion about whether a `put`
//! is a create or an update. All validation lives in the query layer.

use crate::{Result, SleepRecord};
use std::collections::BTreeMap;

/// Ordered dictionary from record id to record
pub trait RecordStore {
    /// Point lookup. Absence is a normal outcome.
    fn get(&self, id: &str) -> Option<SleepRecord>;

    /// Insert the record, replacing any previous value under `id`
    fn put(&mut self, id: &str, record: SleepRecord) -> Result<()>;

    /// Remove and return the previous value, if any
    fn remove(&mut self, id: &str) -> Result<Option<SleepRecord>>;

    /// Full scan in key order
    fn values(&self) -> Vec<SleepRecord>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// In-memory store backed by a `BTreeMap`
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    records: BTreeMap<String, SleepRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: &str, record: SleepRecord) -> Option<SleepRecord> {
        self.records.insert(id.to_string(), record)
    }

    pub(crate) fn take(&mut self, id: &str) -> Option<SleepRecord> {
        self.records.remove(id)
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &SleepRecord> {
        self.records.values()
    }
}

impl RecordStore for MemoryStore {
    fn get(&self, id: &str) -> Option<SleepRecord> {
        self.records.get(id).cloned()
    }

    fn put(&mut self, id: &str, record: SleepRecord) -> Result<()> {
        self.insert(id, record);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<Option<SleepRecord>> {
        Ok(self.take(id))
    }

    fn values(&self) -> Vec<SleepRecord> {
        self.records.values().cloned().collect()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}
