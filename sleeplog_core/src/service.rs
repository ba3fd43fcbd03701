//! Query and mutation layer over a record store.
//!
//! All business rules live here:
//! - Quality is validated before anything touches the store
//! - Ids and timestamps come from the injected sources
//! - Filters and aggregates are a full scan plus predicate
//!
//! Reads borrow the log shared, mutations borrow it exclusively, so each
//! lookup-then-store sequence runs without interleaving. Hosts that serve
//! requests from several threads wrap the log in `Arc<RwLock<_>>`; hosts that
//! share a WAL file between processes open it with
//! [`WalStore::open_exclusive`](crate::WalStore::open_exclusive) for writes.

use crate::clock::{Clock, IdSource, SystemClock, UuidSource};
use crate::store::RecordStore;
use crate::types::is_canonical_date;
use crate::{Error, Quality, Result, SleepPayload, SleepRecord};

/// The sleep log: a record store plus its time and id sources
#[derive(Debug)]
pub struct SleepLog<S, C = SystemClock, I = UuidSource> {
    store: S,
    clock: C,
    ids: I,
}

impl<S: RecordStore> SleepLog<S> {
    /// Wrap a store using the wall clock and random UUIDs
    pub fn new(store: S) -> Self {
        Self::with_sources(store, SystemClock, UuidSource)
    }
}

impl<S: RecordStore, C: Clock, I: IdSource> SleepLog<S, C, I> {
    pub fn with_sources(store: S, clock: C, ids: I) -> Self {
        Self { store, clock, ids }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    // ========================================================================
    // CRUD
    // ========================================================================

    /// Every record, in key order
    pub fn get_all(&self) -> Vec<SleepRecord> {
        self.store.values()
    }

    pub fn get_one(&self, id: &str) -> Result<SleepRecord> {
        self.store.get(id).ok_or_else(|| Error::not_found(id))
    }

    /// Create a record with a fresh id and `created_at = now`
    pub fn add(&mut self, payload: SleepPayload) -> Result<SleepRecord> {
        let quality: Quality = payload.quality.parse()?;
        warn_non_canonical_date(&payload.date);

        let id = self.fresh_id();
        let record = SleepRecord {
            id: id.clone(),
            date: payload.date,
            hours_slept: payload.hours_slept,
            quality,
            created_at: self.clock.now(),
            updated_at: None,
        };

        self.store.put(&id, record.clone())?;
        tracing::debug!("Added sleep record {} for {}", id, record.date);
        Ok(record)
    }

    /// Replace date, hours and quality of an existing record
    pub fn update(&mut self, id: &str, payload: SleepPayload) -> Result<SleepRecord> {
        let quality: Quality = payload.quality.parse()?;
        warn_non_canonical_date(&payload.date);

        self.modify(id, |record| {
            record.date = payload.date;
            record.hours_slept = payload.hours_slept;
            record.quality = quality;
        })
    }

    /// Remove a record, returning what was removed
    pub fn delete(&mut self, id: &str) -> Result<SleepRecord> {
        let removed = self.store.remove(id)?.ok_or_else(|| Error::not_found(id))?;
        tracing::debug!("Deleted sleep record {}", id);
        Ok(removed)
    }

    pub fn update_quality(&mut self, id: &str, quality: &str) -> Result<SleepRecord> {
        let quality: Quality = quality.parse()?;
        self.modify(id, |record| record.quality = quality)
    }

    pub fn update_hours_slept(&mut self, id: &str, hours_slept: f64) -> Result<SleepRecord> {
        self.modify(id, |record| record.hours_slept = hours_slept)
    }

    // ========================================================================
    // Filters
    // ========================================================================

    /// Records logged for exactly `date`
    pub fn search_by_date(&self, date: &str) -> Vec<SleepRecord> {
        self.select(|record| record.date == date)
    }

    pub fn filter_by_quality(&self, quality: &str) -> Result<Vec<SleepRecord>> {
        let quality: Quality = quality.parse()?;
        Ok(self.select(|record| record.quality == quality))
    }

    /// Records with `start <= date <= end`
    pub fn get_by_date_range(&self, start: &str, end: &str) -> Vec<SleepRecord> {
        self.select(|record| record.in_range(start, end))
    }

    /// Page `page` (1-based) of `page_size` records in key order.
    ///
    /// Pages past the end, page 0 and a zero page size are all empty.
    pub fn paginate(&self, page: usize, page_size: usize) -> Vec<SleepRecord> {
        if page == 0 || page_size == 0 {
            return Vec::new();
        }

        let start = (page - 1).saturating_mul(page_size);
        self.store
            .values()
            .into_iter()
            .skip(start)
            .take(page_size)
            .collect()
    }

    /// Remove every record dated strictly before `cutoff`
    pub fn delete_older_than(&mut self, cutoff: &str) -> Result<Vec<SleepRecord>> {
        let expired = self.select(|record| record.date.as_str() < cutoff);

        let mut removed = Vec::with_capacity(expired.len());
        for record in expired {
            if let Some(record) = self.store.remove(&record.id)? {
                removed.push(record);
            }
        }

        tracing::info!("Deleted {} sleep records older than {}", removed.len(), cutoff);
        Ok(removed)
    }

    // ========================================================================
    // Aggregates
    // ========================================================================

    /// Sum of hours slept over `start <= date <= end`; zero when nothing matches
    pub fn get_total_hours_by_date_range(&self, start: &str, end: &str) -> f64 {
        self.get_by_date_range(start, end)
            .iter()
            .map(|record| record.hours_slept)
            .sum()
    }

    /// Mean hours slept across all records
    pub fn get_average_duration(&self) -> Result<f64> {
        let records = self.store.values();
        if records.is_empty() {
            return Err(Error::NoRecordsFound);
        }

        let total: f64 = records.iter().map(|record| record.hours_slept).sum();
        Ok(total / records.len() as f64)
    }

    /// Most frequent quality. Ties go to the earliest of good, average, poor.
    pub fn get_dominant_quality(&self) -> Result<Quality> {
        let records = self.store.values();
        if records.is_empty() {
            return Err(Error::NoRecordsFound);
        }

        let mut counts = [0usize; 3];
        for record in &records {
            counts[record.quality as usize] += 1;
        }

        let mut dominant = Quality::ALL[0];
        for quality in Quality::ALL {
            // Strictly greater keeps the first maximum
            if counts[quality as usize] > counts[dominant as usize] {
                dominant = quality;
            }
        }

        Ok(dominant)
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn select<F>(&self, predicate: F) -> Vec<SleepRecord>
    where
        F: Fn(&SleepRecord) -> bool,
    {
        self.store
            .values()
            .into_iter()
            .filter(|record| predicate(record))
            .collect()
    }

    /// Look up `id`, apply `f`, stamp `updated_at` and store the result
    fn modify<F>(&mut self, id: &str, f: F) -> Result<SleepRecord>
    where
        F: FnOnce(&mut SleepRecord),
    {
        let mut record = self.get_one(id)?;
        f(&mut record);
        record.updated_at = Some(self.clock.now());

        self.store.put(id, record.clone())?;
        tracing::debug!("Updated sleep record {}", id);
        Ok(record)
    }

    /// Next id from the source that is not currently live. Ids of deleted
    /// records are not tracked; not reissuing them is the source's contract.
    fn fresh_id(&self) -> String {
        loop {
            let id = self.ids.next_id();
            if self.store.get(&id).is_none() {
                return id;
            }
            tracing::debug!("Generated id {} is already live, retrying", id);
        }
    }
}

fn warn_non_canonical_date(date: &str) {
    if !is_canonical_date(date) {
        tracing::warn!(
            "Date {:?} is not YYYY-MM-DD; range queries compare dates as strings",
            date
        );
    }
}
