//! Write-Ahead Log (WAL) backed record store.
//!
//! Every mutation is appended to a JSONL (JSON Lines) file with file locking
//! before it is applied to the in-memory index. Opening the store replays the
//! log; compaction rewrites it to one entry per live record.
//!
//! Writers coordinate through an exclusive lock on a sidecar `<wal>.lock`
//! file. Appends and compaction take it for their own duration; a store from
//! [`WalStore::open_exclusive`] holds it until dropped, so its snapshot stays
//! current across a whole lookup-then-store sequence.

use crate::store::{MemoryStore, RecordStore};
use crate::{Error, Result, SleepRecord};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// One line of the log
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum WalEntry {
    Put { id: String, record: SleepRecord },
    Remove { id: String },
}

impl WalEntry {
    fn apply(self, index: &mut MemoryStore) {
        match self {
            WalEntry::Put { id, record } => {
                index.insert(&id, record);
            }
            WalEntry::Remove { id } => {
                index.take(&id);
            }
        }
    }
}

/// Durable record store replayed from a JSONL log
#[derive(Debug)]
pub struct WalStore {
    path: PathBuf,
    index: MemoryStore,
    /// Lines currently in the log file, live or not
    entries: usize,
    /// Writer lock held for the store's lifetime, if opened exclusively
    writer_lock: Option<File>,
}

impl WalStore {
    /// Open the log at `path`, replaying any existing entries.
    ///
    /// A missing file is an empty store. Lines that fail to parse are
    /// skipped with a warning. The snapshot is not refreshed afterwards, so
    /// read-modify-write callers that share the file with other processes
    /// should use [`WalStore::open_exclusive`].
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::replay_into(path.into(), None)
    }

    /// Open the log holding the writer lock until the store is dropped.
    ///
    /// Blocks while another writer holds the lock, including another
    /// exclusive store in this process.
    pub fn open_exclusive(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let lock = acquire_writer_lock(&path)?;
        Self::replay_into(path, Some(lock))
    }

    fn replay_into(path: PathBuf, writer_lock: Option<File>) -> Result<Self> {
        let (index, entries) = replay(&path)?;

        tracing::info!(
            "Opened WAL {:?}: {} records from {} entries{}",
            path,
            index.len(),
            entries,
            if writer_lock.is_some() { " (exclusive)" } else { "" }
        );

        Ok(Self {
            path,
            index,
            entries,
            writer_lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of log lines that no longer describe a live record
    pub fn stale_entries(&self) -> usize {
        self.entries.saturating_sub(self.index.len())
    }

    /// Ensure the parent directory exists
    fn ensure_parent_dir(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(())
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Run `f` under the writer lock, taking it only if not already held
    fn with_writer_lock<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.writer_lock.is_some() {
            return f(self);
        }

        let lock = acquire_writer_lock(&self.path)?;
        let result = f(self);
        lock.unlock()?;
        result
    }

    fn append(&mut self, entry: &WalEntry) -> Result<()> {
        self.with_writer_lock(|store| store.append_locked(entry))
    }

    fn append_locked(&mut self, entry: &WalEntry) -> Result<()> {
        self.ensure_parent_dir()?;

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)?;

        file.lock_exclusive()?;

        let mut writer = std::io::BufWriter::new(&file);
        if ends_mid_line(&file)? {
            writer.write_all(b"\n")?;
        }
        let line = serde_json::to_string(entry)?;
        writer.write_all(line.as_bytes())?;
        writer.write_all(b"\n")?;
        writer.flush()?;
        drop(writer);

        file.unlock()?;

        self.entries += 1;
        Ok(())
    }

    /// Rewrite the log so it holds exactly one `put` per live record.
    ///
    /// Runs under the writer lock and replays the file first, so entries
    /// appended by other handles since this one opened are kept. The new log
    /// is written to a temp file in the same directory, synced, and renamed
    /// over the old one. Returns the number of records written.
    pub fn compact(&mut self) -> Result<usize> {
        self.with_writer_lock(|store| store.compact_locked())
    }

    fn compact_locked(&mut self) -> Result<usize> {
        self.ensure_parent_dir()?;

        let (index, entries) = replay(&self.path)?;
        self.index = index;
        self.entries = entries;

        let temp = NamedTempFile::new_in(self.parent_dir())?;
        temp.as_file().lock_exclusive()?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            for record in self.index.iter() {
                let entry = WalEntry::Put {
                    id: record.id.clone(),
                    record: record.clone(),
                };
                serde_json::to_writer(&mut writer, &entry)?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.as_file().unlock()?;

        temp.persist(&self.path).map_err(|e| Error::Io(e.error))?;

        let dropped = self.stale_entries();
        self.entries = self.index.len();

        tracing::info!(
            "Compacted WAL {:?}: kept {} records, dropped {} stale entries",
            self.path,
            self.entries,
            dropped
        );

        Ok(self.entries)
    }

    /// Compact once at least `threshold` stale entries have accumulated.
    ///
    /// Returns whether compaction ran.
    pub fn compact_if_needed(&mut self, threshold: usize) -> Result<bool> {
        let stale = self.stale_entries();
        if stale == 0 || stale < threshold {
            return Ok(false);
        }

        tracing::debug!("{} stale WAL entries (threshold {})", stale, threshold);
        self.compact()?;
        Ok(true)
    }
}

impl RecordStore for WalStore {
    fn get(&self, id: &str) -> Option<SleepRecord> {
        self.index.get(id)
    }

    fn put(&mut self, id: &str, record: SleepRecord) -> Result<()> {
        // JSON has no NaN or infinity; serde_json would write null and the
        // line would be skipped on replay
        if !record.hours_slept.is_finite() {
            return Err(Error::unstorable(
                id,
                format!("hours slept {} is not a finite number", record.hours_slept),
            ));
        }

        let entry = WalEntry::Put {
            id: id.to_string(),
            record,
        };
        self.append(&entry)?;
        entry.apply(&mut self.index);

        tracing::debug!("Appended put {} to WAL", id);
        Ok(())
    }

    fn remove(&mut self, id: &str) -> Result<Option<SleepRecord>> {
        if !self.index.contains(id) {
            return Ok(None);
        }

        self.append(&WalEntry::Remove { id: id.to_string() })?;

        tracing::debug!("Appended remove {} to WAL", id);
        Ok(self.index.take(id))
    }

    fn values(&self) -> Vec<SleepRecord> {
        self.index.values()
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Sidecar lock file next to the log: `<wal>.lock`
fn lock_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    name.push(".lock");
    path.with_file_name(name)
}

/// Open the sidecar lock file and block until it is held exclusively
fn acquire_writer_lock(path: &Path) -> Result<File> {
    let lock_path = lock_path(path);
    if let Some(parent) = lock_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = OpenOptions::new()
        .create(true)
        .read(true)
        .write(true)
        .truncate(false)
        .open(&lock_path)?;
    file.lock_exclusive()?;

    tracing::debug!("Acquired WAL writer lock {:?}", lock_path);
    Ok(file)
}

/// True when the log ends mid-line, e.g. after a crash during an append
fn ends_mid_line(mut file: &File) -> Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(false);
    }

    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}

/// Rebuild the index from a WAL file, returning it with the line count
fn replay(path: &Path) -> Result<(MemoryStore, usize)> {
    let mut index = MemoryStore::new();

    if !path.exists() {
        return Ok((index, 0));
    }

    let file = File::open(path)?;
    // Acquire shared lock for reading
    file.lock_shared()?;

    let reader = BufReader::new(&file);
    let mut entries = 0;

    for (line_num, line_result) in reader.lines().enumerate() {
        let line = line_result?;
        if line.trim().is_empty() {
            continue;
        }
        entries += 1;

        match serde_json::from_str::<WalEntry>(&line) {
            Ok(entry) => entry.apply(&mut index),
            Err(e) => {
                tracing::warn!("Failed to parse WAL entry at line {}: {}", line_num + 1, e);
                // Continue reading, don't fail completely
            }
        }
    }

    file.unlock()?;
    tracing::debug!("Replayed {} WAL entries", entries);
    Ok((index, entries))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Quality;
    use chrono::Utc;

    fn create_test_record(id: &str, date: &str) -> SleepRecord {
        SleepRecord {
            id: id.into(),
            date: date.into(),
            hours_slept: 7.5,
            quality: Quality::Good,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    fn count_lines(path: &Path) -> usize {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .filter(|l| !l.trim().is_empty())
            .count()
    }

    #[test]
    fn test_open_missing_wal_is_empty() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("nonexistent.wal");

        let store = WalStore::open(&wal_path).unwrap();
        assert!(store.is_empty());
        assert_eq!(store.stale_entries(), 0);
        assert!(!wal_path.exists());
    }

    #[test]
    fn test_put_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("wal").join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        store.put("b", create_test_record("b", "2024-01-02")).unwrap();

        let reopened = WalStore::open(&wal_path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.get("a").unwrap().date, "2024-01-01");
        assert_eq!(reopened.values(), store.values());
    }

    #[test]
    fn test_remove_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        let removed = store.remove("a").unwrap();
        assert_eq!(removed.unwrap().id, "a");

        let reopened = WalStore::open(&wal_path).unwrap();
        assert!(reopened.get("a").is_none());
    }

    #[test]
    fn test_remove_missing_does_not_append() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        assert!(store.remove("missing").unwrap().is_none());

        assert_eq!(count_lines(&wal_path), 1);
    }

    #[test]
    fn test_corrupted_lines_are_skipped() {
        crate::logging::init_test();
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        writeln!(file, "{{ invalid json }}").unwrap();
        drop(file);

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("b", create_test_record("b", "2024-01-02")).unwrap();

        let reopened = WalStore::open(&wal_path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.stale_entries(), 1);
    }

    #[test]
    fn test_append_after_torn_line() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();

        let mut file = OpenOptions::new().append(true).open(&wal_path).unwrap();
        file.write_all(b"{\"op\":\"put\",\"id\":\"ha").unwrap();
        drop(file);

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("b", create_test_record("b", "2024-01-02")).unwrap();

        let reopened = WalStore::open(&wal_path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert!(reopened.get("b").is_some());
    }

    #[test]
    fn test_compact_drops_stale_entries() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        for i in 0..5 {
            let id = format!("r{}", i);
            store.put(&id, create_test_record(&id, "2024-01-01")).unwrap();
        }
        let mut updated = store.get("r0").unwrap();
        updated.hours_slept = 9.0;
        store.put("r0", updated).unwrap();
        store.remove("r4").unwrap();

        assert_eq!(count_lines(&wal_path), 7);
        assert_eq!(store.stale_entries(), 3);

        let kept = store.compact().unwrap();
        assert_eq!(kept, 4);
        assert_eq!(count_lines(&wal_path), 4);
        assert_eq!(store.stale_entries(), 0);

        let reopened = WalStore::open(&wal_path).unwrap();
        assert_eq!(reopened.values(), store.values());
        assert_eq!(reopened.get("r0").unwrap().hours_slept, 9.0);
    }

    #[test]
    fn test_compact_leaves_no_temp_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        store.compact().unwrap();

        let extras: Vec<_> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "records.wal" && e.file_name() != "records.wal.lock")
            .collect();
        assert!(
            extras.is_empty(),
            "Expected only records.wal and its lock, found extras: {:?}",
            extras
        );
    }

    #[test]
    fn test_compact_if_needed_respects_threshold() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        store.put("a", create_test_record("a", "2024-01-02")).unwrap();

        assert!(!store.compact_if_needed(2).unwrap());
        assert_eq!(count_lines(&wal_path), 2);

        store.put("a", create_test_record("a", "2024-01-03")).unwrap();
        assert!(store.compact_if_needed(2).unwrap());
        assert_eq!(count_lines(&wal_path), 1);
    }

    #[test]
    fn test_compact_keeps_entries_from_other_handles() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut first = WalStore::open(&wal_path).unwrap();
        let mut second = WalStore::open(&wal_path).unwrap();
        first.put("a", create_test_record("a", "2024-01-01")).unwrap();
        second.put("b", create_test_record("b", "2024-01-02")).unwrap();

        assert_eq!(second.compact().unwrap(), 2);
        assert!(second.get("a").is_some());

        let reopened = WalStore::open(&wal_path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(count_lines(&wal_path), 2);
    }

    #[test]
    fn test_exclusive_store_blocks_other_writers() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut seed = WalStore::open(&wal_path).unwrap();
        seed.put("a", create_test_record("a", "2024-01-01")).unwrap();
        drop(seed);

        let mut holder = WalStore::open_exclusive(&wal_path).unwrap();

        let path = wal_path.clone();
        let waiter = std::thread::spawn(move || {
            // Blocks until `holder` is dropped, then sees its change
            let mut store = WalStore::open_exclusive(&path).unwrap();
            let mut record = store.get("a").unwrap();
            record.hours_slept = 3.0;
            store.put("a", record).unwrap();
        });

        std::thread::sleep(std::time::Duration::from_millis(50));
        let mut record = holder.get("a").unwrap();
        record.quality = Quality::Poor;
        holder.put("a", record).unwrap();
        drop(holder);

        waiter.join().unwrap();

        let reopened = WalStore::open(&wal_path).unwrap();
        let record = reopened.get("a").unwrap();
        assert_eq!(record.quality, Quality::Poor);
        assert_eq!(record.hours_slept, 3.0);
    }

    #[test]
    fn test_exclusive_store_appends_and_compacts_without_relocking() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open_exclusive(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();
        store.put("a", create_test_record("a", "2024-01-02")).unwrap();
        store.remove("a").unwrap();
        assert_eq!(store.compact().unwrap(), 0);
        assert!(wal_path.with_file_name("records.wal.lock").exists());
    }

    #[test]
    fn test_non_finite_hours_are_refused() {
        let temp_dir = tempfile::tempdir().unwrap();
        let wal_path = temp_dir.path().join("records.wal");

        let mut store = WalStore::open(&wal_path).unwrap();
        store.put("a", create_test_record("a", "2024-01-01")).unwrap();

        for hours in [f64::INFINITY, f64::NEG_INFINITY, f64::NAN] {
            let mut record = create_test_record("a", "2024-01-01");
            record.hours_slept = hours;
            let err = store.put("a", record).unwrap_err();
            assert!(matches!(err, Error::Unstorable { ref id, .. } if id == "a"));
        }

        assert_eq!(count_lines(&wal_path), 1);
        assert_eq!(store.get("a").unwrap().hours_slept, 7.5);
        assert_eq!(WalStore::open(&wal_path).unwrap().get("a").unwrap().hours_slept, 7.5);
    }
}
