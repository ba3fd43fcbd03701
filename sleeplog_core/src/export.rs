//! CSV export of sleep records.

use crate::{Result, SleepRecord};
use std::fs::File;
use std::path::Path;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow<'a> {
    id: &'a str,
    date: &'a str,
    hours_slept: f64,
    quality: &'static str,
    created_at: String,
    updated_at: Option<String>,
}

impl<'a> From<&'a SleepRecord> for CsvRow<'a> {
    fn from(record: &'a SleepRecord) -> Self {
        CsvRow {
            id: &record.id,
            date: &record.date,
            hours_slept: record.hours_slept,
            quality: record.quality.as_str(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Write records to a CSV file with a header row, replacing any existing file
///
/// The file is synced to disk before returning the number of rows written.
pub fn export_csv(records: &[SleepRecord], path: &Path) -> Result<usize> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let file = File::create(path)?;
    let mut writer = csv::WriterBuilder::new()
        .has_headers(true)
        .from_writer(file);

    for record in records {
        writer.serialize(CsvRow::from(record))?;
    }

    writer.flush()?;
    let file = writer
        .into_inner()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e.to_string()))?;
    file.sync_all()?;

    tracing::info!("Exported {} sleep records to {:?}", records.len(), path);
    Ok(records.len())
}
