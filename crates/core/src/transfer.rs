//! Catalog export/import file format.
//!
//! An export file is a single JSON array of [`Item`] objects using the
//! stable field names of [`crate::item`]. Imports are all-or-nothing: one
//! malformed entry rejects the whole batch.

use chrono::NaiveDate;

use crate::error::CoreError;
use crate::item::Item;

/// File name prefix for exported catalogs.
pub const EXPORT_FILE_PREFIX: &str = "sref-codes";

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("No data to export")]
    Empty,

    #[error("Import file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid data format: expected a JSON array of items")]
    NotAnArray,

    #[error("Invalid data structure: entry {index} {reason}")]
    InvalidEntry { index: usize, reason: String },

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TransferError> for CoreError {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Io(e) => CoreError::Internal(e.to_string()),
            TransferError::Empty => CoreError::validation("export", "no data to export"),
            other => CoreError::validation("import", other.to_string()),
        }
    }
}

// ---------------------------------------------------------------------------
// Export
// ---------------------------------------------------------------------------

/// Name of the export file for the given day, e.g. `sref-codes-2024-05-01.json`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("{EXPORT_FILE_PREFIX}-{}.json", date.format("%Y-%m-%d"))
}

/// Serialize the collection as pretty-printed JSON.
pub fn export_items(items: &[Item]) -> Result<String, TransferError> {
    if items.is_empty() {
        return Err(TransferError::Empty);
    }
    Ok(serde_json::to_string_pretty(items)?)
}

// ---------------------------------------------------------------------------
// Import
// ---------------------------------------------------------------------------

/// Parse and validate an export file.
///
/// Every entry must carry a non-empty `id`, `srefCode` and `title` and an
/// array-typed `tags`. The first entry that does not is reported by index.
pub fn import_items(contents: &str) -> Result<Vec<Item>, TransferError> {
    let value: serde_json::Value = serde_json::from_str(contents)?;
    let serde_json::Value::Array(entries) = value else {
        return Err(TransferError::NotAnArray);
    };

    entries
        .into_iter()
        .enumerate()
        .map(|(index, entry)| {
            validate_entry(&entry).map_err(|reason| TransferError::InvalidEntry { index, reason })?;
            serde_json::from_value::<Item>(entry).map_err(|e| TransferError::InvalidEntry {
                index,
                reason: e.to_string(),
            })
        })
        .collect()
}

fn validate_entry(entry: &serde_json::Value) -> Result<(), String> {
    if !entry.is_object() {
        return Err("is not an object".to_string());
    }
    for field in ["id", "srefCode", "title"] {
        let present = entry
            .get(field)
            .and_then(serde_json::Value::as_str)
            .is_some_and(|s| !s.trim().is_empty());
        if !present {
            return Err(format!("is missing a non-empty '{field}'"));
        }
    }
    if !entry.get("tags").is_some_and(serde_json::Value::is_array) {
        return Err("must have an array of 'tags'".to_string());
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
