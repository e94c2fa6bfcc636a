//! Loading of exported catalog records from JSON files.
//!
//! Each input file is a single JSON object with one named array field
//! (`"products"` or `"categories"`). A missing file, malformed JSON, or a
//! missing/wrong-shaped array degrades to an empty collection with a
//! warning; the build never aborts because one input is absent.

use std::path::Path;

use serde_json::{Map, Value};

/// Which collection a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Product,
    Category,
}

impl RecordKind {
    /// The `metadata["source"]` discriminator value.
    pub fn source(&self) -> &'static str {
        match self {
            RecordKind::Product => "product",
            RecordKind::Category => "category",
        }
    }

    /// Name of the array field holding the records in the input file.
    pub fn array_field(&self) -> &'static str {
        match self {
            RecordKind::Product => "products",
            RecordKind::Category => "categories",
        }
    }
}

/// Load one record collection from a JSON export file.
///
/// Non-object entries inside the array are skipped with a warning.
pub fn load_records(path: &Path, kind: RecordKind) -> Vec<Map<String, Value>> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) => {
            log::warn!(
                "could not read {} file {}: {e}; continuing with empty collection",
                kind.array_field(),
                path.display()
            );
            return vec![];
        }
    };

    let parsed: Value = match serde_json::from_str(&raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            log::warn!(
                "malformed JSON in {}: {e}; continuing with empty collection",
                path.display()
            );
            return vec![];
        }
    };

    let entries = match parsed.get(kind.array_field()).and_then(Value::as_array) {
        Some(entries) => entries,
        None => {
            log::warn!(
                "{} has no \"{}\" array; continuing with empty collection",
                path.display(),
                kind.array_field()
            );
            return vec![];
        }
    };

    let mut records = Vec::with_capacity(entries.len());
    for (i, entry) in entries.iter().enumerate() {
        match entry.as_object() {
            Some(obj) => records.push(obj.clone()),
            None => log::warn!(
                "skipping non-object entry #{i} in {} array of {}",
                kind.array_field(),
                path.display()
            ),
        }
    }

    records
}
