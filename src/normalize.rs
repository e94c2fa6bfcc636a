//! Record normalization: turning raw catalog records into embeddable
//! documents.
//!
//! Normalization is pure, total over arbitrary partial records, and
//! order-preserving: N records in, N documents out, same order. Missing
//! fields never raise; they substitute documented defaults.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::records::RecordKind;

/// Fallback for a missing name field.
const DEFAULT_NAME: &str = "Unknown";
/// Fallback for a missing description field.
const DEFAULT_DESCRIPTION: &str = "No description";
/// Currency code used when a priced product carries no currency.
const DEFAULT_CURRENCY: &str = "USD";
/// Placeholder for a category without a hierarchical path.
const DEFAULT_CATEGORY_PATH: &str = "Uncategorized";

/// The unit of indexing: a generated text blob plus an ordered metadata
/// projection of the source record.
///
/// `metadata` always contains a `"source"` discriminator (`"product"` or
/// `"category"`) and the record's identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub content: String,
    pub metadata: Map<String, Value>,
}

impl Document {
    /// The source discriminator, one of `"product"` or `"category"`.
    pub fn source(&self) -> &str {
        self.metadata
            .get("source")
            .and_then(Value::as_str)
            .unwrap_or("")
    }

    /// Human-readable name for result display.
    pub fn display_name(&self) -> &str {
        self.metadata
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_NAME)
    }
}

/// Normalize a whole collection, preserving record order.
pub fn normalize_all(records: &[Map<String, Value>], kind: RecordKind) -> Vec<Document> {
    records
        .iter()
        .map(|record| normalize_record(record, kind))
        .collect()
}

/// Normalize one record into exactly one document.
pub fn normalize_record(record: &Map<String, Value>, kind: RecordKind) -> Document {
    match kind {
        RecordKind::Product => Document {
            content: product_content(record),
            metadata: product_metadata(record),
        },
        RecordKind::Category => Document {
            content: category_content(record),
            metadata: category_metadata(record),
        },
    }
}

fn product_content(record: &Map<String, Value>) -> String {
    let mut lines: Vec<String> = Vec::new();

    lines.push(format!("Product: {}", text_field(record, "name", DEFAULT_NAME)));
    lines.push(format!(
        "Description: {}",
        text_field(record, "description", DEFAULT_DESCRIPTION)
    ));

    // Price line only when a price is present and truthy.
    if record.get("price").map(truthy).unwrap_or(false) {
        let price = scalar_text(&record["price"]);
        let currency = record
            .get("currency")
            .filter(|v| truthy(v))
            .map(scalar_text)
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());
        lines.push(format!("Price: {price} {currency}"));
    }

    if let Some(specs) = record.get("specifications") {
        lines.extend(specifications_lines(specs));
    }

    if let Some(tags) = record.get("tags") {
        lines.push(format!("Tags: {}", tags_text(tags)));
    }

    lines.join("\n")
}

/// Render the specifications block.
///
/// A structured key-value mapping (either an object or a string that parses
/// as one) renders one bulleted line per pair; anything else renders the raw
/// value verbatim. Unparsable specifications are kept, never dropped.
fn specifications_lines(specs: &Value) -> Vec<String> {
    let parsed: Option<Map<String, Value>> = match specs {
        Value::Object(map) => Some(map.clone()),
        Value::String(raw) => serde_json::from_str::<Map<String, Value>>(raw).ok(),
        _ => None,
    };

    match parsed {
        Some(map) => {
            let mut lines = Vec::with_capacity(map.len() + 1);
            lines.push("Specifications:".to_string());
            for (key, value) in &map {
                lines.push(format!("- {key}: {}", scalar_text(value)));
            }
            lines
        }
        None => vec![format!("Specifications: {}", scalar_text(specs))],
    }
}

fn product_metadata(record: &Map<String, Value>) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("id".to_string(), field_or_null(record, "id"));
    metadata.insert(
        "name".to_string(),
        Value::String(text_field(record, "name", DEFAULT_NAME)),
    );
    metadata.insert("slug".to_string(), field_or_null(record, "slug"));
    metadata.insert("price".to_string(), field_or_null(record, "price"));
    metadata.insert("currency".to_string(), field_or_null(record, "currency"));
    metadata.insert("category_id".to_string(), field_or_null(record, "category_id"));
    metadata.insert("source".to_string(), Value::String("product".to_string()));
    metadata.insert("rating".to_string(), field_or_null(record, "rating"));
    metadata.insert("is_active".to_string(), field_or_null(record, "is_active"));
    metadata.insert(
        "stock_quantity".to_string(),
        field_or_null(record, "stock_quantity"),
    );
    metadata.insert(
        "image".to_string(),
        Value::String(featured_image(record.get("images"))),
    );
    metadata
}

/// First comma-separated entry of the images field, or `""`.
fn featured_image(images: Option<&Value>) -> String {
    match images {
        Some(Value::String(s)) => s.split(',').next().unwrap_or("").trim().to_string(),
        Some(Value::Array(items)) => items
            .first()
            .map(scalar_text)
            .unwrap_or_default()
            .trim()
            .to_string(),
        _ => String::new(),
    }
}

fn category_content(record: &Map<String, Value>) -> String {
    let name = text_field(record, "name", DEFAULT_NAME);
    let path = text_field(record, "path", DEFAULT_CATEGORY_PATH);
    let count = record
        .get("products_count")
        .map(scalar_text)
        .unwrap_or_else(|| "0".to_string());
    format!("Category: {name}\nPath: {path}\nProducts: {count}")
}

fn category_metadata(record: &Map<String, Value>) -> Map<String, Value> {
    let mut metadata = Map::new();
    metadata.insert("id".to_string(), field_or_null(record, "id"));
    metadata.insert(
        "name".to_string(),
        Value::String(text_field(record, "name", DEFAULT_NAME)),
    );
    metadata.insert(
        "path".to_string(),
        Value::String(text_field(record, "path", DEFAULT_CATEGORY_PATH)),
    );
    metadata.insert("parent_id".to_string(), field_or_null(record, "parent_id"));
    metadata.insert("is_leaf".to_string(), field_or_null(record, "is_leaf"));
    metadata.insert("source".to_string(), Value::String("category".to_string()));
    metadata
}

/// Copy a field as-is, substituting an explicit null when absent.
fn field_or_null(record: &Map<String, Value>, key: &str) -> Value {
    record.get(key).cloned().unwrap_or(Value::Null)
}

/// Render a field as display text, substituting `default` when absent,
/// null, or empty.
fn text_field(record: &Map<String, Value>, key: &str, default: &str) -> String {
    match record.get(key) {
        Some(Value::Null) | None => default.to_string(),
        Some(Value::String(s)) if s.trim().is_empty() => default.to_string(),
        Some(value) => scalar_text(value),
    }
}

/// Display text for any JSON value: strings unquoted, everything else in
/// compact JSON form.
fn scalar_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Comma-joined tag list: arrays are joined, strings pass through.
fn tags_text(tags: &Value) -> String {
    match tags {
        Value::Array(items) => items
            .iter()
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(", "),
        other => scalar_text(other),
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
