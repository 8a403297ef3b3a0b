//! Telemetry event shape and the bulk-copy text-format encoder.
//!
//! Postgres's `COPY ... (FORMAT text)` wire format uses tab as the field
//! delimiter, newline as the row delimiter, `\N` as the null sentinel,
//! and backslash-escapes any literal backslash/tab/newline/carriage
//! return in a text value. Numeric columns reject the empty string, so a
//! missing numeric field must be encoded as `\N`, never `""`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

pub const STAGING_TABLE: &str = "entity_values_ingest";
pub const STAGING_COLUMNS: [&str; 7] = [
    "entity_id",
    "tenant_id",
    "attribute_id",
    "value",
    "value_int",
    "value_decimal",
    "ingested_at",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub entity_id: i64,
    pub tenant_id: i64,
    pub attribute_id: i64,
    pub value: Option<String>,
    pub value_int: Option<i64>,
    pub value_decimal: Option<f64>,
    pub ingested_at: Option<NaiveDateTime>,
}

const NULL_SENTINEL: &str = "\\N";

/// Escape a text value per the `COPY` text format: backslash, tab,
/// newline, and carriage return each become a two-character escape.
fn escape_text(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            other => out.push(other),
        }
    }
    out
}

/// Encode an optional text field: `None` or an empty string becomes the
/// null sentinel; anything else is escaped and emitted verbatim.
fn encode_text_field(value: &Option<String>) -> String {
    match value {
        Some(s) if !s.is_empty() => escape_text(s),
        _ => NULL_SENTINEL.to_string(),
    }
}

fn encode_display_field<T: std::fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => NULL_SENTINEL.to_string(),
    }
}

/// Render one [`TelemetryEvent`] as a single tab-delimited `COPY` row
/// (without the trailing row delimiter), in the fixed column order
/// documented in [`STAGING_COLUMNS`].
pub fn encode_event(event: &TelemetryEvent) -> String {
    let ingested_at = event
        .ingested_at
        .map(|ts| ts.format("%Y-%m-%d %H:%M:%S%.f").to_string());

    [
        event.entity_id.to_string(),
        event.tenant_id.to_string(),
        event.attribute_id.to_string(),
        encode_text_field(&event.value),
        encode_display_field(&event.value_int),
        encode_display_field(&event.value_decimal),
        encode_display_field(&ingested_at),
    ]
    .join("\t")
}

/// Render a full batch as the payload for `COPY ... FROM STDIN`: one row
/// per event, newline-delimited, with a trailing newline.
pub fn encode_batch(events: &[TelemetryEvent]) -> Vec<u8> {
    let mut buf = String::new();
    for event in events {
        buf.push_str(&encode_event(event));
        buf.push('\n');
    }
    buf.into_bytes()
}
