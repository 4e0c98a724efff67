use crate::record::Record;
use serde_json::{Map, Value};

/// Error produced while rendering a record. A failed format leaves the
/// record, its store and the pools untouched, so the instance can still be
/// reset and reused.
#[derive(thiserror::Error, Debug)]
pub enum FormatError {
    #[error("json serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Renders a finalized record into bytes.
///
/// Implementations read the record's store through `walk`, `to_nested` or
/// the store's own `Serialize` impl and must not mutate it; by the time a
/// formatter sees a record it may be shared with other handlers.
pub trait Formatter: Send + Sync {
    /// Append the rendered record (including trailing newline) to `out`.
    fn format(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), FormatError>;

    fn content_type(&self) -> &'static str;
}

const TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

/// JSON lines with attributes as flat dotted top-level keys. This is the
/// fast path: no nested materialization, one object per record.
pub struct JsonFormatter;

/// JSON lines with attributes materialized as a nested object tree.
pub struct NestedJsonFormatter;

/// Human-oriented `time LEVEL message key=value ...` lines. Attribute keys
/// are sorted so output is stable.
pub struct TextFormatter;

/// `logfmt`-style `key=value` pairs, record metadata first.
pub struct KeyValueFormatter;

fn base_object(record: &Record) -> Map<String, Value> {
    let mut object = Map::new();
    object.insert(
        "time".to_owned(),
        Value::String(record.time.format(TIME_FORMAT).to_string()),
    );
    object.insert(
        "level".to_owned(),
        Value::String(record.level.as_str().to_owned()),
    );
    object.insert("message".to_owned(), Value::String(record.message.clone()));
    if let Some(id) = &record.output_id {
        object.insert("output_id".to_owned(), Value::String(id.clone()));
    }
    if let Some(source) = &record.source {
        object.insert(
            "source".to_owned(),
            Value::String(format!("{}:{}", source.file, source.line)),
        );
    }
    object
}

impl Formatter for JsonFormatter {
    fn format(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), FormatError> {
        let mut object = base_object(record);
        record.attrs.walk(|key, value| {
            object.insert(key.to_owned(), value.clone());
        });
        serde_json::to_writer(&mut *out, &object)?;
        out.push(b'\n');
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

impl Formatter for NestedJsonFormatter {
    fn format(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), FormatError> {
        let mut object = base_object(record);
        for (key, value) in record.attrs.to_nested() {
            object.insert(key, value);
        }
        serde_json::to_writer(&mut *out, &object)?;
        out.push(b'\n');
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        "application/json"
    }
}

fn sorted_pairs(record: &Record) -> Vec<(String, Value)> {
    let mut pairs = Vec::new();
    record.attrs.walk(|key, value| {
        pairs.push((key.to_owned(), value.clone()));
    });
    pairs.sort_by(|a, b| a.0.cmp(&b.0));
    pairs
}

/// Bare strings render unquoted unless they contain whitespace, `=` or `"`.
fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => {
            if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c == '=' || c == '"') {
                format!("{value}")
            } else {
                s.clone()
            }
        }
        other => other.to_string(),
    }
}

impl Formatter for TextFormatter {
    fn format(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), FormatError> {
        let mut line = format!(
            "{} {} {}",
            record.time.format(TIME_FORMAT),
            record.level,
            record.message
        );
        for (key, value) in sorted_pairs(record) {
            line.push(' ');
            line.push_str(&key);
            line.push('=');
            line.push_str(&display_value(&value));
        }
        line.push('\n');
        out.extend_from_slice(line.as_bytes());
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}

impl Formatter for KeyValueFormatter {
    fn format(&self, record: &Record, out: &mut Vec<u8>) -> Result<(), FormatError> {
        let mut line = format!(
            "time={} level={} message={}",
            record.time.format(TIME_FORMAT),
            record.level,
            display_value(&Value::String(record.message.clone())),
        );
        if let Some(id) = &record.output_id {
            line.push_str(" output_id=");
            line.push_str(id);
        }
        for (key, value) in sorted_pairs(record) {
            line.push(' ');
            line.push_str(&key);
            line.push('=');
            line.push_str(&display_value(&value));
        }
        line.push('\n');
        out.extend_from_slice(line.as_bytes());
        Ok(())
    }

    fn content_type(&self) -> &'static str {
        "text/plain"
    }
}
