use crate::attrs::AttrMap;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::fmt;

/// Severity levels, ordered. `Mark` sits above everything and is used for
/// logical separators in output; it is never filtered out by a
/// minimum-level gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
    Fatal,
    Mark,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "TRACE",
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Fatal => "FATAL",
            Level::Mark => "MARK",
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Call-site location captured when a record is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Source {
    pub file: &'static str,
    pub line: u32,
    pub module: Option<&'static str>,
}

/// One log event. Owns its [`AttrMap`] for the duration of the call that
/// created it; when the record is released to the pool the store is cleared,
/// so nothing leaks into the next borrower.
#[derive(Debug, Clone)]
pub struct Record {
    pub time: DateTime<Utc>,
    pub level: Level,
    pub message: String,
    pub attrs: AttrMap,
    pub source: Option<Source>,
    /// Correlation id grouping the lines of one multi-line output.
    pub output_id: Option<String>,
}

impl Record {
    pub fn new(level: Level, message: impl Into<String>) -> Self {
        Self {
            time: Utc::now(),
            level,
            message: message.into(),
            attrs: AttrMap::new(),
            source: None,
            output_id: None,
        }
    }

    /// Add an attribute at a segment path.
    pub fn with<V: Into<Value>>(self, path: &[&str], value: V) -> Self {
        self.attrs.set(path, value);
        self
    }

    /// Add an attribute at a dotted path.
    pub fn with_dot<V: Into<Value>>(self, dot_path: &str, value: V) -> Self {
        self.attrs.set_by_dot_path(dot_path, value);
        self
    }
}

impl Default for Record {
    fn default() -> Self {
        Self::new(Level::Info, "")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn levels_are_ordered() {
        assert!(Level::Trace < Level::Debug);
        assert!(Level::Error < Level::Fatal);
        assert!(Level::Fatal < Level::Mark);
        assert_eq!(Level::Warn.to_string(), "WARN");
    }

    #[test]
    fn fluent_attribute_chaining() {
        let record = Record::new(Level::Info, "hello")
            .with(&["user", "id"], 7)
            .with_dot("user.name", "Ada");
        assert_eq!(record.attrs.get_by_dot_path("user.id"), Some(json!(7)));
        assert_eq!(record.attrs.get_by_dot_path("user.name"), Some(json!("Ada")));
        assert_eq!(record.message, "hello");
    }

    #[test]
    fn clone_does_not_alias_attributes() {
        let record = Record::new(Level::Debug, "x").with_dot("a", 1);
        let copy = record.clone();
        record.attrs.set_by_dot_path("b", 2);
        assert!(!copy.attrs.has_by_dot_path("b"));
    }
}
