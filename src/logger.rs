use crate::attrs::AttrMap;
use crate::flatten::{self, Flatten};
use crate::handler::Handler;
use crate::pool;
use crate::record::{Level, Record, Source};
use serde::Serialize;
use serde_json::Value;
use std::panic::Location;
use std::sync::Arc;

/// Callback run against every record this logger emits, after per-call and
/// accumulated attributes are in place and before the handler sees it.
pub type Callback = dyn Fn(&mut Record) + Send + Sync;

/// Front door of the library.
///
/// A logger is cheap to clone and immutable once built: the fluent
/// `with_*` methods return a new logger with the addition applied, so a
/// derived logger can be handed to another thread without affecting its
/// parent. Accumulated attributes are captured once per derivation (clone
/// semantics) and merged into every record, never mutated by that merge.
#[derive(Clone)]
pub struct Logger {
    handler: Arc<dyn Handler>,
    attrs: Arc<AttrMap>,
    group: String,
    callbacks: Vec<Arc<Callback>>,
}

impl Logger {
    pub fn new(handler: Arc<dyn Handler>) -> Self {
        Self {
            handler,
            attrs: Arc::new(AttrMap::new()),
            group: String::new(),
            callbacks: Vec::new(),
        }
    }

    pub fn handler(&self) -> Arc<dyn Handler> {
        Arc::clone(&self.handler)
    }

    pub fn set_handler(&mut self, handler: Arc<dyn Handler>) {
        self.handler = handler;
    }

    /// Clone with an independent copy of the accumulated attributes, so a
    /// derived logger never mutates its parent's set.
    fn fork(&self) -> Self {
        let mut next = self.clone();
        next.attrs = Arc::new(self.attrs.as_ref().clone());
        next
    }

    fn qualify(&self, key: &str) -> String {
        if self.group.is_empty() {
            key.to_owned()
        } else {
            format!("{}.{key}", self.group)
        }
    }

    /// Derive a logger carrying an extra attribute at a segment path.
    pub fn with<V: Into<Value>>(&self, path: &[&str], value: V) -> Self {
        let next = self.fork();
        if !path.is_empty() {
            next.attrs.set_by_dot_path(&next.qualify(&path.join(".")), value);
        }
        next
    }

    /// Derive a logger carrying an extra attribute at a dotted path.
    pub fn with_dot<V: Into<Value>>(&self, dot_path: &str, value: V) -> Self {
        let next = self.fork();
        if !dot_path.is_empty() {
            next.attrs.set_by_dot_path(&next.qualify(dot_path), value);
        }
        next
    }

    /// Derive a logger whose subsequent attribute keys are nested under
    /// `name`. Groups compose: `with_group("a").with_group("b")` prefixes
    /// keys with `a.b.`.
    pub fn with_group(&self, name: &str) -> Self {
        let mut next = self.clone();
        if !name.is_empty() {
            next.group = if next.group.is_empty() {
                name.to_owned()
            } else {
                format!("{}.{name}", next.group)
            };
        }
        next
    }

    /// Derive a logger running `callback` against every record it emits.
    pub fn with_callback<F>(&self, callback: F) -> Self
    where
        F: Fn(&mut Record) + Send + Sync + 'static,
    {
        let mut next = self.clone();
        next.callbacks.push(Arc::new(callback));
        next
    }

    /// Derive a logger with a structured value flattened into dotted paths
    /// under `prefix`. A value that cannot be serialized contributes
    /// nothing; logging must not fail the caller over a bad attribute.
    pub fn with_struct<T: Serialize>(&self, prefix: &str, value: &T) -> Self {
        let next = self.fork();
        if let Err(err) = flatten::expand(&next.attrs, &next.qualify(prefix), value) {
            eprintln!("flatlog: cannot flatten value at {prefix:?}: {err}");
        }
        next
    }

    /// Like [`Logger::with_struct`], honoring the type's mask directives.
    pub fn with_masked<T: Flatten>(&self, prefix: &str, value: &T) -> Self {
        let next = self.fork();
        if let Err(err) = flatten::expand_masked(&next.attrs, &next.qualify(prefix), value) {
            eprintln!("flatlog: cannot flatten value at {prefix:?}: {err}");
        }
        next
    }

    #[track_caller]
    pub fn log(&self, level: Level, message: &str) {
        self.log_with(level, message, &[]);
    }

    /// Emit one record: pool-acquire, apply per-call pairs (object-valued
    /// pairs are flattened), merge accumulated attributes, run callbacks,
    /// hand to the handler, pool-release. Handler failures are reported to
    /// stderr and swallowed; a logging call never panics the caller's path.
    #[track_caller]
    pub fn log_with(&self, level: Level, message: &str, pairs: &[(&str, Value)]) {
        if !self.handler.enabled(level) {
            return;
        }

        let caller = Location::caller();
        let mut record = pool::acquire_record(level, message);
        record.source = Some(Source {
            file: caller.file(),
            line: caller.line(),
            module: None,
        });

        for (key, value) in pairs {
            let key = self.qualify(key);
            match value {
                // Structured values expand into one entry per leaf.
                Value::Object(_) => flatten::expand_value(&record.attrs, &key, value, &[]),
                _ => {
                    // The record is still exclusively ours: take the
                    // unlocked path.
                    if key.contains('.') {
                        record.attrs.set_by_dot_path(&key, value.clone());
                    } else {
                        record.attrs.set_fast(&key, value.clone());
                    }
                }
            }
        }

        self.finish(&mut record);
        pool::release_record(record);
    }

    /// Run the shared tail of record emission on an externally-built
    /// record. Used by the tracing bridge, which constructs records itself.
    pub fn log_record(&self, record: &mut Record) {
        if !self.handler.enabled(record.level) {
            return;
        }
        self.finish(record);
    }

    fn finish(&self, record: &mut Record) {
        if !self.attrs.is_empty() {
            record.attrs.merge(&self.attrs);
        }
        for callback in &self.callbacks {
            callback(record);
        }
        if let Err(err) = self.handler.handle(record) {
            eprintln!("flatlog: handler error: {err}");
        }
    }

    #[track_caller]
    pub fn trace(&self, message: &str) {
        self.log(Level::Trace, message);
    }

    #[track_caller]
    pub fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    #[track_caller]
    pub fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    #[track_caller]
    pub fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    #[track_caller]
    pub fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }

    #[track_caller]
    pub fn fatal(&self, message: &str) {
        self.log(Level::Fatal, message);
    }

    /// Logical separator between blocks of related output.
    #[track_caller]
    pub fn mark(&self, message: &str) {
        self.log(Level::Mark, message);
    }
}
