use crate::attrs::AttrMap;
use crate::logger::Logger;
use crate::pool;
use crate::record::{Level, Source};
use std::sync::Arc;
use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};
use tracing_subscriber::registry::LookupSpan;

/// `tracing_subscriber` layer that converts `tracing` events into records
/// and emits them through a [`Logger`].
///
/// Event fields land in the record's attribute store; a field named
/// `message` becomes the record message, and field names containing `.`
/// are stored as the dotted paths they already are. Install it on a
/// registry to route an application's existing `tracing` instrumentation
/// through this crate's handlers.
pub struct BridgeLayer {
    logger: Arc<Logger>,
}

impl BridgeLayer {
    pub fn new(logger: Arc<Logger>) -> Self {
        Self { logger }
    }
}

fn map_level(level: &tracing::Level) -> Level {
    match *level {
        tracing::Level::TRACE => Level::Trace,
        tracing::Level::DEBUG => Level::Debug,
        tracing::Level::INFO => Level::Info,
        tracing::Level::WARN => Level::Warn,
        tracing::Level::ERROR => Level::Error,
    }
}

impl<S> Layer<S> for BridgeLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        let mut record = pool::acquire_record(map_level(meta.level()), "");

        let mut visitor = FieldVisitor {
            attrs: &mut record.attrs,
            message: None,
        };
        event.record(&mut visitor);
        if let Some(message) = visitor.message {
            record.message.push_str(&message);
        }

        if let Some(file) = meta.file() {
            record.source = Some(Source {
                file,
                line: meta.line().unwrap_or(0),
                module: meta.module_path(),
            });
        }

        self.logger.log_record(&mut record);
        pool::release_record(record);
    }
}

/// Visitor writing event fields into a record's still-exclusive store.
struct FieldVisitor<'a> {
    attrs: &'a mut AttrMap,
    message: Option<String>,
}

impl<'a> FieldVisitor<'a> {
    fn store(&mut self, field: &Field, value: serde_json::Value) {
        let name = field.name();
        if name.contains('.') {
            self.attrs.set_by_dot_path(name, value);
        } else {
            self.attrs.set_fast(name, value);
        }
    }
}

impl<'a> Visit for FieldVisitor<'a> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = Some(value.to_owned());
        } else {
            self.store(field, serde_json::Value::String(value.to_owned()));
        }
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.store(field, serde_json::Value::from(value));
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.store(field, serde_json::Value::from(value));
    }

    fn record_f64(&mut self, field: &Field, value: f64) {
        self.store(field, serde_json::Value::from(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.store(field, serde_json::Value::from(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        let rendered = format!("{value:?}");
        if field.name() == "message" {
            self.message = Some(rendered);
        } else {
            self.store(field, serde_json::Value::String(rendered));
        }
    }
}
