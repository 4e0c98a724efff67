use crate::attrs::AttrMap;
use crate::format::{FormatError, Formatter};
use crate::pool;
use crate::record::{Level, Record};
use parking_lot::Mutex;
use std::io::Write;

#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error(transparent)]
    Format(#[from] FormatError),

    #[error("write to destination failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("async channel full, record dropped")]
    ChannelFull,
}

/// Terminal stage of a log call: formats a finalized record and moves the
/// bytes somewhere.
///
/// `handle` receives the record by shared reference because a record may be
/// fanned out to several handlers. By that point the record is frozen by
/// convention; the one sanctioned mutation is merging the handler's own
/// accumulated attributes into the record's store, which the store's lock
/// makes safe.
pub trait Handler: Send + Sync {
    fn handle(&self, record: &Record) -> Result<(), HandlerError>;

    /// Level gate consulted before a record is even built.
    fn enabled(&self, _level: Level) -> bool {
        true
    }
}

/// Synchronous handler writing formatted records to any `Write`
/// destination behind a mutex: stdout, stderr, a file, or a test buffer.
pub struct WriterHandler {
    formatter: Box<dyn Formatter>,
    destination: Mutex<Box<dyn Write + Send>>,
    attrs: AttrMap,
    min_level: Level,
}

impl WriterHandler {
    pub fn new(formatter: Box<dyn Formatter>, destination: Box<dyn Write + Send>) -> Self {
        Self {
            formatter,
            destination: Mutex::new(destination),
            attrs: AttrMap::new(),
            min_level: Level::Trace,
        }
    }

    pub fn stdout(formatter: Box<dyn Formatter>) -> Self {
        Self::new(formatter, Box::new(std::io::stdout()))
    }

    pub fn stderr(formatter: Box<dyn Formatter>) -> Self {
        Self::new(formatter, Box::new(std::io::stderr()))
    }

    pub fn with_min_level(mut self, level: Level) -> Self {
        self.min_level = level;
        self
    }

    /// Attach handler-level attributes, merged into every record this
    /// handler processes.
    pub fn with_attrs(mut self, attrs: AttrMap) -> Self {
        self.attrs = attrs;
        self
    }
}

impl Handler for WriterHandler {
    fn handle(&self, record: &Record) -> Result<(), HandlerError> {
        if !self.attrs.is_empty() {
            record.attrs.merge(&self.attrs);
        }

        let mut buf = pool::acquire_buffer();
        let outcome = match self.formatter.format(record, &mut buf) {
            Ok(()) => {
                let mut destination = self.destination.lock();
                destination
                    .write_all(&buf)
                    .and_then(|()| destination.flush())
                    .map_err(HandlerError::from)
            }
            Err(err) => Err(err.into()),
        };
        pool::release_buffer(buf);
        outcome
    }

    fn enabled(&self, level: Level) -> bool {
        level >= self.min_level
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::io::Write;
    use std::sync::{Arc, Mutex};

    /// `Write` destination capturing bytes for assertions.
    #[derive(Clone, Default)]
    pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

    impl SharedBuffer {
        pub fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::SharedBuffer;
    use super::*;
    use crate::format::{JsonFormatter, TextFormatter};
    use serde_json::{json, Value};

    #[test]
    fn writes_formatted_record_to_destination() {
        let sink = SharedBuffer::default();
        let handler = WriterHandler::new(Box::new(JsonFormatter), Box::new(sink.clone()));
        let record = Record::new(Level::Info, "hi").with_dot("k", 1);
        handler.handle(&record).unwrap();
        let parsed: Value = serde_json::from_str(sink.contents().trim()).unwrap();
        assert_eq!(parsed["message"], json!("hi"));
        assert_eq!(parsed["k"], json!(1));
    }

    #[test]
    fn handler_attrs_merge_into_each_record() {
        let sink = SharedBuffer::default();
        let shared = AttrMap::new();
        shared.set_by_dot_path("service", "api");
        let handler =
            WriterHandler::new(Box::new(JsonFormatter), Box::new(sink.clone())).with_attrs(shared);

        let record = Record::new(Level::Info, "one");
        handler.handle(&record).unwrap();
        let parsed: Value = serde_json::from_str(sink.contents().trim()).unwrap();
        assert_eq!(parsed["service"], json!("api"));
        // Handler attributes win on conflict, like any merge source.
        let record = Record::new(Level::Info, "two").with_dot("service", "caller");
        handler.handle(&record).unwrap();
        assert_eq!(record.attrs.get_by_dot_path("service"), Some(json!("api")));
    }

    #[test]
    fn min_level_gates() {
        let handler = WriterHandler::new(Box::new(TextFormatter), Box::new(std::io::sink()))
            .with_min_level(Level::Warn);
        assert!(!handler.enabled(Level::Debug));
        assert!(handler.enabled(Level::Warn));
        assert!(handler.enabled(Level::Mark));
    }
}
