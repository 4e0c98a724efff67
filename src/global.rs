use crate::format::TextFormatter;
use crate::handler::WriterHandler;
use crate::logger::Logger;
use crate::record::Level;
use arc_swap::ArcSwap;
use serde_json::Value;
use std::sync::{Arc, OnceLock};

/// Process-wide default logger cell. Initialized exactly once, on first
/// access, with a text handler writing to stderr; replaceable at runtime
/// via [`set_default_logger`]. An explicit handle instead of bare mutable
/// module state: loads and stores are atomic, and in-flight users keep the
/// `Arc` they loaded.
fn cell() -> &'static ArcSwap<Logger> {
    static CELL: OnceLock<ArcSwap<Logger>> = OnceLock::new();
    CELL.get_or_init(|| {
        let handler = WriterHandler::stderr(Box::new(TextFormatter));
        ArcSwap::from_pointee(Logger::new(Arc::new(handler)))
    })
}

/// Current default logger.
pub fn default_logger() -> Arc<Logger> {
    cell().load_full()
}

/// Replace the default logger. Threads that already loaded the previous
/// one keep using it until they next call [`default_logger`].
pub fn set_default_logger(logger: Logger) {
    cell().store(Arc::new(logger));
}

pub fn trace(message: &str) {
    default_logger().trace(message);
}

pub fn debug(message: &str) {
    default_logger().debug(message);
}

pub fn info(message: &str) {
    default_logger().info(message);
}

pub fn warn(message: &str) {
    default_logger().warn(message);
}

pub fn error(message: &str) {
    default_logger().error(message);
}

pub fn fatal(message: &str) {
    default_logger().fatal(message);
}

pub fn mark(message: &str) {
    default_logger().mark(message);
}

pub fn log_with(level: Level, message: &str, pairs: &[(&str, Value)]) {
    default_logger().log_with(level, message, pairs);
}
