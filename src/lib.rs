//! Structured logging built around a concurrent flat attribute store.
//!
//! Attributes live in an [`AttrMap`]: a single map from dot-joined key
//! paths (`"user.profile.name"`) to [`serde_json::Value`] payloads, with a
//! fixed inline tier that avoids map allocation for the common
//! few-attributes case. Structured values are flattened into dotted leaf
//! paths (with optional per-field masking), records and stores are
//! recycled through bounded pools, and formatters render either the flat
//! form directly or a nested view materialized on demand.

pub mod attrs;
pub mod flatten;
pub mod format;
pub mod handler;
pub mod logger;
pub mod mask;
pub mod pool;
pub mod record;

pub mod async_handler;

#[cfg(feature = "bridge")]
pub mod bridge;

mod global;

pub use attrs::{AttrMap, INLINE_CAPACITY};
pub use async_handler::{AsyncHandler, AsyncSink, NoopSink};
pub use flatten::Flatten;
pub use format::{
    FormatError, Formatter, JsonFormatter, KeyValueFormatter, NestedJsonFormatter, TextFormatter,
};
pub use global::{
    debug, default_logger, error, fatal, info, log_with, mark, set_default_logger, trace, warn,
};
pub use handler::{Handler, HandlerError, WriterHandler};
pub use logger::Logger;
pub use mask::MaskDirective;
pub use pool::{pools, Pool, Pools, Reset};
pub use record::{Level, Record, Source};

#[cfg(feature = "bridge")]
pub use bridge::BridgeLayer;
