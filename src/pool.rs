use crate::attrs::AttrMap;
use crate::record::{Level, Record};
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::OnceLock;

/// How many released instances each pool retains before falling back to
/// plain drop/alloc.
pub const DEFAULT_POOL_CAPACITY: usize = 128;

/// Initial capacity reserved in pooled serialization scratch buffers.
pub const SCRATCH_BUFFER_CAPACITY: usize = 2048;

/// Restores an instance to its pristine state before it re-enters a pool.
/// Implementations keep underlying allocations where possible; that reuse
/// is the point of pooling.
pub trait Reset {
    fn reset(&mut self);
}

impl Reset for AttrMap {
    fn reset(&mut self) {
        self.clear();
    }
}

impl Reset for Record {
    fn reset(&mut self) {
        self.message.clear();
        self.attrs.clear();
        self.source = None;
        self.output_id = None;
    }
}

impl Reset for Vec<u8> {
    fn reset(&mut self) {
        self.clear();
    }
}

/// Bounded free-list of reusable instances.
///
/// There is no `sync.Pool` equivalent in Rust, so this is an explicit
/// free-list with a fixed capacity: `acquire` pops a recycled instance or
/// constructs a fresh one, `release` resets the instance and keeps it if
/// there is room. A released instance is always fully reset before it can
/// be handed out again.
///
/// Ownership does the misuse-prevention the original contract could only
/// document: `release` consumes the instance, so double-release and
/// use-after-release do not compile.
pub struct Pool<T> {
    free: Mutex<Vec<T>>,
    capacity: usize,
}

impl<T: Reset + Default> Pool<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            free: Mutex::new(Vec::with_capacity(capacity)),
            capacity,
        }
    }

    /// Pop a recycled instance, or construct a fresh one when the free-list
    /// is empty. Either way the result holds no prior state.
    pub fn acquire(&self) -> T {
        self.free.lock().pop().unwrap_or_default()
    }

    /// Reset `item` and return it to the free-list; drops it instead when
    /// the list is at capacity.
    pub fn release(&self, mut item: T) {
        item.reset();
        let mut free = self.free.lock();
        if free.len() < self.capacity {
            free.push(item);
        }
    }

    /// Discard every currently-pooled instance. Instances that are checked
    /// out are unaffected.
    pub fn drain(&self) {
        self.free.lock().clear();
    }

    /// Number of instances currently sitting in the free-list.
    pub fn pooled(&self) -> usize {
        self.free.lock().len()
    }
}

/// The process-wide pool set: attribute stores, records, and serialization
/// scratch buffers.
pub struct Pools {
    pub attrs: Pool<AttrMap>,
    pub records: Pool<Record>,
    pub buffers: Pool<Vec<u8>>,
}

impl Pools {
    pub fn new() -> Self {
        Self {
            attrs: Pool::new(DEFAULT_POOL_CAPACITY),
            records: Pool::new(DEFAULT_POOL_CAPACITY),
            buffers: Pool::new(DEFAULT_POOL_CAPACITY),
        }
    }

    /// Drain every pool; used for orderly shutdown and test isolation.
    pub fn drain_all(&self) {
        self.attrs.drain();
        self.records.drain();
        self.buffers.drain();
    }
}

impl Default for Pools {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to the process-wide pools, initialized on first use.
pub fn pools() -> &'static Pools {
    static POOLS: OnceLock<Pools> = OnceLock::new();
    POOLS.get_or_init(Pools::new)
}

/// Acquire a pooled record stamped with the current time, level and message.
pub fn acquire_record(level: Level, message: &str) -> Record {
    let mut record = pools().records.acquire();
    record.time = Utc::now();
    record.level = level;
    record.message.push_str(message);
    record
}

pub fn release_record(record: Record) {
    pools().records.release(record);
}

/// Acquire a scratch buffer with its backing capacity pre-reserved.
pub fn acquire_buffer() -> Vec<u8> {
    let mut buf = pools().buffers.acquire();
    if buf.capacity() < SCRATCH_BUFFER_CAPACITY {
        buf.reserve(SCRATCH_BUFFER_CAPACITY - buf.len());
    }
    buf
}

pub fn release_buffer(buf: Vec<u8>) {
    pools().buffers.release(buf);
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn released_store_comes_back_clean() {
        let pool: Pool<AttrMap> = Pool::new(4);
        let mut attrs = pool.acquire();
        for i in 0..12 {
            attrs.set_fast(&format!("k{i}"), i);
        }
        pool.release(attrs);

        let again = pool.acquire();
        assert!(again.is_empty());
        assert_eq!(again.len(), 0);
    }

    #[test]
    fn capacity_bounds_the_free_list() {
        let pool: Pool<Vec<u8>> = Pool::new(2);
        pool.release(vec![1]);
        pool.release(vec![2]);
        pool.release(vec![3]);
        assert_eq!(pool.pooled(), 2);
        // Empty list falls back to fresh construction.
        pool.drain();
        assert_eq!(pool.pooled(), 0);
        assert!(pool.acquire().is_empty());
    }

    #[test]
    fn record_round_trip_resets_everything() {
        let pool: Pool<Record> = Pool::new(4);
        let mut record = pool.acquire();
        record.message.push_str("boom");
        record.output_id = Some("id".into());
        record.attrs.set_fast("secret", json!("value"));
        pool.release(record);

        let next = pool.acquire();
        assert!(next.message.is_empty());
        assert!(next.output_id.is_none());
        assert!(next.attrs.is_empty());
    }

    #[test]
    fn concurrent_acquire_release() {
        use std::sync::Arc;
        let pool: Arc<Pool<AttrMap>> = Arc::new(Pool::new(16));
        let mut handles = Vec::new();
        for t in 0..8 {
            let pool = Arc::clone(&pool);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let mut attrs = pool.acquire();
                    assert!(attrs.is_empty());
                    attrs.set_fast("t", t);
                    attrs.set_fast("i", i);
                    pool.release(attrs);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(pool.pooled() <= 16);
    }

    #[test]
    fn drain_all_discards_pooled_instances() {
        let pools = Pools::new();
        pools.attrs.release(AttrMap::new());
        pools.records.release(Record::default());
        pools.buffers.release(Vec::new());
        assert_eq!(pools.attrs.pooled(), 1);
        pools.drain_all();
        assert_eq!(pools.attrs.pooled(), 0);
        assert_eq!(pools.records.pooled(), 0);
        assert_eq!(pools.buffers.pooled(), 0);
    }

    #[test]
    fn global_record_helpers() {
        let record = acquire_record(Level::Warn, "caution");
        assert_eq!(record.level, Level::Warn);
        assert_eq!(record.message, "caution");
        assert!(record.attrs.is_empty());
        release_record(record);

        let buf = acquire_buffer();
        assert!(buf.capacity() >= SCRATCH_BUFFER_CAPACITY);
        release_buffer(buf);
    }
}
