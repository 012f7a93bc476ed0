//! Provides a size constrained LRU Cache for file contents.
//!
//! An LRU cache drops the least recently used entry if it is about to grow beyond its memory
//! limit. Each entry is accounted with the number of bytes of its content and the sum of all
//! entries never exceeds the configured limit (64,000,000 bytes unless **cache.max_memory** says otherwise).
//! A file which is larger than the whole cache is simply never cached - it will still be served
//! from disk, every time it is requested.
//!
//! The [LRUCache](LRUCache) itself is a plain single threaded data structure. As all connections
//! of the server share a single cache, the [cache](cache) module wraps it into an actor which owns
//! the cache and processes one operation after another. To enable this,
//! [cache::install](cache::install) has to be called (which is done by the
//! [Builder](crate::builder::Builder) unless disabled).
pub mod cache;
mod lru_cache;

pub use lru_cache::Admission;
pub use lru_cache::ByteSize;
pub use lru_cache::CacheError;
pub use lru_cache::LRUCache;
pub use lru_cache::DEFAULT_MAX_MEMORY;
