//! Provides an actor which owns the file cache shared by all connections.
//!
//! Every connection runs in its own task but all of them operate on a single
//! [LRUCache](crate::lru::LRUCache). Instead of guarding the cache with a lock, a single task owns
//! it and processes one message after another. The [FileCache](FileCache) handle which is
//! registered in the [Platform](crate::platform::Platform) only contains the sending side of the
//! queue and can therefore be cloned and shared freely. Each operation sends a message along with
//! the sender of a oneshot channel and awaits the reply. This way a **get** (including the
//! promotion of the entry) or a **put** (including all evictions) is always applied atomically.
//!
//! # Configuration
//! The capacity of the cache is read once during [install](install) and remains fixed afterwards:
//!
//! ```yaml
//! cache:
//!     # Specifies the maximal amount of memory to use (in bytes).
//!     # Supports common suffixes like: k, m, g, t (powers of 1024, so 64m would be 64 MiB)
//!     max_memory: 64000000
//! ```
//!
//! If no value is given, [DEFAULT_MAX_MEMORY](crate::lru::DEFAULT_MAX_MEMORY) is used.
use std::fmt::{Display, Formatter};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::config::Config;
use crate::fmt::format_size;
use crate::lru::{Admission, LRUCache, DEFAULT_MAX_MEMORY};
use crate::platform::Platform;
use crate::spawn;

/// Determines how many calls may be queued up for the actor before callers have to wait.
const QUEUE_SIZE: usize = 1024;

/// Enumerates the messages processed by the actor.
enum Call {
    Get {
        name: String,
        reply: oneshot::Sender<Option<Bytes>>,
    },
    Put {
        name: String,
        content: Bytes,
        reply: oneshot::Sender<Admission>,
    },
    Stats {
        reply: oneshot::Sender<CacheStats>,
    },
}

/// Contains a snapshot of the metrics of a cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Contains the number of cached files.
    pub entries: usize,

    /// Contains the total size of all cached files in bytes.
    pub allocated_memory: usize,

    /// Contains the capacity of the cache in bytes.
    pub max_memory: usize,

    /// Contains the number of lookups performed.
    pub reads: usize,

    /// Contains the number of lookups which were answered from the cache.
    pub hits: usize,

    /// Contains the number of files which have been stored.
    pub writes: usize,
}

impl CacheStats {
    fn of(lru: &LRUCache<Bytes>) -> Self {
        CacheStats {
            entries: lru.len(),
            allocated_memory: lru.allocated_memory(),
            max_memory: lru.max_memory(),
            reads: lru.reads(),
            hits: lru.hits(),
            writes: lru.writes(),
        }
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }
}

impl Display for CacheStats {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} file(s), {} of {} in use, {} lookup(s) with a hit rate of {:.1} %",
            self.entries,
            format_size(self.allocated_memory),
            format_size(self.max_memory),
            self.reads,
            self.hit_rate()
        )
    }
}

/// Provides access to the shared file cache.
///
/// # Examples
/// ```
/// # use filecache::lru::cache::FileCache;
/// # use filecache::lru::Admission;
/// # use bytes::Bytes;
/// # #[tokio::main]
/// # async fn main() {
/// let cache = FileCache::new(1024);
///
/// assert_eq!(cache.get("index.html").await, None);
/// assert_eq!(
///     cache.put("index.html", Bytes::from_static(b"<html/>")).await,
///     Admission::Stored { evicted: 0 }
/// );
/// assert_eq!(cache.get("index.html").await.unwrap(), Bytes::from_static(b"<html/>"));
/// # }
/// ```
#[derive(Clone)]
pub struct FileCache {
    queue: mpsc::Sender<Call>,
}

impl FileCache {
    /// Creates a new cache with the given capacity in bytes and forks the actor which owns it.
    ///
    /// Note that this has to be invoked within a tokio runtime. The actor terminates once the
    /// last handle has been dropped.
    pub fn new(max_memory: usize) -> Self {
        let (queue, endpoint) = mpsc::channel(QUEUE_SIZE);
        spawn!(actor(LRUCache::new(max_memory), endpoint));

        FileCache { queue }
    }

    /// Returns the cached content for the given name and marks it as most recently used.
    ///
    /// Returns **None** if the file isn't cached (or if the actor is gone).
    pub async fn get(&self, name: &str) -> Option<Bytes> {
        let (reply, response) = oneshot::channel();
        let call = Call::Get {
            name: name.to_owned(),
            reply,
        };
        if self.queue.send(call).await.is_err() {
            return None;
        }

        response.await.ok().flatten()
    }

    /// Tries to store the given content.
    ///
    /// This never fails. If the content cannot be cached, **Rejected** is returned.
    pub async fn put(&self, name: &str, content: Bytes) -> Admission {
        let (reply, response) = oneshot::channel();
        let call = Call::Put {
            name: name.to_owned(),
            content,
            reply,
        };
        if self.queue.send(call).await.is_err() {
            return Admission::Rejected;
        }

        response.await.unwrap_or(Admission::Rejected)
    }

    /// Obtains a snapshot of the cache metrics.
    pub async fn stats(&self) -> Option<CacheStats> {
        let (reply, response) = oneshot::channel();
        self.queue.send(Call::Stats { reply }).await.ok()?;
        response.await.ok()
    }
}

async fn actor(mut lru: LRUCache<Bytes>, mut endpoint: mpsc::Receiver<Call>) {
    while let Some(call) = endpoint.recv().await {
        match call {
            Call::Get { name, reply } => {
                let _ = reply.send(lru.get(&name).cloned());
            }
            Call::Put {
                name,
                content,
                reply,
            } => {
                let size = content.len();
                let admission = lru.put(name.clone(), content);
                match admission {
                    Admission::Stored { evicted } => log::debug!(
                        "Cached {} ({}), evicted {} file(s).",
                        name,
                        format_size(size),
                        evicted
                    ),
                    Admission::Rejected => log::debug!(
                        "Rejected {} ({}) from entering the cache due to size limitations.",
                        name,
                        format_size(size)
                    ),
                }
                let _ = reply.send(admission);
            }
            Call::Stats { reply } => {
                let _ = reply.send(CacheStats::of(&lru));
            }
        }
    }
}

/// Creates and installs the [FileCache](FileCache) into the given platform.
///
/// The capacity is determined by **cache.max_memory** in the [Config](crate::config::Config) (if
/// present). Note that this is called by the [Builder](crate::builder::Builder) unless disabled.
pub fn install(platform: &Arc<Platform>) -> Arc<FileCache> {
    let max_memory = platform
        .find::<Config>()
        .map(|config| {
            config
                .current()
                .size("cache.max_memory")
                .unwrap_or_else(|error| {
                    log::error!("Ignoring invalid cache.max_memory: {}", error);
                    None
                })
                .filter(|size| *size > 0)
                .unwrap_or(DEFAULT_MAX_MEMORY)
        })
        .unwrap_or(DEFAULT_MAX_MEMORY);

    log::info!("Caching up to {} of file contents.", format_size(max_memory));

    let cache = Arc::new(FileCache::new(max_memory));
    platform.register::<FileCache>(cache.clone());

    cache
}
