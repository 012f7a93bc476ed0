use std::error::Error;
use std::fmt::{Display, Formatter};

use bytes::Bytes;
use fnv::FnvHashMap;

/// Contains the capacity being used if no **cache.max_memory** is configured (64,000,000 bytes).
pub const DEFAULT_MAX_MEMORY: usize = 64_000_000;

/// Returns the allocated memory in bytes.
pub trait ByteSize {
    /// Returns the number of bytes which are accounted against the capacity of a cache.
    ///
    /// For file contents this is simply the number of payload bytes. The bookkeeping structures
    /// of the cache itself are not taken into account.
    fn allocated_size(&self) -> usize;
}

impl ByteSize for Bytes {
    fn allocated_size(&self) -> usize {
        self.len()
    }
}

/// Enumerates the conditions reported by the internal list operations.
#[derive(Debug, PartialEq, Eq)]
pub enum CacheError {
    /// An eviction was requested but the cache doesn't contain any entry.
    Empty,

    /// An entry was about to be promoted, but no entry exists for the given key.
    NotFound,
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            CacheError::Empty => write!(f, "The cache is empty"),
            CacheError::NotFound => write!(f, "No such entry in the cache"),
        }
    }
}

impl Error for CacheError {}

/// Describes the outcome of [LRUCache::put].
///
/// Note that storing a value never fails from the perspective of a caller. If the value cannot
/// be cached, it is simply not stored and **Rejected** is reported.
#[derive(Debug, PartialEq, Eq, Copy, Clone)]
pub enum Admission {
    /// The value has been stored. **evicted** contains the number of entries which had to be
    /// dropped to make room for it.
    Stored {
        /// The number of least recently used entries which were evicted.
        evicted: usize,
    },

    /// The value is empty or larger than the whole cache and has therefore not been stored.
    Rejected,
}

/// Provides a size constrained LRU cache.
///
/// A cache behaves just like a **Map** as long as there is no shortage in storage. However, once
/// the allocated memory would exceed the given limit, old (least recently used) entries will be
/// evicted - hence the name LRU cache.
///
/// Internally all entries are kept in a doubly linked list which lives in a single **Vec**. The
/// nodes refer to each other by their slot index and a hash map resolves a key to its slot. The
/// front (head) of the list is the most recently used entry, the back (tail) the least recently
/// used one. Freed slots are recycled for subsequent insertions.
///
/// # Examples
/// ```
/// # use filecache::lru::{Admission, LRUCache};
/// # use bytes::Bytes;
/// // Specifies a cache which can store up to 16 bytes of content...
/// let mut lru = LRUCache::new(16);
///
/// lru.put("a.txt".to_owned(), Bytes::from_static(b"12345678"));
/// assert_eq!(lru.get("a.txt").unwrap(), &Bytes::from_static(b"12345678"));
///
/// // this will still fit..
/// lru.put("b.txt".to_owned(), Bytes::from_static(b"12345678"));
/// assert_eq!(lru.allocated_memory(), 16);
///
/// // this will hit the memory constraint and therefore throw out "b.txt" as "a.txt"
/// // is used once more...
/// assert_eq!(lru.get("a.txt").is_some(), true);
/// assert_eq!(
///     lru.put("c.txt".to_owned(), Bytes::from_static(b"123")),
///     Admission::Stored { evicted: 1 }
/// );
/// assert_eq!(lru.get("a.txt").is_some(), true);
/// assert_eq!(lru.get("b.txt").is_some(), false);
///
/// // a value which is larger than the whole cache is never stored...
/// assert_eq!(
///     lru.put("d.txt".to_owned(), Bytes::from(vec![0u8; 17])),
///     Admission::Rejected
/// );
///```
pub struct LRUCache<V: ByteSize> {
    allocated_memory: usize,
    max_memory: usize,
    reads: usize,
    hits: usize,
    writes: usize,
    nodes: Vec<Option<Node<V>>>,
    free_slots: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    index: FnvHashMap<String, usize>,
}

struct Node<V> {
    key: String,
    value: V,
    mem_size: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<V: ByteSize> LRUCache<V> {
    /// Creates a new cache which can store as many entries until they occupy **max_memory** bytes.
    ///
    /// Note that the limit is fixed for the lifetime of the cache.
    pub fn new(max_memory: usize) -> Self {
        LRUCache {
            allocated_memory: 0,
            max_memory,
            reads: 0,
            hits: 0,
            writes: 0,
            nodes: Vec::new(),
            free_slots: Vec::new(),
            head: None,
            tail: None,
            index: FnvHashMap::default(),
        }
    }

    /// Stores the given value for the given key and marks it as most recently used.
    ///
    /// Empty values and values which are larger than **max_memory** are rejected without touching
    /// the cache at all. Otherwise the least recently used entries are evicted until the value
    /// fits. If a value is already present for the given key, it is replaced.
    pub fn put(&mut self, key: String, value: V) -> Admission {
        let mem_size = value.allocated_size();
        if mem_size == 0 || mem_size > self.max_memory {
            return Admission::Rejected;
        }

        self.writes += 1;

        if let Some(slot) = self.index.remove(&key) {
            let _ = self.release(slot);
        }

        let mut evicted = 0;
        while self.allocated_memory + mem_size > self.max_memory {
            if self.evict().is_err() {
                return Admission::Rejected;
            }
            evicted += 1;
        }

        let slot = self.allocate(Node {
            key: key.clone(),
            value,
            mem_size,
            prev: None,
            next: None,
        });
        self.link_front(slot);
        let _ = self.index.insert(key, slot);
        self.allocated_memory += mem_size;

        Admission::Stored { evicted }
    }

    /// Returns the value which has previously been stored for the given key or **None** if
    /// no value is present.
    ///
    /// A hit moves the entry to the front so that it is the last one to be evicted. A miss has
    /// no side effects other than being counted.
    pub fn get(&mut self, key: &str) -> Option<&V> {
        self.reads += 1;

        self.promote(key).ok()?;
        self.hits += 1;

        let slot = *self.index.get(key)?;
        self.nodes[slot].as_ref().map(|node| &node.value)
    }

    /// Determines if a value is present for the given key without marking it as used.
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Removes and returns the least recently used entry.
    fn evict(&mut self) -> Result<(String, V), CacheError> {
        let slot = self.tail.ok_or(CacheError::Empty)?;
        let node = self.release(slot).ok_or(CacheError::Empty)?;
        let _ = self.index.remove(&node.key);

        log::debug!("Evicted {} from the cache.", node.key);

        Ok((node.key, node.value))
    }

    /// Moves the entry for the given key to the front of the list.
    fn promote(&mut self, key: &str) -> Result<(), CacheError> {
        let slot = *self.index.get(key).ok_or(CacheError::NotFound)?;
        if self.head != Some(slot) {
            self.unlink(slot);
            self.link_front(slot);
        }

        Ok(())
    }

    fn allocate(&mut self, node: Node<V>) -> usize {
        if let Some(slot) = self.free_slots.pop() {
            self.nodes[slot] = Some(node);
            slot
        } else {
            self.nodes.push(Some(node));
            self.nodes.len() - 1
        }
    }

    /// Unlinks the node in the given slot, frees the slot and corrects the allocated memory.
    ///
    /// Note that the caller has to take care of the index.
    fn release(&mut self, slot: usize) -> Option<Node<V>> {
        self.unlink(slot);
        let node = self.nodes[slot].take()?;
        self.free_slots.push(slot);
        self.allocated_memory -= node.mem_size;

        Some(node)
    }

    fn unlink(&mut self, slot: usize) {
        let (prev, next) = match &self.nodes[slot] {
            Some(node) => (node.prev, node.next),
            None => return,
        };

        match prev {
            Some(prev) => {
                if let Some(node) = self.nodes[prev].as_mut() {
                    node.next = next;
                }
            }
            None => self.head = next,
        }

        match next {
            Some(next) => {
                if let Some(node) = self.nodes[next].as_mut() {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }

        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = None;
        }
    }

    fn link_front(&mut self, slot: usize) {
        let previous_head = self.head;
        if let Some(node) = self.nodes[slot].as_mut() {
            node.prev = None;
            node.next = previous_head;
        }

        match previous_head {
            Some(head) => {
                if let Some(node) = self.nodes[head].as_mut() {
                    node.prev = Some(slot);
                }
            }
            None => self.tail = Some(slot),
        }

        self.head = Some(slot);
    }

    /// Lists all keys from the most recently used to the least recently used one.
    pub fn keys(&self) -> Vec<&str> {
        let mut result = Vec::with_capacity(self.index.len());
        let mut cursor = self.head;
        while let Some(slot) = cursor {
            match &self.nodes[slot] {
                Some(node) => {
                    result.push(node.key.as_str());
                    cursor = node.next;
                }
                None => break,
            }
        }

        result
    }

    /// Returns the number of entries in the cache.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Determines if the cache is completely empty.
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Returns the maximal number of bytes to be occupied by this cache.
    pub fn max_memory(&self) -> usize {
        self.max_memory
    }

    /// Returns the sum of the sizes of all entries in bytes.
    pub fn allocated_memory(&self) -> usize {
        self.allocated_memory
    }

    /// Returns the memory utilization in percent.
    pub fn memory_utilization(&self) -> f32 {
        match self.max_memory {
            0 => 0.,
            n => self.allocated_memory as f32 / n as f32 * 100.,
        }
    }

    /// Returns the cache hit rate in percent.
    pub fn hit_rate(&self) -> f32 {
        match self.reads {
            0 => 0.,
            n => self.hits as f32 / n as f32 * 100.,
        }
    }

    /// Returns the total number of reads performed on this cache.
    pub fn reads(&self) -> usize {
        self.reads
    }

    /// Returns the number of reads which were answered by a cached value.
    pub fn hits(&self) -> usize {
        self.hits
    }

    /// Returns the total number of values stored in this cache.
    pub fn writes(&self) -> usize {
        self.writes
    }
}

#[cfg(test)]
mod tests {
    use crate::lru::lru_cache::{Admission, CacheError, DEFAULT_MAX_MEMORY};
    use crate::lru::LRUCache;
    use bytes::Bytes;

    fn payload(len: usize) -> Bytes {
        Bytes::from(vec![b'x'; len])
    }

    /// Creates a cache containing test1 (10 bytes), test2 (20 bytes) and test3 (30 bytes).
    fn example_cache() -> LRUCache<Bytes> {
        let mut lru = LRUCache::new(DEFAULT_MAX_MEMORY);
        let _ = lru.put("test1".to_owned(), payload(10));
        let _ = lru.put("test2".to_owned(), payload(20));
        let _ = lru.put("test3".to_owned(), payload(30));

        lru
    }

    /// Verifies that the list, the index and the size accounting agree with each other.
    fn assert_consistent(lru: &LRUCache<Bytes>) {
        let mut forward = Vec::new();
        let mut size = 0;
        let mut previous = None;
        let mut cursor = lru.head;
        while let Some(slot) = cursor {
            let node = lru.nodes[slot].as_ref().unwrap();
            assert_eq!(node.prev, previous);
            assert_eq!(lru.index.get(&node.key), Some(&slot));
            size += node.mem_size;
            forward.push(slot);
            previous = Some(slot);
            cursor = node.next;
        }

        assert_eq!(lru.tail, previous);
        assert_eq!(forward.len(), lru.index.len());
        assert_eq!(size, lru.allocated_memory());
        assert_eq!(lru.allocated_memory() <= lru.max_memory(), true);
    }

    #[test]
    fn evicting_drops_the_least_recently_used_entry() {
        let mut lru = example_cache();
        assert_eq!(lru.allocated_memory(), 60);
        assert_eq!(lru.keys(), vec!["test3", "test2", "test1"]);

        assert_eq!(lru.evict().unwrap().0, "test1");
        assert_eq!(lru.allocated_memory(), 50);
        assert_consistent(&lru);

        assert_eq!(lru.evict().unwrap().0, "test2");
        assert_eq!(lru.evict().unwrap().0, "test3");
        assert_eq!(lru.allocated_memory(), 0);
        assert_consistent(&lru);

        // Evicting from an empty cache is reported and doesn't change anything...
        assert_eq!(lru.evict().err(), Some(CacheError::Empty));
        assert_eq!(lru.allocated_memory(), 0);
        assert_eq!(lru.is_empty(), true);
    }

    #[test]
    fn promoting_an_entry_protects_it_from_eviction() {
        let mut lru = example_cache();

        lru.promote("test1").unwrap();
        assert_eq!(lru.keys(), vec!["test1", "test3", "test2"]);

        // "test2" is now the least recently used entry...
        assert_eq!(lru.evict().unwrap().0, "test2");
        assert_eq!(lru.allocated_memory(), 40);
        assert_consistent(&lru);

        assert_eq!(lru.promote("testX"), Err(CacheError::NotFound));
        assert_eq!(lru.keys(), vec!["test1", "test3"]);
    }

    #[test]
    fn put_accounts_size_and_evicts_only_when_required() {
        let mut lru = example_cache();
        assert_eq!(
            lru.put("test4".to_owned(), payload(10)),
            Admission::Stored { evicted: 0 }
        );
        assert_eq!(lru.allocated_memory(), 70);
        assert_eq!(lru.contains("test4"), true);

        // Fill the cache up to 10 bytes below its capacity...
        let mut lru = example_cache();
        let _ = lru.put("filler".to_owned(), payload(DEFAULT_MAX_MEMORY - 70));
        assert_eq!(lru.allocated_memory(), DEFAULT_MAX_MEMORY - 10);
        assert_eq!(lru.len(), 4);

        // ...so that the next 10 bytes fit exactly...
        assert_eq!(
            lru.put("test4".to_owned(), payload(10)),
            Admission::Stored { evicted: 0 }
        );
        assert_eq!(lru.len(), 5);
        assert_eq!(lru.allocated_memory(), DEFAULT_MAX_MEMORY);

        // ...and another 10 bytes force exactly one eviction.
        assert_eq!(
            lru.put("test5".to_owned(), payload(10)),
            Admission::Stored { evicted: 1 }
        );
        assert_eq!(lru.len(), 5);
        assert_eq!(lru.contains("test1"), false);
        assert_eq!(lru.keys()[0], "test5");
        assert_consistent(&lru);
    }

    #[test]
    fn oversized_and_empty_values_are_rejected_without_evicting() {
        let mut lru = LRUCache::new(100);
        let _ = lru.put("a".to_owned(), payload(60));
        let _ = lru.put("b".to_owned(), payload(40));

        assert_eq!(lru.put("c".to_owned(), payload(101)), Admission::Rejected);
        assert_eq!(lru.put("d".to_owned(), Bytes::new()), Admission::Rejected);
        assert_eq!(lru.keys(), vec!["b", "a"]);
        assert_eq!(lru.allocated_memory(), 100);
        assert_eq!(lru.writes(), 2);

        // A value matching the capacity exactly is accepted but replaces everything else...
        assert_eq!(
            lru.put("e".to_owned(), payload(100)),
            Admission::Stored { evicted: 2 }
        );
        assert_eq!(lru.keys(), vec!["e"]);
        assert_consistent(&lru);
    }

    #[test]
    fn get_returns_the_stored_content_and_promotes_it() {
        let mut lru = example_cache();
        let _ = lru.put("test4".to_owned(), Bytes::from_static(b"0123456789"));
        let _ = lru.put("test5".to_owned(), Bytes::from_static(b"0123456789"));
        assert_eq!(lru.allocated_memory(), 80);

        assert_eq!(
            lru.get("test4").unwrap(),
            &Bytes::from_static(b"0123456789")
        );
        assert_eq!(lru.keys()[0], "test4");

        // A miss doesn't change the order...
        assert_eq!(lru.get("unknown"), None);
        assert_eq!(lru.keys(), vec!["test4", "test5", "test3", "test2", "test1"]);
        assert_consistent(&lru);
    }

    #[test]
    fn replacing_an_entry_corrects_size_and_order() {
        let mut lru = example_cache();
        let _ = lru.put("test1".to_owned(), payload(5));

        assert_eq!(lru.len(), 3);
        assert_eq!(lru.allocated_memory(), 55);
        assert_eq!(lru.keys(), vec!["test1", "test3", "test2"]);
        assert_consistent(&lru);
    }

    #[test]
    fn invariants_hold_for_a_mixed_workload() {
        let mut lru = LRUCache::new(1_000);
        for round in 0..500 {
            let key = format!("file-{}", round % 37);
            if round % 3 == 0 {
                let _ = lru.get(&key);
            } else {
                let _ = lru.put(key.clone(), payload((round * 7919) % 250 + 1));
                assert_eq!(lru.keys()[0], key);
            }
            assert_consistent(&lru);
        }

        // Freed slots are recycled instead of growing the arena forever...
        assert_eq!(lru.nodes.len() <= 37, true);
    }

    #[test]
    fn metrics_are_computed_correctly() {
        let mut lru = LRUCache::new(10);
        let _ = lru.put("A".to_owned(), payload(2));
        let _ = lru.put("B".to_owned(), payload(2));
        let _ = lru.put("C".to_owned(), payload(2));

        // Perform 4 reads, of which 3 hit a cache entry...
        assert_eq!(lru.get("A").is_some(), true);
        assert_eq!(lru.get("B").is_some(), true);
        assert_eq!(lru.get("C").is_some(), true);
        assert_eq!(lru.get("D").is_none(), true);

        assert_eq!(lru.writes(), 3);
        assert_eq!(lru.reads(), 4);
        assert_eq!(lru.hits(), 3);
        assert_eq!(lru.hit_rate().round() as i32, 75);

        // 6 of 10 bytes are in use...
        assert_eq!(lru.memory_utilization().round() as i32, 60);
    }
}
