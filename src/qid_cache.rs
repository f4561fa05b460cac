use mini_moka::unsync::Cache;
use std::fmt;

/// There are 290 Swedish municipalities
pub const DEFAULT_QID_CACHE_SIZE: u64 = 300;

/// Bounded name -> QID cache
pub struct QidCache {
    capacity: u64,
    cache: Cache<String, String>,
}

impl fmt::Debug for QidCache {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("QidCache")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for QidCache {
    fn default() -> Self {
        Self::new(DEFAULT_QID_CACHE_SIZE)
    }
}

impl QidCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            cache: Cache::builder().max_capacity(capacity).build(),
        }
    }

    pub fn get(&mut self, key: &str) -> Option<String> {
        self.cache.get(&key.to_string()).cloned()
    }

    pub fn insert(&mut self, key: &str, qid: &str) {
        if self.capacity == 0 {
            return;
        }
        self.cache.insert(key.to_string(), qid.to_string());
    }

    pub fn invalidate(&mut self, key: &str) {
        self.cache.invalidate(&key.to_string());
    }

    pub fn clear(&mut self) {
        self.cache.invalidate_all();
    }

    pub fn len(&self) -> usize {
        self.cache.entry_count() as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
