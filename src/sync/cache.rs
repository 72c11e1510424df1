//! Short-TTL memoization used by the vendor client.
//!
//! Entries expire `ttl` after they were stored. Reads take a shared lock so
//! several reconcilers can look at the same snapshot at once; `put`/`clear`
//! take the exclusive lock. Two concurrent misses both populate the entry and
//! the last write wins.
//!
//! While the cache is held, nothing expires; `clear` still evicts.
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};

/// Source of "now" for expiry decisions.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    base: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(|p| p.into_inner());
        *offset += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(|p| p.into_inner());
        self.base + offset
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    value: V,
    created_at: Instant,
}

/// Age and remaining lifetime of one cached key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryInfo<K> {
    pub key: K,
    pub age: Duration,
    pub expires_in: Duration,
}

pub struct TtlCache<K, V> {
    entries: RwLock<HashMap<K, CacheEntry<V>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
    held: AtomicBool,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Arc::new(SystemClock))
    }

    pub fn with_clock(ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
            clock,
            held: AtomicBool::new(false),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Suspends (`true`) or resumes (`false`) expiry.
    pub fn hold(&self, held: bool) {
        self.held.store(held, Ordering::SeqCst);
    }

    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::SeqCst)
    }

    fn is_live(&self, age: Duration) -> bool {
        age < self.ttl || self.is_held()
    }

    /// Returns the cached value while it is younger than the TTL.
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .get(key)
            .filter(|e| self.is_live(now.saturating_duration_since(e.created_at)))
            .map(|e| e.value.clone())
    }

    pub fn put(&self, key: K, value: V) {
        let created_at = self.clock.now();
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        // Opportunistic sweep so expired payloads do not linger.
        entries.retain(|_, e| self.is_live(created_at.saturating_duration_since(e.created_at)));
        entries.insert(key, CacheEntry { value, created_at });
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|p| p.into_inner());
        entries.clear();
    }

    /// Live (unexpired) entries with their age.
    pub fn entries(&self) -> Vec<EntryInfo<K>> {
        let now = self.clock.now();
        let entries = self.entries.read().unwrap_or_else(|p| p.into_inner());
        entries
            .iter()
            .filter_map(|(k, e)| {
                let age = now.saturating_duration_since(e.created_at);
                self.is_live(age).then(|| EntryInfo {
                    key: k.clone(),
                    age,
                    expires_in: self.ttl.saturating_sub(age),
                })
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl_secs: u64) -> (TtlCache<&'static str, String>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new());
        let cache = TtlCache::with_clock(Duration::from_secs(ttl_secs), clock.clone());
        (cache, clock)
    }

    #[test]
    fn returns_value_within_ttl() {
        let (cache, clock) = cache(60);
        cache.put("products", "payload".to_string());
        clock.advance(Duration::from_secs(59));
        assert_eq!(cache.get(&"products").as_deref(), Some("payload"));
    }

    #[test]
    fn expires_at_ttl() {
        let (cache, clock) = cache(60);
        cache.put("products", "payload".to_string());
        clock.advance(Duration::from_secs(60));
        assert_eq!(cache.get(&"products"), None);
        assert!(cache.is_empty());
    }

    #[test]
    fn held_entries_outlive_ttl_until_released() {
        let (cache, clock) = cache(60);
        cache.put("products", "payload".to_string());
        cache.hold(true);
        clock.advance(Duration::from_secs(120));
        cache.put("prices", "b".to_string());
        assert_eq!(cache.get(&"products").as_deref(), Some("payload"));

        cache.hold(false);
        assert_eq!(cache.get(&"products"), None);
        assert_eq!(cache.get(&"prices").as_deref(), Some("b"));
    }

    #[test]
    fn clear_evicts_held_entries() {
        let (cache, _clock) = cache(60);
        cache.hold(true);
        cache.put("products", "a".to_string());
        cache.clear();
        assert_eq!(cache.get(&"products"), None);
    }

    #[test]
    fn clear_evicts_everything() {
        let (cache, _clock) = cache(60);
        cache.put("products", "a".to_string());
        cache.put("prices", "b".to_string());
        assert_eq!(cache.len(), 2);
        cache.clear();
        assert_eq!(cache.get(&"products"), None);
        assert_eq!(cache.get(&"prices"), None);
    }

    #[test]
    fn put_overwrites_and_resets_age() {
        let (cache, clock) = cache(10);
        cache.put("products", "old".to_string());
        clock.advance(Duration::from_secs(8));
        cache.put("products", "new".to_string());
        clock.advance(Duration::from_secs(8));
        assert_eq!(cache.get(&"products").as_deref(), Some("new"));
    }

    #[test]
    fn entries_report_age_and_remaining_lifetime() {
        let (cache, clock) = cache(30);
        cache.put("products", "a".to_string());
        clock.advance(Duration::from_secs(10));
        let info = cache.entries();
        assert_eq!(
            info,
            vec![EntryInfo {
                key: "products",
                age: Duration::from_secs(10),
                expires_in: Duration::from_secs(20),
            }]
        );
    }
}
