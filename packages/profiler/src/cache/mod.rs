//! Similarity cache: exact lookups with a fuzzy-match fallback and TTLs.
//!
//! The in-memory map is authoritative; when a directory is supplied, writes
//! go through to one JSON file per entry and the map is rebuilt from disk at
//! open. Readers proceed in parallel under a read lock; `put` and `sweep`
//! take the write lock briefly. A reader may observe a just-expired entry
//! once; the next sweep removes it.

pub mod store;

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

use crate::error::CacheError;
use crate::normalize::{similarity, NormalizedKey, SIMILARITY_THRESHOLD};

pub use store::{file_stem, EntryStore, Provenance, StoredEntry};

/// A cache read result with its provenance.
#[derive(Debug, Clone)]
pub struct CacheHit<T> {
    pub value: T,
    pub provenance: Provenance,
}

/// Hit/miss counters, exposed through [`SimilarityCache::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub similarity_hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total_requests(&self) -> u64 {
        self.hits + self.similarity_hits + self.misses
    }

    /// Combined hit rate in [0, 1].
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            (self.hits + self.similarity_hits) as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct Entry {
    value: serde_json::Value,
    key: Option<NormalizedKey>,
    created_at_epoch_s: i64,
    ttl_s: u64,
}

impl Entry {
    fn is_expired(&self, now: i64) -> bool {
        now > self.created_at_epoch_s + self.ttl_s as i64
    }
}

/// KV store with fuzzy-match fallback, TTL expiry, and single-flight
/// deduplication of concurrent work on the same key.
pub struct SimilarityCache<T> {
    entries: RwLock<HashMap<String, Entry>>,
    store: Option<EntryStore>,
    ttl: Duration,
    /// Fuzzy matching applies only to entries carrying a NormalizedKey; the
    /// per-URL crawl cache disables it entirely.
    similarity_enabled: bool,
    stats: RwLock<CacheStats>,
    in_flight: AsyncMutex<HashMap<String, Arc<AsyncMutex<()>>>>,
    _marker: std::marker::PhantomData<fn() -> T>,
}

impl<T: Serialize + DeserializeOwned> SimilarityCache<T> {
    /// In-memory cache without persistence.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            store: None,
            ttl,
            similarity_enabled: true,
            stats: RwLock::new(CacheStats::default()),
            in_flight: AsyncMutex::new(HashMap::new()),
            _marker: std::marker::PhantomData,
        }
    }

    /// Open a persistent cache under `dir`, rebuilding the in-memory map
    /// from disk and sweeping expired entries.
    pub async fn open(dir: impl AsRef<std::path::Path>, ttl: Duration) -> Result<Self, CacheError> {
        let store = EntryStore::open(dir).await?;
        let mut map = HashMap::new();
        let now = chrono::Utc::now().timestamp();

        for stored in store.load_all().await? {
            if stored.is_expired(now) {
                store.remove(&stored.key).await?;
                continue;
            }
            let key = match (&stored.canonical, &stored.option_fingerprint) {
                (Some(canonical), Some(fingerprint)) => Some(NormalizedKey {
                    canonical: canonical.clone(),
                    type_tag: stored.type_tag,
                    option_fingerprint: fingerprint.clone(),
                }),
                _ => None,
            };
            map.insert(
                stored.key.clone(),
                Entry {
                    value: stored.value,
                    key,
                    created_at_epoch_s: stored.created_at_epoch_s,
                    ttl_s: stored.ttl_s,
                },
            );
        }

        info!(entries = map.len(), "Similarity cache opened");
        Ok(Self {
            entries: RwLock::new(map),
            store: Some(store),
            ttl,
            similarity_enabled: true,
            stats: RwLock::new(CacheStats::default()),
            in_flight: AsyncMutex::new(HashMap::new()),
            _marker: std::marker::PhantomData,
        })
    }

    /// Disable the fuzzy fallback (used by the per-URL crawl cache).
    pub fn exact_only(mut self) -> Self {
        self.similarity_enabled = false;
        self
    }

    /// Look up by normalized key: exact match first, then the best live
    /// fuzzy match at or above the similarity threshold.
    pub fn get(&self, key: &NormalizedKey) -> Option<CacheHit<T>> {
        let now = chrono::Utc::now().timestamp();
        let entries = self.entries.read().unwrap();

        if let Some(entry) = entries.get(&key.cache_key()) {
            if !entry.is_expired(now) {
                if let Ok(value) = serde_json::from_value(entry.value.clone()) {
                    drop(entries);
                    self.stats.write().unwrap().hits += 1;
                    return Some(CacheHit {
                        value,
                        provenance: Provenance::DirectHit,
                    });
                }
            }
        }

        if self.similarity_enabled {
            let mut best: Option<(f64, &Entry)> = None;
            for entry in entries.values() {
                let Some(entry_key) = &entry.key else { continue };
                if entry.is_expired(now)
                    || entry_key.type_tag != key.type_tag
                    || entry_key.option_fingerprint != key.option_fingerprint
                {
                    continue;
                }
                let score = similarity(&key.canonical, &entry_key.canonical);
                if score >= SIMILARITY_THRESHOLD
                    && best.map(|(s, _)| score > s).unwrap_or(true)
                {
                    best = Some((score, entry));
                }
            }
            if let Some((score, entry)) = best {
                if let Ok(value) = serde_json::from_value(entry.value.clone()) {
                    debug!(score, canonical = %key.canonical, "Similarity cache hit");
                    drop(entries);
                    self.stats.write().unwrap().similarity_hits += 1;
                    return Some(CacheHit {
                        value,
                        provenance: Provenance::SimilarityHit,
                    });
                }
            }
        }

        drop(entries);
        self.stats.write().unwrap().misses += 1;
        None
    }

    /// Exact-only lookup by raw string key (crawl cache path).
    pub fn get_raw(&self, raw_key: &str) -> Option<CacheHit<T>> {
        let now = chrono::Utc::now().timestamp();
        let entries = self.entries.read().unwrap();
        let hit = entries.get(raw_key).filter(|e| !e.is_expired(now)).and_then(|e| {
            serde_json::from_value(e.value.clone()).ok().map(|value| CacheHit {
                value,
                provenance: Provenance::DirectHit,
            })
        });
        drop(entries);

        let mut stats = self.stats.write().unwrap();
        if hit.is_some() {
            stats.hits += 1;
        } else {
            stats.misses += 1;
        }
        hit
    }

    /// Insert or overwrite under a normalized key.
    pub async fn put(&self, key: &NormalizedKey, value: &T) -> Result<(), CacheError> {
        self.insert(key.cache_key(), Some(key.clone()), value).await
    }

    /// Insert or overwrite under a raw string key.
    pub async fn put_raw(&self, raw_key: &str, value: &T) -> Result<(), CacheError> {
        self.insert(raw_key.to_string(), None, value).await
    }

    async fn insert(
        &self,
        cache_key: String,
        key: Option<NormalizedKey>,
        value: &T,
    ) -> Result<(), CacheError> {
        let now = chrono::Utc::now().timestamp();
        let json = serde_json::to_value(value).map_err(|e| {
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;

        let provenance = {
            let entries = self.entries.read().unwrap();
            match entries.get(&cache_key) {
                Some(existing) if existing.is_expired(now) => Provenance::StaleRefresh,
                _ => Provenance::Fresh,
            }
        };

        if let Some(store) = &self.store {
            store
                .save(&StoredEntry {
                    key: cache_key.clone(),
                    canonical: key.as_ref().map(|k| k.canonical.clone()),
                    type_tag: key.as_ref().and_then(|k| k.type_tag),
                    option_fingerprint: key.as_ref().map(|k| k.option_fingerprint.clone()),
                    value: json.clone(),
                    created_at_epoch_s: now,
                    ttl_s: self.ttl.as_secs(),
                    provenance,
                })
                .await?;
        }

        self.entries.write().unwrap().insert(
            cache_key,
            Entry {
                value: json,
                key,
                created_at_epoch_s: now,
                ttl_s: self.ttl.as_secs(),
            },
        );
        Ok(())
    }

    /// Remove expired entries from memory and disk. Returns the count.
    pub async fn sweep(&self) -> Result<usize, CacheError> {
        let now = chrono::Utc::now().timestamp();
        let expired: Vec<String> = {
            let entries = self.entries.read().unwrap();
            entries
                .iter()
                .filter(|(_, e)| e.is_expired(now))
                .map(|(k, _)| k.clone())
                .collect()
        };

        for key in &expired {
            if let Some(store) = &self.store {
                store.remove(key).await?;
            }
        }
        {
            let mut entries = self.entries.write().unwrap();
            for key in &expired {
                entries.remove(key);
            }
        }

        if !expired.is_empty() {
            debug!(count = expired.len(), "Swept expired cache entries");
        }
        Ok(expired.len())
    }

    /// Acquire the single-flight guard for a key. While one caller holds the
    /// guard and computes, concurrent callers for the same key wait here and
    /// then re-check the cache instead of duplicating the work.
    pub async fn flight(&self, cache_key: &str) -> tokio::sync::OwnedMutexGuard<()> {
        let slot = {
            let mut map = self.in_flight.lock().await;
            map.entry(cache_key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(())))
                .clone()
        };
        slot.lock_owned().await
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        *self.stats.read().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::AbbreviationTable;

    fn key(name: &str) -> NormalizedKey {
        NormalizedKey::new(name, None, &AbbreviationTable::empty())
    }

    #[tokio::test]
    async fn put_then_get_is_a_direct_hit() {
        let cache: SimilarityCache<String> = SimilarityCache::in_memory(Duration::from_secs(60));
        let k = key("harvard university");

        cache.put(&k, &"profile".to_string()).await.unwrap();
        let hit = cache.get(&k).unwrap();
        assert_eq!(hit.value, "profile");
        assert_eq!(hit.provenance, Provenance::DirectHit);
    }

    #[tokio::test]
    async fn expired_entries_miss_and_sweep_away() {
        let cache: SimilarityCache<u32> = SimilarityCache::in_memory(Duration::from_secs(0));
        let k = key("example");
        cache.put(&k, &7).await.unwrap();

        tokio::time::sleep(Duration::from_millis(1100)).await;
        assert!(cache.get(&k).is_none());

        let swept = cache.sweep().await.unwrap();
        assert_eq!(swept, 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn similar_key_serves_a_similarity_hit() {
        let cache: SimilarityCache<String> = SimilarityCache::in_memory(Duration::from_secs(60));
        let stored = key("the london school of economics and political science main campus");
        cache.put(&stored, &"lse".to_string()).await.unwrap();

        let probe = key("the london school of economics and political sciense main campus");
        let hit = cache.get(&probe).unwrap();
        assert_eq!(hit.value, "lse");
        assert_eq!(hit.provenance, Provenance::SimilarityHit);
    }

    #[tokio::test]
    async fn exact_only_disables_fuzzy_matching() {
        let cache: SimilarityCache<String> =
            SimilarityCache::in_memory(Duration::from_secs(60)).exact_only();
        let stored = key("the london school of economics and political science main campus");
        cache.put(&stored, &"lse".to_string()).await.unwrap();

        let probe = key("the london school of economics and political sciense main campus");
        assert!(cache.get(&probe).is_none());
    }

    #[tokio::test]
    async fn persistent_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let k = key("stanford university");
        {
            let cache: SimilarityCache<String> =
                SimilarityCache::open(dir.path(), Duration::from_secs(3600)).await.unwrap();
            cache.put(&k, &"profile".to_string()).await.unwrap();
        }

        let reopened: SimilarityCache<String> =
            SimilarityCache::open(dir.path(), Duration::from_secs(3600)).await.unwrap();
        let hit = reopened.get(&k).unwrap();
        assert_eq!(hit.value, "profile");
    }

    #[tokio::test]
    async fn stats_track_hits_and_misses() {
        let cache: SimilarityCache<u32> = SimilarityCache::in_memory(Duration::from_secs(60));
        let k = key("x university");
        cache.put(&k, &1).await.unwrap();

        cache.get(&k);
        cache.get(&key("completely different name"));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate() - 0.5).abs() < 1e-9);
    }

    #[tokio::test]
    async fn single_flight_serializes_same_key() {
        let cache: Arc<SimilarityCache<u32>> =
            Arc::new(SimilarityCache::in_memory(Duration::from_secs(60)));
        let counter = Arc::new(std::sync::atomic::AtomicU32::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let cache = cache.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let k = key("shared");
                let _guard = cache.flight(&k.cache_key()).await;
                if cache.get(&k).is_none() {
                    // Simulate the expensive upstream call.
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                    cache.put(&k, &42).await.unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Only the first caller did the work.
        assert_eq!(counter.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
