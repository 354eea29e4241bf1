//! File-backed cache entry storage.
//!
//! One JSON file per entry, named by the first 16 hex characters of the
//! SHA-256 of the entry key. Files that exist but cannot be decoded are
//! quarantined by renaming with a `.bad` suffix and treated as misses, so a
//! single corrupt file never poisons the cache.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::CacheError;
use crate::types::schema::InstitutionType;

/// How a cache value was produced or served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Served from an exact key match.
    DirectHit,
    /// Served from a fuzzy canonical-key match.
    SimilarityHit,
    /// Stored from a fresh upstream call.
    Fresh,
    /// Stored from a fresh call that replaced an expired entry.
    StaleRefresh,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectHit => "direct_hit",
            Self::SimilarityHit => "similarity_hit",
            Self::Fresh => "fresh",
            Self::StaleRefresh => "stale_refresh",
        }
    }
}

/// The on-disk shape of one cache entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredEntry {
    pub key: String,
    /// Canonical institution name, present for similarity-eligible entries.
    #[serde(default)]
    pub canonical: Option<String>,
    #[serde(default)]
    pub type_tag: Option<InstitutionType>,
    #[serde(default)]
    pub option_fingerprint: Option<String>,
    pub value: serde_json::Value,
    pub created_at_epoch_s: i64,
    pub ttl_s: u64,
    pub provenance: Provenance,
}

impl StoredEntry {
    pub fn is_expired(&self, now_epoch_s: i64) -> bool {
        now_epoch_s > self.created_at_epoch_s + self.ttl_s as i64
    }
}

/// Hash a cache key into its file stem.
pub fn file_stem(key: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

/// Directory of cache entry files.
#[derive(Debug, Clone)]
pub struct EntryStore {
    dir: PathBuf,
}

impl EntryStore {
    /// Open (creating if needed) a store under `dir`.
    pub async fn open(dir: impl AsRef<Path>) -> Result<Self, CacheError> {
        let dir = dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&dir).await?;
        Ok(Self { dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", file_stem(key)))
    }

    /// Load one entry. A corrupt file is quarantined and reported as absent.
    pub async fn load(&self, key: &str) -> Result<Option<StoredEntry>, CacheError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        match serde_json::from_slice::<StoredEntry>(&bytes) {
            Ok(entry) => Ok(Some(entry)),
            Err(_) => {
                self.quarantine(&path).await;
                Err(CacheError::Corrupt {
                    path: path.display().to_string(),
                })
            }
        }
    }

    /// Persist one entry, replacing any previous file for the key.
    pub async fn save(&self, entry: &StoredEntry) -> Result<(), CacheError> {
        let path = self.path_for(&entry.key);
        let json = serde_json::to_vec_pretty(entry).map_err(|e| {
            CacheError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        tokio::fs::write(&path, json).await?;
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), CacheError> {
        let path = self.path_for(key);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Load every readable entry; corrupt files are quarantined and skipped.
    pub async fn load_all(&self) -> Result<Vec<StoredEntry>, CacheError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(&self.dir).await?;
        while let Some(item) = dir.next_entry().await? {
            let path = item.path();
            if path.extension().map(|e| e != "json").unwrap_or(true) {
                continue;
            }
            let bytes = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable cache file");
                    continue;
                }
            };
            match serde_json::from_slice::<StoredEntry>(&bytes) {
                Ok(entry) => entries.push(entry),
                Err(_) => self.quarantine(&path).await,
            }
        }
        debug!(dir = %self.dir.display(), count = entries.len(), "Loaded cache entries");
        Ok(entries)
    }

    async fn quarantine(&self, path: &Path) {
        let bad = path.with_extension("json.bad");
        warn!(path = %path.display(), "Quarantining corrupt cache file");
        if let Err(e) = tokio::fs::rename(path, &bad).await {
            warn!(path = %path.display(), error = %e, "Failed to quarantine cache file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, value: serde_json::Value) -> StoredEntry {
        StoredEntry {
            key: key.to_string(),
            canonical: None,
            type_tag: None,
            option_fingerprint: None,
            value,
            created_at_epoch_s: chrono::Utc::now().timestamp(),
            ttl_s: 3600,
            provenance: Provenance::Fresh,
        }
    }

    #[tokio::test]
    async fn round_trips_an_entry() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::open(dir.path()).await.unwrap();

        store
            .save(&entry("some key", serde_json::json!({"links": 3})))
            .await
            .unwrap();

        let loaded = store.load("some key").await.unwrap().unwrap();
        assert_eq!(loaded.value["links"], 3);
        assert!(store.load("other key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn quarantines_corrupt_files() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::open(dir.path()).await.unwrap();

        let path = dir.path().join(format!("{}.json", file_stem("broken")));
        tokio::fs::write(&path, b"{not json").await.unwrap();

        let result = store.load("broken").await;
        assert!(matches!(result, Err(CacheError::Corrupt { .. })));
        assert!(!path.exists());
        assert!(path.with_extension("json.bad").exists());

        // Subsequent loads see a plain miss.
        assert!(store.load("broken").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn load_all_skips_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        let store = EntryStore::open(dir.path()).await.unwrap();

        store.save(&entry("a", serde_json::json!(1))).await.unwrap();
        store.save(&entry("b", serde_json::json!(2))).await.unwrap();
        tokio::fs::write(dir.path().join("junk.json"), b"%%%").await.unwrap();

        let all = store.load_all().await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[test]
    fn expiry_uses_created_plus_ttl() {
        let mut e = entry("k", serde_json::json!(null));
        e.created_at_epoch_s = 1000;
        e.ttl_s = 60;
        assert!(!e.is_expired(1060));
        assert!(e.is_expired(1061));
    }
}
