//! Time-bounded persistence for extracted records and marketplace lookups.
//!
//! Entries are JSON documents under a two-level hash-prefixed directory
//! layout, keyed by a stable identifier (marketplace ID or URL hash).
//! The reader applies the TTL: stale entries read as misses and stay on
//! disk, they are never eagerly deleted.

use std::marker::PhantomData;
use std::path::PathBuf;

use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::selectors::write_json_atomic;

/// A cached payload with its write timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry<T> {
    pub payload: T,
    pub written_at: DateTime<Utc>,
}

impl<T> CacheEntry<T> {
    /// Valid while `now - written_at < ttl`.
    pub fn is_fresh(&self, ttl: Duration) -> bool {
        Utc::now() - self.written_at < ttl
    }
}

/// Directory-backed JSON store for one payload type.
pub struct Store<T> {
    dir: PathBuf,
    _payload: PhantomData<T>,
}

impl<T: Serialize + DeserializeOwned> Store<T> {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            _payload: PhantomData,
        }
    }

    /// Storage path for a key: `{dir}/{hash[0..2]}/{hash[0..16]}.json`.
    fn entry_path(&self, key: &str) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let hash = hex::encode(hasher.finalize());
        self.dir.join(&hash[..2]).join(format!("{}.json", &hash[..16]))
    }

    /// Read an entry, applying the TTL. Stale or unreadable entries are
    /// misses.
    pub fn get(&self, key: &str, ttl: Duration) -> Option<T> {
        let path = self.entry_path(key);
        let raw = std::fs::read_to_string(&path).ok()?;
        let entry: CacheEntry<T> = match serde_json::from_str(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        if !entry.is_fresh(ttl) {
            debug!("Cache entry for {} is stale", key);
            return None;
        }
        Some(entry.payload)
    }

    /// Write an entry atomically (write-temp-then-rename).
    pub fn put(&self, key: &str, payload: &T) -> anyhow::Result<()> {
        let path = self.entry_path(key);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let entry = CacheEntry {
            payload,
            written_at: Utc::now(),
        };
        write_json_atomic(&path, &entry)
    }
}
