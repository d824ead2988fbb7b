use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, Utc};
use nanoid::nanoid;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::CacheConfig;
use crate::models::ChunkResult;

const ENTRY_EXTENSION: &str = "json";

#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    timestamp: DateTime<Utc>,
    data: ChunkResult,
}

/// Content-addressed store of chunk results, one JSON file per key.
///
/// Keys are the hex SHA-256 of a chunk's bytes, so concurrent writers of the same
/// key always write equivalent values and no locking is needed. Every failure is
/// logged and treated as a miss.
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    ttl: Duration,
}

impl ResultCache {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        let hours = i64::try_from(config.ttl_hours).unwrap_or(i64::MAX);
        Self::new(
            config.dir.clone(),
            Duration::try_hours(hours).unwrap_or(Duration::MAX),
        )
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.{ENTRY_EXTENSION}"))
    }

    fn is_expired(&self, timestamp: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        timestamp
            .checked_add_signed(self.ttl)
            .is_some_and(|expiry| expiry < now)
    }

    pub async fn get(&self, key: &str) -> Option<ChunkResult> {
        self.get_at(key, Utc::now()).await
    }

    /// Look up `key` as of `now`. An expired entry is deleted and reported absent.
    pub async fn get_at(&self, key: &str, now: DateTime<Utc>) -> Option<ChunkResult> {
        let path = self.entry_path(key);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(key, error = %e, "Failed to read cache entry");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(key, error = %e, "Corrupt cache entry, ignoring");
                return None;
            }
        };

        if self.is_expired(entry.timestamp, now) {
            debug!(key, "Cache entry expired");
            self.invalidate(key).await;
            return None;
        }

        debug!(key, "Cache hit");
        Some(entry.data)
    }

    pub async fn set(&self, key: &str, value: &ChunkResult) {
        self.set_at(key, value, Utc::now()).await
    }

    /// Store `value` under `key`, stamped with `now`. The entry is written to a
    /// temporary file in the cache directory and renamed into place.
    pub async fn set_at(&self, key: &str, value: &ChunkResult, now: DateTime<Utc>) {
        if let Err(e) = tokio::fs::create_dir_all(&self.dir).await {
            warn!(dir = %self.dir.display(), error = %e, "Failed to create cache directory");
            return;
        }

        let entry = CacheEntry {
            timestamp: now,
            data: value.clone(),
        };
        let body = match serde_json::to_vec(&entry) {
            Ok(body) => body,
            Err(e) => {
                warn!(key, error = %e, "Failed to serialize cache entry");
                return;
            }
        };

        let staging = self.dir.join(format!(".{key}.{}.tmp", nanoid!(8)));
        if let Err(e) = tokio::fs::write(&staging, &body).await {
            warn!(key, error = %e, "Failed to write cache entry");
            let _ = tokio::fs::remove_file(&staging).await;
            return;
        }
        if let Err(e) = tokio::fs::rename(&staging, self.entry_path(key)).await {
            warn!(key, error = %e, "Failed to publish cache entry");
            let _ = tokio::fs::remove_file(&staging).await;
            return;
        }

        debug!(key, "Cache entry stored");
    }

    pub async fn invalidate(&self, key: &str) {
        match tokio::fs::remove_file(self.entry_path(key)).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => warn!(key, error = %e, "Failed to remove cache entry"),
        }
    }

    pub async fn sweep(&self) -> usize {
        self.sweep_at(Utc::now()).await
    }

    /// Remove every entry older than the TTL as of `now`. Files that are not cache
    /// entries are left alone; unreadable entries are skipped. Returns the number
    /// of entries removed.
    pub async fn sweep_at(&self, now: DateTime<Utc>) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Failed to list cache directory");
                return 0;
            }
        };

        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!(error = %e, "Failed to read cache directory entry");
                    break;
                }
            };

            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some(ENTRY_EXTENSION) {
                continue;
            }

            let timestamp = match tokio::fs::read(&path).await {
                Ok(raw) => match serde_json::from_slice::<CacheEntry>(&raw) {
                    Ok(cached) => cached.timestamp,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                        continue;
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable cache entry");
                    continue;
                }
            };

            if self.is_expired(timestamp, now) {
                match tokio::fs::remove_file(&path).await {
                    Ok(()) => removed += 1,
                    Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove expired entry"),
                }
            }
        }

        info!(removed, dir = %self.dir.display(), "Cache sweep complete");
        removed
    }
}
