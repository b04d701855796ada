//! The `meta.json` sidecar stored in every entry directory.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StemCacheError;

/// Sidecar file name inside an entry directory.
pub const META_FILE: &str = "meta.json";

/// Suffix of in-flight sidecar writes.
const TMP_SUFFIX: &str = ".tmp";

static TMP_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persisted description of one cache entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMeta {
    /// Audio container/codec of every asset, e.g. `wav`.
    pub format: String,
    /// Asset type -> file name relative to the entry directory.
    pub files: BTreeMap<String, String>,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

impl EntryMeta {
    /// Read the sidecar from `dir`. `Ok(None)` when it is missing or
    /// unreadable, which marks the entry as partial.
    pub async fn load(dir: &Path) -> Result<Option<Self>, StemCacheError> {
        let bytes = match tokio::fs::read(dir.join(META_FILE)).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_slice(&bytes) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                tracing::warn!(dir = %dir.display(), error = %e, "Unreadable stem cache metadata");
                Ok(None)
            }
        }
    }

    /// Replace the sidecar in `dir` atomically. Readers see either the old
    /// or the new record, never a truncated file.
    pub async fn store(&self, dir: &Path) -> Result<(), StemCacheError> {
        let bytes = serde_json::to_vec_pretty(self)?;
        let seq = TMP_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = dir.join(format!("{META_FILE}.{}.{seq}{TMP_SUFFIX}", std::process::id()));
        tokio::fs::write(&tmp, bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, dir.join(META_FILE)).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sidecar_uses_camel_case() {
        let now = Utc::now();
        let meta = EntryMeta {
            format: "wav".into(),
            files: BTreeMap::from([("vocals".to_string(), "vocals.wav".to_string())]),
            cached_at: now,
            last_accessed: now,
        };
        let value = serde_json::to_value(&meta).unwrap();
        assert_eq!(value["format"], "wav");
        assert_eq!(value["files"]["vocals"], "vocals.wav");
        assert!(value.get("cachedAt").is_some());
        assert!(value.get("lastAccessed").is_some());
    }

    #[tokio::test]
    async fn store_replaces_without_leftovers() {
        let tmp = tempfile::TempDir::new().unwrap();
        let now = Utc::now();
        let mut meta = EntryMeta {
            format: "wav".into(),
            files: BTreeMap::new(),
            cached_at: now,
            last_accessed: now,
        };
        meta.store(tmp.path()).await.unwrap();
        meta.last_accessed = now + chrono::Duration::seconds(5);
        meta.store(tmp.path()).await.unwrap();

        assert_eq!(EntryMeta::load(tmp.path()).await.unwrap(), Some(meta));
        let names: Vec<_> = std::fs::read_dir(tmp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, vec![META_FILE.to_string()]);
    }
}
