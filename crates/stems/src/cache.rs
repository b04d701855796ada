//! The stem cache service.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use deckd_core::error::CoreError;
use serde::Serialize;

use crate::error::StemCacheError;
use crate::meta::EntryMeta;
use crate::probe::UsageProbe;

/// Default number of entries kept on disk.
pub const DEFAULT_MAX_ENTRIES: usize = 10;

#[derive(Debug, Clone)]
pub struct StemCacheConfig {
    /// Directory holding one sub-directory per content hash.
    pub root: PathBuf,
    /// Entry count above which eviction runs.
    pub max_entries: usize,
}

impl Default for StemCacheConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./stem-cache"),
            max_entries: DEFAULT_MAX_ENTRIES,
        }
    }
}

/// A cache hit: where the entry lives and which assets it holds.
#[derive(Debug, Clone, Serialize)]
pub struct CachedStems {
    pub content_hash: String,
    /// Entry directory; this is the `stemsPath` handed to the peer.
    pub dir: PathBuf,
    pub format: String,
    /// Asset type -> absolute file path.
    pub files: BTreeMap<String, PathBuf>,
    pub cached_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
}

/// Occupancy snapshot returned by [`StemCache::stats`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub total_bytes: u64,
    pub protected: usize,
}

/// Bounded, use-aware cache of derived stem assets.
pub struct StemCache {
    config: StemCacheConfig,
    probe: Arc<dyn UsageProbe>,
}

impl StemCache {
    pub fn new(config: StemCacheConfig, probe: Arc<dyn UsageProbe>) -> Self {
        Self { config, probe }
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// Create the cache root if it does not exist yet.
    pub async fn init(&self) -> Result<(), StemCacheError> {
        tokio::fs::create_dir_all(&self.config.root).await?;
        tracing::info!(
            root = %self.config.root.display(),
            max_entries = self.config.max_entries,
            "Stem cache ready",
        );
        Ok(())
    }

    /// Look up `content_hash`.
    ///
    /// An entry with a missing sidecar or a missing asset file is deleted and
    /// reported as a miss. A hit refreshes `last_accessed`.
    pub async fn get(&self, content_hash: &str) -> Result<Option<CachedStems>, StemCacheError> {
        validate_key("content hash", content_hash)?;
        let dir = self.config.root.join(content_hash);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(None);
        }

        let Some(mut meta) = EntryMeta::load(&dir).await? else {
            tracing::warn!(content_hash, "Stem cache entry has no metadata, discarding");
            remove_dir(&dir).await?;
            return Ok(None);
        };

        let mut files = BTreeMap::new();
        for (asset_type, file_name) in &meta.files {
            let path = dir.join(file_name);
            if !tokio::fs::try_exists(&path).await? {
                tracing::warn!(
                    content_hash,
                    asset_type = %asset_type,
                    "Stem cache entry is missing an asset, discarding",
                );
                remove_dir(&dir).await?;
                return Ok(None);
            }
            files.insert(asset_type.clone(), path);
        }

        meta.last_accessed = Utc::now();
        meta.store(&dir).await?;

        tracing::debug!(content_hash, "Stem cache hit");
        Ok(Some(CachedStems {
            content_hash: content_hash.to_string(),
            dir,
            format: meta.format,
            files,
            cached_at: meta.cached_at,
            last_accessed: meta.last_accessed,
        }))
    }

    /// Copy `sources` (asset type -> file) into the entry for
    /// `content_hash`, replacing any previous entry, then enforce the limit.
    ///
    /// Returns `None` when the limit is exceeded and every other entry is in
    /// use: the new entry is then the only eviction candidate and is removed
    /// again.
    pub async fn set(
        &self,
        content_hash: &str,
        sources: &BTreeMap<String, PathBuf>,
        format: &str,
    ) -> Result<Option<CachedStems>, StemCacheError> {
        validate_key("content hash", content_hash)?;
        validate_key("format", format)?;
        for (asset_type, path) in sources {
            validate_key("asset type", asset_type)?;
            if !tokio::fs::try_exists(path).await? {
                return Err(StemCacheError::SourceMissing {
                    asset_type: asset_type.clone(),
                    path: path.clone(),
                });
            }
        }

        let dir = self.config.root.join(content_hash);
        if tokio::fs::try_exists(&dir).await? {
            remove_dir(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        let mut file_names = BTreeMap::new();
        let mut files = BTreeMap::new();
        for (asset_type, source) in sources {
            let file_name = format!("{asset_type}.{format}");
            let target = dir.join(&file_name);
            tokio::fs::copy(source, &target).await?;
            file_names.insert(asset_type.clone(), file_name);
            files.insert(asset_type.clone(), target);
        }

        let now = Utc::now();
        let meta = EntryMeta {
            format: format.to_string(),
            files: file_names,
            cached_at: now,
            last_accessed: now,
        };
        meta.store(&dir).await?;

        tracing::info!(content_hash, assets = files.len(), format, "Stems cached");

        self.enforce_limit().await?;
        if !tokio::fs::try_exists(&dir).await? {
            tracing::warn!(content_hash, "Stem cache entry evicted on insert, all others in use");
            return Ok(None);
        }

        Ok(Some(CachedStems {
            content_hash: content_hash.to_string(),
            dir,
            format: meta.format,
            files,
            cached_at: now,
            last_accessed: now,
        }))
    }

    /// Evict least-recently-accessed entries until the count is within the
    /// limit. Entries the probe reports in use are never evicted. Returns
    /// the number of entries removed.
    pub async fn enforce_limit(&self) -> Result<usize, StemCacheError> {
        let entries = self.entries().await?;
        let max = self.config.max_entries;
        if entries.len() <= max {
            return Ok(0);
        }

        let mut ranked: Vec<(bool, String, EntryMeta)> = entries
            .into_iter()
            .map(|(hash, meta)| (self.probe.in_use(&hash), hash, meta))
            .collect();
        // Unprotected first, oldest access first within each group.
        ranked.sort_by(|a, b| a.0.cmp(&b.0).then(a.2.last_accessed.cmp(&b.2.last_accessed)));

        let mut remaining = ranked.len();
        let mut evicted = 0;
        for (protected, hash, _) in &ranked {
            if remaining <= max || *protected {
                break;
            }
            remove_dir(&self.config.root.join(hash)).await?;
            tracing::info!(content_hash = %hash, "Evicted stem cache entry");
            remaining -= 1;
            evicted += 1;
        }

        if remaining > max {
            tracing::warn!(
                entries = remaining,
                max_entries = max,
                "Stem cache over limit, remaining entries are in use",
            );
        }
        Ok(evicted)
    }

    /// Delete one entry. Returns `false` if it did not exist.
    pub async fn remove(&self, content_hash: &str) -> Result<bool, StemCacheError> {
        validate_key("content hash", content_hash)?;
        let dir = self.config.root.join(content_hash);
        if !tokio::fs::try_exists(&dir).await? {
            return Ok(false);
        }
        remove_dir(&dir).await?;
        tracing::info!(content_hash, "Removed stem cache entry");
        Ok(true)
    }

    /// Delete every entry directory, partial ones included. Returns the
    /// number of directories removed.
    pub async fn clear(&self) -> Result<usize, StemCacheError> {
        let mut removed = 0;
        for dir in self.entry_dirs().await? {
            remove_dir(&dir).await?;
            removed += 1;
        }
        tracing::info!(removed, "Stem cache cleared");
        Ok(removed)
    }

    pub async fn stats(&self) -> Result<CacheStats, StemCacheError> {
        let entries = self.entries().await?;
        let mut stats = CacheStats {
            entries: entries.len(),
            max_entries: self.config.max_entries,
            ..Default::default()
        };
        for (hash, _) in &entries {
            stats.total_bytes += dir_size(&self.config.root.join(hash)).await?;
            if self.probe.in_use(hash) {
                stats.protected += 1;
            }
        }
        Ok(stats)
    }

    // ---- private helpers ----

    /// Every sub-directory of the root, complete or not.
    async fn entry_dirs(&self) -> Result<Vec<PathBuf>, StemCacheError> {
        let mut dirs = Vec::new();
        let mut read = match tokio::fs::read_dir(&self.config.root).await {
            Ok(read) => read,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(dirs),
            Err(e) => return Err(e.into()),
        };
        while let Some(item) = read.next_entry().await? {
            if item.file_type().await?.is_dir() {
                dirs.push(item.path());
            }
        }
        Ok(dirs)
    }

    /// Complete entries (those with a readable sidecar), keyed by hash.
    async fn entries(&self) -> Result<Vec<(String, EntryMeta)>, StemCacheError> {
        let mut entries = Vec::new();
        for dir in self.entry_dirs().await? {
            let Some(hash) = dir.file_name().and_then(|n| n.to_str()).map(str::to_string) else {
                continue;
            };
            if let Some(meta) = EntryMeta::load(&dir).await? {
                entries.push((hash, meta));
            }
        }
        Ok(entries)
    }
}

/// Keys become path components, so only a conservative alphabet is allowed.
fn validate_key(what: &str, value: &str) -> Result<(), CoreError> {
    let valid = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if valid {
        Ok(())
    } else {
        Err(CoreError::Validation(format!("invalid {what}: {value:?}")))
    }
}

async fn remove_dir(dir: &Path) -> Result<(), StemCacheError> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Total size of the regular files directly inside `dir`.
async fn dir_size(dir: &Path) -> Result<u64, StemCacheError> {
    let mut total = 0;
    let mut read = tokio::fs::read_dir(dir).await?;
    while let Some(item) = read.next_entry().await? {
        let metadata = item.metadata().await?;
        if metadata.is_file() {
            total += metadata.len();
        }
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hex_hashes() {
        assert!(validate_key("content hash", "a1b2c3d4e5f6").is_ok());
        assert!(validate_key("asset type", "drums_2-bus").is_ok());
    }

    #[test]
    fn rejects_path_escapes() {
        for bad in ["", "..", "../etc", "a/b", "a b", "x.y"] {
            assert!(validate_key("content hash", bad).is_err(), "{bad:?} accepted");
        }
    }
}
