use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use deckd_stems::{NeverInUse, StemCache, StemCacheConfig, StemCacheError, UsageProbe};
use tempfile::TempDir;

const ASSETS: [&str; 4] = ["vocals", "drums", "bass", "other"];

/// Write one small file per asset type and return the source map.
fn sources(dir: &Path) -> BTreeMap<String, PathBuf> {
    ASSETS
        .iter()
        .map(|asset| {
            let path = dir.join(format!("{asset}-src.wav"));
            std::fs::write(&path, asset.as_bytes()).unwrap();
            (asset.to_string(), path)
        })
        .collect()
}

fn cache(root: &Path, max_entries: usize, probe: Arc<dyn UsageProbe>) -> StemCache {
    StemCache::new(
        StemCacheConfig {
            root: root.to_path_buf(),
            max_entries,
        },
        probe,
    )
}

fn hash(n: usize) -> String {
    format!("h{n:02}")
}

#[tokio::test]
async fn set_then_get_round_trip() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    cache.init().await.unwrap();

    let stored = cache
        .set("abc123", &sources(src.path()), "wav")
        .await
        .unwrap()
        .expect("entry kept");
    assert_eq!(stored.dir, tmp.path().join("abc123"));
    assert!(stored.dir.join("vocals.wav").exists());
    assert!(stored.dir.join("meta.json").exists());

    let hit = cache.get("abc123").await.unwrap().expect("cache hit");
    assert_eq!(hit.format, "wav");
    assert_eq!(hit.files.len(), 4);
    assert_eq!(std::fs::read(&hit.files["drums"]).unwrap(), b"drums");
    assert!(hit.last_accessed >= stored.last_accessed);
}

#[tokio::test]
async fn get_unknown_hash_is_miss() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));

    assert!(cache.get("nothing").await.unwrap().is_none());
}

#[tokio::test]
async fn missing_asset_heals_entry() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    cache.set("abc123", &sources(src.path()), "wav").await.unwrap();

    std::fs::remove_file(tmp.path().join("abc123").join("bass.wav")).unwrap();

    assert!(cache.get("abc123").await.unwrap().is_none());
    assert!(!tmp.path().join("abc123").exists());
}

#[tokio::test]
async fn directory_without_metadata_is_discarded() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    let partial = tmp.path().join("partial");
    std::fs::create_dir_all(&partial).unwrap();
    std::fs::write(partial.join("vocals.wav"), b"x").unwrap();

    assert_eq!(cache.stats().await.unwrap().entries, 0);
    assert!(cache.get("partial").await.unwrap().is_none());
    assert!(!partial.exists());
}

#[tokio::test]
async fn rejects_hash_outside_root() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));

    let err = cache.get("../escape").await.unwrap_err();
    assert!(matches!(err, StemCacheError::Invalid(_)));

    let err = cache.set("a/b", &sources(src.path()), "wav").await.unwrap_err();
    assert!(matches!(err, StemCacheError::Invalid(_)));
}

#[tokio::test]
async fn set_with_missing_source_fails() {
    let tmp = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    let missing = BTreeMap::from([("vocals".to_string(), tmp.path().join("nope.wav"))]);

    let err = cache.set("abc", &missing, "wav").await.unwrap_err();
    assert!(matches!(err, StemCacheError::SourceMissing { .. }));
    assert!(!tmp.path().join("abc").exists());
}

#[tokio::test]
async fn eleventh_entry_evicts_least_recently_accessed() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    let assets = sources(src.path());

    for n in 1..=10 {
        cache.set(&hash(n), &assets, "wav").await.unwrap();
    }
    assert_eq!(cache.stats().await.unwrap().entries, 10);

    cache.set(&hash(11), &assets, "wav").await.unwrap();

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 10);
    assert!(!tmp.path().join(hash(1)).exists());
    assert!(cache.get(&hash(1)).await.unwrap().is_none());
    assert!(cache.get(&hash(11)).await.unwrap().is_some());
}

#[tokio::test]
async fn access_refreshes_recency() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 3, Arc::new(NeverInUse));
    let assets = sources(src.path());

    for n in 1..=3 {
        cache.set(&hash(n), &assets, "wav").await.unwrap();
    }
    cache.get(&hash(1)).await.unwrap().unwrap();
    cache.set(&hash(4), &assets, "wav").await.unwrap();

    assert!(tmp.path().join(hash(1)).exists());
    assert!(!tmp.path().join(hash(2)).exists());
}

#[tokio::test]
async fn protected_entry_is_skipped() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let active: Arc<Mutex<HashSet<String>>> = Arc::new(Mutex::new(HashSet::new()));
    let probe_set = Arc::clone(&active);
    let probe: Arc<dyn UsageProbe> =
        Arc::new(move |h: &str| probe_set.lock().unwrap().contains(h));
    let cache = cache(tmp.path(), 10, probe);
    let assets = sources(src.path());

    for n in 1..=10 {
        cache.set(&hash(n), &assets, "wav").await.unwrap();
    }
    active.lock().unwrap().insert(hash(1));

    cache.set(&hash(11), &assets, "wav").await.unwrap();

    assert!(tmp.path().join(hash(1)).exists());
    assert!(!tmp.path().join(hash(2)).exists());
    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 10);
    assert_eq!(stats.protected, 1);
}

#[tokio::test]
async fn all_protected_stays_over_limit() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 2, Arc::new(|_: &str| true));
    let assets = sources(src.path());

    for n in 1..=3 {
        cache.set(&hash(n), &assets, "wav").await.unwrap();
    }

    assert_eq!(cache.enforce_limit().await.unwrap(), 0);
    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 3);
    assert_eq!(stats.protected, 3);
}

#[tokio::test]
async fn new_entry_evicted_when_all_others_in_use() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let probe: Arc<dyn UsageProbe> = Arc::new(|h: &str| h != "h03");
    let cache = cache(tmp.path(), 2, probe);
    let assets = sources(src.path());

    assert!(cache.set(&hash(1), &assets, "wav").await.unwrap().is_some());
    assert!(cache.set(&hash(2), &assets, "wav").await.unwrap().is_some());
    assert!(cache.set(&hash(3), &assets, "wav").await.unwrap().is_none());

    assert!(!tmp.path().join(hash(3)).exists());
    assert_eq!(cache.stats().await.unwrap().entries, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_hits_keep_entry_intact() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = Arc::new(cache(tmp.path(), 10, Arc::new(NeverInUse)));
    cache.set("hot", &sources(src.path()), "wav").await.unwrap();

    for _ in 0..25 {
        let lookups: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                tokio::spawn(async move { cache.get("hot").await })
            })
            .collect();
        for lookup in lookups {
            let hit = lookup.await.unwrap().unwrap();
            assert!(hit.is_some(), "complete entry reported as a miss");
        }
    }

    assert!(tmp.path().join("hot").join("meta.json").exists());
    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 1);
}

#[tokio::test]
async fn remove_clear_and_stats() {
    let tmp = TempDir::new().unwrap();
    let src = TempDir::new().unwrap();
    let cache = cache(tmp.path(), 10, Arc::new(NeverInUse));
    let assets = sources(src.path());
    cache.set("one", &assets, "wav").await.unwrap();
    cache.set("two", &assets, "wav").await.unwrap();

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 2);
    assert_eq!(stats.max_entries, 10);
    assert!(stats.total_bytes > 0);
    assert_eq!(stats.protected, 0);

    assert!(cache.remove("one").await.unwrap());
    assert!(!cache.remove("one").await.unwrap());

    std::fs::create_dir_all(tmp.path().join("partial")).unwrap();
    assert_eq!(cache.clear().await.unwrap(), 2);
    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 0);
    assert_eq!(stats.total_bytes, 0);
}
