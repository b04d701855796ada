//! Bounded on-disk cache of separated stems, keyed by audio content hash.
//!
//! Each entry is a directory under the cache root holding one file per asset
//! type plus a `meta.json` sidecar. Eviction is least-recently-accessed, but
//! entries reported in use by a [`UsageProbe`] are never evicted.

pub mod cache;
pub mod error;
pub mod meta;
pub mod probe;

pub use cache::{CacheStats, CachedStems, StemCache, StemCacheConfig};
pub use error::StemCacheError;
pub use meta::EntryMeta;
pub use probe::{NeverInUse, UsageProbe};
