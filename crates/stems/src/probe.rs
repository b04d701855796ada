//! "Is this entry in active use" predicate.
//!
//! The cache never learns what uses an entry. Whoever owns the playback
//! slots supplies a probe at construction, and the cache asks it once per
//! entry during eviction.

/// Reports whether the entry for a content hash is bound to an active
/// playback slot.
pub trait UsageProbe: Send + Sync {
    fn in_use(&self, content_hash: &str) -> bool;
}

impl<F> UsageProbe for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn in_use(&self, content_hash: &str) -> bool {
        self(content_hash)
    }
}

/// Probe for deployments without a playback engine: nothing is protected.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeverInUse;

impl UsageProbe for NeverInUse {
    fn in_use(&self, _content_hash: &str) -> bool {
        false
    }
}
