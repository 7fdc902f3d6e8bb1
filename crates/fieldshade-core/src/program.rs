//! Deduplication of compiled programs by capability.
//!
//! Two surfaces whose attachments compose to the same [`Capabilities`]
//! synthesize byte-identical source
//! (see [`synthesize`][crate::shader::synthesize]),
//! so they can share one compiled program object.
//! The cache owns its entries behind [`Arc`];
//! an entry lives as long as the cache or any handed-out reference,
//! whichever is longer.
//!
//! Lookups are pure functions of the capability key.
//! Entries are never mutated in place: when a surface's capabilities
//! change, it looks up a different entry, it does not edit the old one.
//! Concurrent population requires external mutual exclusion,
//! which the calling environment provides.

use std::collections::HashMap;
use std::sync::Arc;

use crate::capability::Capabilities;

/// A cache of compiled programs keyed by capability.
///
/// `H` is the opaque compiled-program handle the graphics layer returns;
/// this core never looks inside it.
pub struct ProgramCache<H> {
    entries: HashMap<u64, Arc<H>>,
}

impl<H> Default for ProgramCache<H> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H> ProgramCache<H> {
    /// Create an empty cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Number of distinct programs in the cache.
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no programs.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Get the cached program for a capability set, if one exists.
    pub fn get(&self, caps: &Capabilities) -> Option<Arc<H>> {
        self.entries.get(&caps.key()).cloned()
    }

    /// Get the program for a capability set,
    /// building and caching it on first use.
    ///
    /// A build failure is propagated and nothing is inserted,
    /// so a later call retries the build.
    pub fn get_or_insert_with<E>(
        &mut self,
        caps: &Capabilities,
        build: impl FnOnce() -> Result<H, E>,
    ) -> Result<Arc<H>, E> {
        let key = caps.key();
        if let Some(entry) = self.entries.get(&key) {
            return Ok(entry.clone());
        }
        log::debug!("program cache miss for capability key {key:#x}");
        let entry = Arc::new(build()?);
        self.entries.insert(key, entry.clone());
        Ok(entry)
    }

    /// The capability keys currently cached, in ascending order.
    pub fn keys(&self) -> Vec<u64> {
        let mut keys: Vec<u64> = self.entries.keys().copied().collect();
        keys.sort_unstable();
        keys
    }

    /// Drop every cached program.
    ///
    /// Programs still referenced elsewhere stay alive
    /// until those references are dropped.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

//
// tests
//

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::{LightingModel, PeelLayer};

    fn per_pixel() -> Capabilities {
        Capabilities {
            lighting: LightingModel::PerPixel,
            ..Capabilities::plain()
        }
    }

    #[test]
    fn identical_capabilities_share_one_program() {
        let mut cache: ProgramCache<String> = ProgramCache::new();
        let caps = Capabilities::plain();
        let a = cache
            .get_or_insert_with(&caps, || Ok::<_, ()>("program".to_string()))
            .unwrap();
        let b = cache
            .get_or_insert_with(&caps, || -> Result<String, ()> {
                panic!("must not rebuild")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn distinct_capabilities_get_distinct_entries() {
        let mut cache: ProgramCache<u32> = ProgramCache::new();
        cache
            .get_or_insert_with(&Capabilities::plain(), || Ok::<_, ()>(1))
            .unwrap();
        cache
            .get_or_insert_with(&per_pixel(), || Ok::<_, ()>(2))
            .unwrap();
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.keys().len(), 2);
    }

    #[test]
    fn build_failure_leaves_the_cache_unchanged() {
        let mut cache: ProgramCache<u32> = ProgramCache::new();
        let result = cache.get_or_insert_with(&Capabilities::plain(), || Err("compile error"));
        assert_eq!(result.unwrap_err(), "compile error");
        assert!(cache.is_empty());
        // the next attempt runs the builder again
        cache
            .get_or_insert_with(&Capabilities::plain(), || Ok::<_, &str>(7))
            .unwrap();
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn entries_outlive_a_clear_while_referenced() {
        let mut cache: ProgramCache<String> = ProgramCache::new();
        let caps = Capabilities {
            peel: Some(PeelLayer::First),
            ..Capabilities::plain()
        };
        let held = cache
            .get_or_insert_with(&caps, || Ok::<_, ()>("held".to_string()))
            .unwrap();
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(*held, "held");
    }
}
