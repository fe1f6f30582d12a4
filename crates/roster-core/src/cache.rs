//! Agent directory cache
//!
//! An ordered in-memory roster. Readers are cheap clones; exactly one
//! `CacheWriter` exists per cache and it belongs to the sync engine, so
//! no other component can write agent fields directly.

use crate::agent::Agent;
use crate::text::same_id;
use parking_lot::RwLock;
use std::sync::Arc;

type Shared = Arc<RwLock<Arc<Vec<Agent>>>>;

/// Read handle
#[derive(Debug, Clone)]
pub struct AgentDirectoryCache {
    inner: Shared,
}

/// The single write capability
#[derive(Debug)]
pub struct CacheWriter {
    inner: Shared,
}

impl AgentDirectoryCache {
    /// Create an empty cache and its writer
    #[must_use]
    pub fn new() -> (Self, CacheWriter) {
        Self::seeded(Vec::new())
    }

    /// Create a cache pre-filled with `agents`
    #[must_use]
    pub fn seeded(agents: Vec<Agent>) -> (Self, CacheWriter) {
        let inner: Shared = Arc::new(RwLock::new(Arc::new(agents)));
        (
            Self {
                inner: Arc::clone(&inner),
            },
            CacheWriter { inner },
        )
    }

    /// Current roster (shared, immutable)
    #[inline]
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Agent>> {
        Arc::clone(&self.inner.read())
    }

    /// Number of agents
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    /// Empty roster
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.read().is_empty()
    }

    /// Case-insensitive exact id lookup
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Agent> {
        self.find(|a| same_id(&a.id, id))
    }

    /// First agent matching `predicate`, in roster order
    #[must_use]
    pub fn find<P>(&self, predicate: P) -> Option<Agent>
    where
        P: Fn(&Agent) -> bool,
    {
        self.inner.read().iter().find(|a| predicate(a)).cloned()
    }
}

impl CacheWriter {
    /// Swap in a new roster
    pub fn replace(&self, agents: Vec<Agent>) {
        *self.inner.write() = Arc::new(agents);
    }

    /// A read handle onto the same cache
    #[inline]
    #[must_use]
    pub fn reader(&self) -> AgentDirectoryCache {
        AgentDirectoryCache {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writer_updates_are_visible_to_readers() {
        let (cache, writer) = AgentDirectoryCache::new();
        assert!(cache.is_empty());

        writer.replace(vec![Agent::new("V-1", "Ana"), Agent::new("V-2", "Luis")]);
        assert_eq!(cache.len(), 2);
        assert_eq!(writer.reader().len(), 2);
        assert_eq!(cache.get("v-2").unwrap().name, "Luis");
    }

    #[test]
    fn snapshots_are_stable_across_replace() {
        let (cache, writer) = AgentDirectoryCache::seeded(vec![Agent::new("V-1", "Ana")]);
        let before = cache.snapshot();
        writer.replace(Vec::new());
        assert_eq!(before.len(), 1);
        assert!(cache.is_empty());
    }
}
