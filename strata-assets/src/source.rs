use std::fmt::{self, Debug};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ahash::AHashSet;
use smallvec::SmallVec;
use tracing::debug;

use crate::store::FileStore;

/// Identity of a [`Source`], allocated once per source. Cache entries
/// record these ids; equality by id is what determines whether an
/// entry's contributing sources have changed, never the source name.
#[derive(Clone, Copy, Eq, Hash, PartialEq)]
pub struct SourceId(u64);

impl Debug for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

fn alloc_source_id() -> SourceId {
    static ID_COUNTER: AtomicU64 = AtomicU64::new(0);
    let id = ID_COUNTER.fetch_add(1, Ordering::SeqCst);
    assert!(id < u64::MAX, "source id overflow");
    SourceId(id)
}

/// A named, priority-ranked provider of files: a base game folder, a mod
/// overlay, an archive.
pub struct Source {
    id: SourceId,
    name: String,
    origin: Option<String>,
    store: Arc<dyn FileStore>,
}

impl Source {
    pub fn new(name: impl Into<String>, store: Arc<dyn FileStore>) -> Source {
        Source {
            id: alloc_source_id(),
            name: name.into(),
            origin: None,
            store,
        }
    }

    /// Same as [`Source::new`] with an origin tag, e.g. a mod identity.
    pub fn with_origin(
        name: impl Into<String>,
        origin: impl Into<String>,
        store: Arc<dyn FileStore>,
    ) -> Source {
        Source {
            origin: Some(origin.into()),
            ..Source::new(name, store)
        }
    }

    pub fn id(&self) -> SourceId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn origin(&self) -> Option<&str> {
        self.origin.as_deref()
    }

    pub fn store(&self) -> &dyn FileStore {
        &*self.store
    }
}

impl Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Source")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

pub(crate) type SourceList = SmallVec<[Arc<Source>; 1]>;

/// Ordered list of sources. Order of addition is priority order: later
/// sources override earlier ones for basic assets and merge on top of
/// them for compound assets.
#[derive(Debug, Default)]
pub(crate) struct SourceChain {
    sources: Vec<Arc<Source>>,
}

impl SourceChain {
    pub fn new() -> SourceChain {
        SourceChain::default()
    }

    pub fn add(&mut self, source: &Arc<Source>) {
        if self.sources.iter().any(|s| s.id == source.id) {
            debug!(name = source.name(), "source already in chain");
            return;
        }

        debug!(name = source.name(), origin = ?source.origin(), "source added");
        self.sources.push(source.clone());
    }

    pub fn remove(&mut self, id: SourceId) {
        match self.sources.iter().position(|s| s.id == id) {
            Some(idx) => {
                let source = self.sources.remove(idx);
                debug!(name = source.name(), "source removed");
            }
            None => debug!(?id, "source not in chain"),
        }
    }

    pub fn get(&self, id: SourceId) -> Option<&Arc<Source>> {
        self.sources.iter().find(|s| s.id == id)
    }

    pub fn sources(&self) -> &[Arc<Source>] {
        &self.sources
    }

    /// Highest-priority source that has the path, for basic assets.
    pub fn calculate_basic_source(&self, path: &str) -> Option<&Arc<Source>> {
        self.sources.iter().rev().find(|s| s.store.exists(path))
    }

    /// Every source that has the path, lowest priority first. The order
    /// doubles as merge-layer order for compound assets.
    pub fn calculate_compound_sources(&self, path: &str) -> SourceList {
        self.sources
            .iter()
            .filter(|s| s.store.exists(path))
            .cloned()
            .collect()
    }

    /// Every path visible from any source, walked highest priority first
    /// and deduplicated by first occurrence. Bulk load sweeps iterate
    /// this list.
    pub fn enumerate_all(&self) -> Vec<Arc<str>> {
        let mut seen = AHashSet::new();
        let mut paths = Vec::new();

        for source in self.sources.iter().rev() {
            for path in source.store.enumerate() {
                if seen.insert(path.clone()) {
                    paths.push(path);
                }
            }
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn source_with(name: &str, paths: &[&str]) -> Arc<Source> {
        let store = Arc::new(MemoryStore::new());
        for path in paths {
            store.insert(*path, b"x".to_vec());
        }
        Arc::new(Source::new(name, store))
    }

    #[test]
    fn test_basic_priority() {
        let a = source_with("a", &["f.txt"]);
        let b = source_with("b", &["f.txt"]);

        let mut chain = SourceChain::new();
        chain.add(&a);
        chain.add(&b);

        let resolved = chain.calculate_basic_source("f.txt").unwrap();
        assert_eq!(resolved.id(), b.id());
    }

    #[test]
    fn test_compound_order() {
        let a = source_with("a", &["f.json"]);
        let b = source_with("b", &["f.json"]);

        let mut chain = SourceChain::new();
        chain.add(&a);
        chain.add(&b);

        let sources = chain.calculate_compound_sources("f.json");
        let ids: Vec<_> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec![a.id(), b.id()]);
    }

    #[test]
    fn test_add_remove_idempotent() {
        let a = source_with("a", &[]);

        let mut chain = SourceChain::new();
        chain.add(&a);
        chain.add(&a);
        assert_eq!(chain.sources().len(), 1);

        chain.remove(a.id());
        chain.remove(a.id());
        assert!(chain.sources().is_empty());
    }

    #[test]
    fn test_enumerate_dedup() {
        let a = source_with("a", &["f.txt", "only_a.txt"]);
        let b = source_with("b", &["f.txt"]);

        let mut chain = SourceChain::new();
        chain.add(&a);
        chain.add(&b);

        let paths = chain.enumerate_all();
        assert_eq!(paths.len(), 2);
    }
}
