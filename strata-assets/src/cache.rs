use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;
use smallvec::SmallVec;

use crate::format::AnyAsset;
use crate::source::SourceId;
use crate::Asset;

pub(crate) type SourceIdList = SmallVec<[SourceId; 1]>;

/// A live cached asset. The instance is boxed once at construction and
/// only ever mutated in place on reload, so borrows observed through the
/// query layer keep pointing at the same object across reloads.
pub(crate) struct Entry {
    pub path: Arc<str>,
    pub asset_type: TypeId,
    pub type_name: &'static str,
    pub instance: Box<dyn AnyAsset>,
    pub sources: SourceIdList,
    pub is_fallback: bool,
}

impl Entry {
    pub fn instance_ref<A: Asset>(&self) -> Option<&A> {
        self.instance.as_any().downcast_ref()
    }

    pub fn is_type<A: Asset>(&self) -> bool {
        self.asset_type == TypeId::of::<A>()
    }
}

#[derive(Default)]
pub(crate) struct AssetCache {
    entries: AHashMap<Arc<str>, Entry>,
}

impl AssetCache {
    pub fn new() -> AssetCache {
        AssetCache::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&Entry> {
        self.entries.get(path)
    }

    pub fn get_mut(&mut self, path: &str) -> Option<&mut Entry> {
        self.entries.get_mut(path)
    }

    pub fn insert(&mut self, entry: Entry) {
        self.entries.insert(entry.path.clone(), entry);
    }

    pub fn remove(&mut self, path: &str) -> Option<Entry> {
        self.entries.remove(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.entries.values()
    }

    pub fn paths(&self) -> Vec<Arc<str>> {
        self.entries.keys().cloned().collect()
    }
}
