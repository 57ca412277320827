use std::any::TypeId;
use std::fmt::{self, Debug};
use std::io::Read;
use std::sync::Arc;
use std::time::{Duration, Instant};

use smallvec::smallvec;
use tracing::{debug, error, trace};

use crate::cache::{AssetCache, Entry, SourceIdList};
use crate::error::QueryError;
use crate::events::{ChangeKind, ChangeNotifier, ChangeReceiver};
use crate::format::{
    AnyData, BasicFormat, CompoundFormat, DynBasicFormat, DynCompoundFormat, FormatOps,
};
use crate::path;
use crate::registry::{TypeRef, TypeRegistry};
use crate::source::{Source, SourceChain, SourceId, SourceList};
use crate::task::{decode_sources, spawn_workers, DecodeResult, PendingLoad, PendingQueue, Workers};
use crate::ticket::{BatchTicket, LoadOutcome, LoadTicket};
use crate::Asset;

/// One asset world: type registry, source chain, cache, change notifier
/// and the decode worker pool, bundled behind a single owner.
///
/// All mutation happens through `&mut self` on the owning thread; decode
/// workers only ever see bytes in and immutable decoded data out.
pub struct Assets {
    registry: TypeRegistry,
    chain: SourceChain,
    cache: AssetCache,
    notifier: ChangeNotifier,
    workers: Workers,
    pending_basic: PendingQueue,
    pending_compound: PendingQueue,
}

enum Resolution {
    Basic(Arc<Source>),
    Compound(SourceList),
}

impl Resolution {
    fn ids(&self) -> SourceIdList {
        match self {
            Resolution::Basic(source) => smallvec![source.id()],
            Resolution::Compound(sources) => sources.iter().map(|s| s.id()).collect(),
        }
    }

    fn into_sources(self) -> SourceList {
        match self {
            Resolution::Basic(source) => smallvec![source],
            Resolution::Compound(sources) => sources,
        }
    }
}

impl Assets {
    pub fn new() -> Assets {
        Assets::with_worker_threads(4)
    }

    pub fn with_worker_threads(threads: usize) -> Assets {
        Assets {
            registry: TypeRegistry::new(),
            chain: SourceChain::new(),
            cache: AssetCache::new(),
            notifier: ChangeNotifier::new(),
            workers: spawn_workers(threads),
            pending_basic: PendingQueue::new(),
            pending_compound: PendingQueue::new(),
        }
    }

    // ---- registration ----

    /// Registers a basic asset kind for `extension`. Panics on a
    /// duplicate extension or asset kind; registration conflicts are
    /// startup configuration errors.
    pub fn register_basic<F: BasicFormat>(&mut self, extension: &str, format: F) {
        self.registry.register_basic(extension, format);
    }

    /// Compound counterpart of [`Assets::register_basic`].
    pub fn register_compound<F: CompoundFormat>(&mut self, extension: &str, format: F) {
        self.registry.register_compound(extension, format);
    }

    /// Drops every registered type. Only permitted while no assets are
    /// loaded, so no cache entry can outlive its type.
    pub fn unregister_all(&mut self) {
        if !self.cache.is_empty() {
            unregister_with_loaded_assets(self.cache.len());
        }
        self.registry.clear();
    }

    // ---- source chain ----

    /// Appends a source at the top of the priority order. Adding a
    /// source already in the chain is a no-op.
    pub fn add_source(&mut self, source: &Arc<Source>) {
        self.chain.add(source);
    }

    /// Removes a source by identity. Does not unload anything by
    /// itself; see [`Assets::unload_unsourced`].
    pub fn remove_source(&mut self, source: &Arc<Source>) {
        self.chain.remove(source.id());
    }

    pub fn sources(&self) -> &[Arc<Source>] {
        self.chain.sources()
    }

    // ---- synchronous loading ----

    /// Loads one path unconditionally, decoding on the calling thread.
    /// Unregistered extensions and unresolvable paths are silently
    /// ignored; decode failures are logged and skipped.
    pub fn load_asset(&mut self, path: &str) {
        self.sync_load_path(path, true);
        self.notifier.flush();
    }

    /// Idempotent load: a no-op unless the path has no entry, the entry
    /// is a fallback stand-in, or its recorded sources no longer match
    /// what the chain resolves today.
    pub fn load(&mut self, path: &str) {
        self.sync_load_path(path, false);
        self.notifier.flush();
    }

    /// Loads every path visible from any source that needs it, walking
    /// sources highest priority first with first-occurrence dedup.
    pub fn load_all(&mut self) {
        self.sweep(false);
    }

    /// Like [`Assets::load_all`] but forces every matching path.
    pub fn reload_all(&mut self) {
        self.sweep(true);
    }

    fn sweep(&mut self, force: bool) {
        let paths = self.chain.enumerate_all();
        debug!(count = paths.len(), force, "load sweep");

        for path in &paths {
            self.sync_load_path(path, force);
        }

        self.notifier.flush();
    }

    fn resolve(&self, path: &str) -> Option<(TypeRef, Resolution)> {
        let extension = path::extension(path)?;
        let ty = self.registry.lookup(extension)?;

        let resolution = if ty.ops.is_compound() {
            let sources = self.chain.calculate_compound_sources(path);
            if sources.is_empty() {
                return None;
            }
            Resolution::Compound(sources)
        } else {
            Resolution::Basic(self.chain.calculate_basic_source(path)?.clone())
        };

        Some((ty, resolution))
    }

    fn needs_load(&self, path: &str, resolved: &[SourceId]) -> bool {
        match self.cache.get(path) {
            None => true,
            Some(entry) if entry.is_fallback => true,
            Some(entry) => entry.sources.as_slice() != resolved,
        }
    }

    fn sync_load_path(&mut self, path: &str, force: bool) {
        let Some((ty, resolution)) = self.resolve(path) else {
            return;
        };

        let ids = resolution.ids();
        if !force && !self.needs_load(path, &ids) {
            return;
        }

        let sources = resolution.into_sources();
        let datas = match decode_sources(path, &sources, &ty.ops) {
            Ok(datas) => datas,
            Err(error) => {
                error!(?error, path, "failed to load asset");
                return;
            }
        };

        self.apply(&ty, Arc::from(path), ids, datas, false);
    }

    /// Constructs or reloads the cache entry for `path` from decoded
    /// data, one payload per contributing source in chain order.
    fn apply(
        &mut self,
        ty: &TypeRef,
        path: Arc<str>,
        sources: SourceIdList,
        datas: Vec<Box<dyn AnyData>>,
        is_fallback: bool,
    ) {
        match &ty.ops {
            FormatOps::Basic(format) => {
                let format = format.clone();
                let (Some(data), Some(&source)) = (datas.into_iter().next(), sources.first())
                else {
                    return;
                };
                self.apply_basic(ty, &format, path, source, data, is_fallback);
            }
            FormatOps::Compound(format) => {
                let format = format.clone();
                self.apply_compound(ty, &format, path, sources, datas, is_fallback);
            }
        }
    }

    fn apply_basic(
        &mut self,
        ty: &TypeRef,
        format: &Arc<dyn DynBasicFormat>,
        path: Arc<str>,
        source: SourceId,
        data: Box<dyn AnyData>,
        is_fallback: bool,
    ) {
        if let Some(entry) = self.cache.get_mut(&path) {
            format.reload(entry.instance.as_mut(), &*data);
            entry.sources = smallvec![source];
            entry.is_fallback = is_fallback;
            self.notifier.record(ChangeKind::Reloaded, path.clone());
            trace!(path = %path, "asset reloaded");
        } else {
            let Some(instance) = format.construct(&path, &*data) else {
                return;
            };
            self.cache.insert(Entry {
                path: path.clone(),
                asset_type: ty.asset_type,
                type_name: ty.type_name,
                instance,
                sources: smallvec![source],
                is_fallback,
            });
            self.notifier.record(ChangeKind::Loaded, path.clone());
            trace!(path = %path, "asset loaded");
        }

        // the fallback path's own data stays cached for substitution
        if !is_fallback && path == ty.fallback_path {
            self.registry.set_fallback_data(&ty.extension, vec![data]);
        }
    }

    fn apply_compound(
        &mut self,
        ty: &TypeRef,
        format: &Arc<dyn DynCompoundFormat>,
        path: Arc<str>,
        sources: SourceIdList,
        datas: Vec<Box<dyn AnyData>>,
        is_fallback: bool,
    ) {
        if let Some(entry) = self.cache.get_mut(&path) {
            format.reset_layers(entry.instance.as_mut());
            for data in &datas {
                format.merge_layer(entry.instance.as_mut(), &**data);
            }
            entry.sources = sources;
            entry.is_fallback = is_fallback;
            self.notifier.record(ChangeKind::Reloaded, path.clone());
            trace!(path = %path, "asset reloaded");
        } else {
            let mut instance = format.construct(&path);
            for data in &datas {
                format.merge_layer(&mut *instance, &**data);
            }
            self.cache.insert(Entry {
                path: path.clone(),
                asset_type: ty.asset_type,
                type_name: ty.type_name,
                instance,
                sources,
                is_fallback,
            });
            self.notifier.record(ChangeKind::Loaded, path.clone());
            trace!(path = %path, "asset loaded");
        }

        if !is_fallback && path == ty.fallback_path {
            self.registry.set_fallback_data(&ty.extension, datas);
        }
    }

    // ---- asynchronous loading ----

    /// Async mirror of [`Assets::load_asset`]: decode runs on the worker
    /// pool, construction happens during [`Assets::complete_async_loads`].
    /// No-op paths resolve the ticket immediately as skipped.
    pub fn load_asset_async(&mut self, path: &str) -> LoadTicket {
        match self.resolve(path) {
            Some((ty, resolution)) => {
                self.submit_async(ty, Arc::from(path), resolution.into_sources())
            }
            None => LoadTicket::resolved(LoadOutcome::Skipped),
        }
    }

    pub fn load_all_async(&mut self) -> BatchTicket {
        self.sweep_async(false)
    }

    pub fn reload_all_async(&mut self) -> BatchTicket {
        self.sweep_async(true)
    }

    fn sweep_async(&mut self, force: bool) -> BatchTicket {
        let paths = self.chain.enumerate_all();
        debug!(count = paths.len(), force, "async load sweep");

        let mut tickets = Vec::new();
        for path in &paths {
            let Some((ty, resolution)) = self.resolve(path) else {
                continue;
            };
            if !force && !self.needs_load(path, &resolution.ids()) {
                continue;
            }
            tickets.push(self.submit_async(ty, path.clone(), resolution.into_sources()));
        }

        BatchTicket::new(tickets)
    }

    fn submit_async(&mut self, ty: TypeRef, path: Arc<str>, sources: SourceList) -> LoadTicket {
        let source_ids = sources.iter().map(|s| s.id()).collect();
        let data_rx = self.workers.submit(path.clone(), sources, ty.ops.clone());
        let ticket = LoadTicket::pending();

        let queue = if ty.ops.is_compound() {
            &mut self.pending_compound
        } else {
            &mut self.pending_basic
        };

        queue.push(PendingLoad {
            ty,
            path,
            source_ids,
            data_rx,
            ticket: ticket.clone(),
        });

        ticket
    }

    /// Finishes ready async loads on the calling thread: drains the
    /// basic queue then the compound queue, strictly FIFO within each,
    /// never skipping past an unready head, until `max_duration`
    /// elapses. Change notifications fire once per pump call.
    pub fn complete_async_loads(&mut self, max_duration: Duration) {
        let deadline = Instant::now() + max_duration;
        self.drain_queue(false, deadline);
        self.drain_queue(true, deadline);
        self.notifier.flush();
    }

    fn drain_queue(&mut self, compound: bool, deadline: Instant) {
        loop {
            if Instant::now() >= deadline {
                break;
            }

            let popped = if compound {
                self.pending_compound.pop_ready()
            } else {
                self.pending_basic.pop_ready()
            };

            let Some((pending, result)) = popped else {
                break;
            };

            self.finish_pending(pending, result);
        }
    }

    fn finish_pending(&mut self, pending: PendingLoad, result: Option<DecodeResult>) {
        let PendingLoad {
            ty,
            path,
            source_ids,
            ticket,
            ..
        } = pending;

        let datas = match result {
            Some(Ok(datas)) => datas,
            Some(Err(error)) => {
                // already logged by the worker
                ticket.resolve(LoadOutcome::Failed(format!("{error:#}")));
                return;
            }
            None => {
                ticket.resolve(LoadOutcome::Failed("decode task dropped".into()));
                return;
            }
        };

        let reloading = self.cache.contains(&path);
        self.apply(&ty, path, source_ids, datas, false);
        ticket.resolve(if reloading {
            LoadOutcome::Reloaded
        } else {
            LoadOutcome::Loaded
        });
    }

    // ---- queries ----

    /// True only for a real (non-fallback) entry of the requested type.
    pub fn exists<A: Asset>(&self, path: &str) -> bool {
        self.cache
            .get(path)
            .map_or(false, |e| !e.is_fallback && e.is_type::<A>())
    }

    /// Returns the cached instance, substituting the type's fallback
    /// asset when the path resolves to nothing. The returned borrow
    /// stays valid until the path is unloaded.
    pub fn get<A: Asset>(&mut self, path: &str) -> Result<&A, QueryError> {
        if self.cache.get(path).is_none() {
            self.resolve_fallback::<A>(path)?;
        }

        let entry = self
            .cache
            .get(path)
            .ok_or_else(|| no_such_asset(path))?;

        match entry.instance_ref::<A>() {
            Some(instance) => Ok(instance),
            None => Err(QueryError::TypeMismatch {
                path: path.into(),
                requested: std::any::type_name::<A>(),
                cached: entry.type_name,
            }),
        }
    }

    /// Synthesizes a fallback entry at `path`, if the type's fallback
    /// data is cached. Fallback entries reuse the fallback path's own
    /// recorded sources and are invisible to enumeration.
    fn resolve_fallback<A: Asset>(&mut self, path: &str) -> Result<(), QueryError> {
        let extension = path::extension(path).ok_or_else(|| no_such_asset(path))?;
        let ty = self
            .registry
            .lookup(extension)
            .ok_or_else(|| no_such_asset(path))?;

        if ty.asset_type != TypeId::of::<A>() {
            return Err(QueryError::TypeMismatch {
                path: path.into(),
                requested: std::any::type_name::<A>(),
                cached: ty.type_name,
            });
        }

        let sources = self
            .cache
            .get(&ty.fallback_path)
            .map(|e| e.sources.clone())
            .unwrap_or_default();

        let instance = {
            let datas = self
                .registry
                .fallback_data(extension)
                .ok_or_else(|| no_such_asset(path))?;

            match &ty.ops {
                FormatOps::Basic(format) => {
                    let data = datas.first().ok_or_else(|| no_such_asset(path))?;
                    format
                        .construct(path, &**data)
                        .ok_or_else(|| no_such_asset(path))?
                }
                FormatOps::Compound(format) => {
                    let mut instance = format.construct(path);
                    for data in datas {
                        format.merge_layer(&mut *instance, &**data);
                    }
                    instance
                }
            }
        };

        debug!(path, fallback = %ty.fallback_path, "substituted fallback asset");
        self.cache.insert(Entry {
            path: path.into(),
            asset_type: ty.asset_type,
            type_name: ty.type_name,
            instance,
            sources,
            is_fallback: true,
        });

        Ok(())
    }

    /// Non-fallback entries of the requested type directly inside `dir`.
    pub fn list<A: Asset>(&self, dir: &str) -> Vec<(Arc<str>, &A)> {
        self.cache
            .iter()
            .filter(|e| !e.is_fallback && path::in_directory(&e.path, dir))
            .filter_map(|e| e.instance_ref::<A>().map(|v| (e.path.clone(), v)))
            .collect()
    }

    /// Non-fallback entries of the requested type under `prefix`,
    /// recursively. An empty prefix matches everything.
    pub fn find<A: Asset>(&self, prefix: &str) -> Vec<(Arc<str>, &A)> {
        self.cache
            .iter()
            .filter(|e| !e.is_fallback && path::has_prefix(&e.path, prefix))
            .filter_map(|e| e.instance_ref::<A>().map(|v| (e.path.clone(), v)))
            .collect()
    }

    /// Re-opens the raw byte stream behind a loaded basic asset,
    /// bypassing cache and decoder. Meant for large sequential media.
    pub fn open_streaming_asset(&self, path: &str) -> Result<Box<dyn Read + Send>, QueryError> {
        let entry = self.cache.get(path).ok_or_else(|| no_such_asset(path))?;
        let ty = path::extension(&entry.path)
            .and_then(|ext| self.registry.lookup(ext))
            .ok_or_else(|| no_such_asset(path))?;

        if ty.ops.is_compound() {
            return Err(QueryError::StreamingUnsupported { path: path.into() });
        }

        let source = entry
            .sources
            .first()
            .and_then(|&id| self.chain.get(id))
            .ok_or_else(|| no_such_asset(path))?;

        let stream_path = if entry.is_fallback {
            &*ty.fallback_path
        } else {
            path
        };

        source
            .store()
            .open(stream_path)
            .map_err(|error| QueryError::Io {
                path: stream_path.into(),
                message: format!("{error:#}"),
            })
    }

    // ---- unloading ----

    /// Disposes the entry at `path`. Unloading a type's own fallback
    /// path also clears its cached fallback data, disabling substitution
    /// until that path is loaded again.
    pub fn unload(&mut self, path: &str) {
        self.remove_entry(path);
        self.notifier.flush();
    }

    pub fn unload_all(&mut self) {
        for path in self.cache.paths() {
            self.remove_entry(&path);
        }
        self.notifier.flush();
    }

    /// Removes every non-fallback entry no longer satisfied by any of
    /// its recorded sources, either because the source left the chain or
    /// because it stopped reporting the path. Used when a mod is
    /// detached at runtime.
    pub fn unload_unsourced(&mut self) {
        let stale: Vec<Arc<str>> = self
            .cache
            .iter()
            .filter(|e| !e.is_fallback)
            .filter(|e| {
                !e.sources.iter().any(|&id| {
                    self.chain
                        .get(id)
                        .map_or(false, |s| s.store().exists(&e.path))
                })
            })
            .map(|e| e.path.clone())
            .collect();

        debug!(count = stale.len(), "unloading unsourced assets");
        for path in &stale {
            self.remove_entry(path);
        }
        self.notifier.flush();
    }

    fn remove_entry(&mut self, path: &str) {
        let Some(entry) = self.cache.remove(path) else {
            return;
        };

        if !entry.is_fallback {
            if let Some(extension) = path::extension(&entry.path) {
                self.registry.clear_fallback_data_for(extension, &entry.path);
            }
        }

        trace!(path = %entry.path, "asset unloaded");
        self.notifier.record(ChangeKind::Unloaded, entry.path.clone());
    }

    // ---- change notification & diagnostics ----

    /// Subscribes to batched change events: at most one event per
    /// category per top-level operation, carrying every affected path.
    pub fn subscribe_changes(&mut self) -> ChangeReceiver {
        self.notifier.subscribe()
    }

    pub fn loaded_paths(&self) -> Vec<Arc<str>> {
        self.cache
            .iter()
            .filter(|e| !e.is_fallback)
            .map(|e| e.path.clone())
            .collect()
    }

    pub fn is_fallback(&self, path: &str) -> Option<bool> {
        self.cache.get(path).map(|e| e.is_fallback)
    }

    /// Names of the sources currently backing `path`, in chain order.
    pub fn source_names_of(&self, path: &str) -> Option<Vec<String>> {
        let entry = self.cache.get(path)?;
        Some(
            entry
                .sources
                .iter()
                .filter_map(|&id| self.chain.get(id))
                .map(|s| s.name().to_owned())
                .collect(),
        )
    }
}

impl Default for Assets {
    fn default() -> Assets {
        Assets::new()
    }
}

impl Debug for Assets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Assets")
            .field("sources", &self.chain.sources().len())
            .field("cached", &self.cache.len())
            .finish_non_exhaustive()
    }
}

fn no_such_asset(path: &str) -> QueryError {
    QueryError::NoSuchAsset { path: path.into() }
}

#[cold]
#[inline(never)]
fn unregister_with_loaded_assets(count: usize) -> ! {
    panic!("cannot unregister asset types while {} assets are loaded", count);
}
