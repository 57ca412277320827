use std::fmt::{self, Debug};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use eyre::{eyre, Result, WrapErr};
use parking_lot::Mutex;

/// A provider of raw asset bytes, addressed by logical path.
///
/// Implementations are interchangeable: an empty in-memory map, a
/// directory tree, an archive index. The loading pipeline only ever sees
/// this contract.
pub trait FileStore: Debug + Send + Sync + 'static {
    fn exists(&self, path: &str) -> bool;

    /// Opens a byte stream. Fails if the path is absent.
    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>>;

    /// Every logical path this store can satisfy, in no particular order.
    fn enumerate(&self) -> Vec<Arc<str>>;

    /// Re-scans the backing storage, e.g. after an archive changed on
    /// disk. Stores without an index do nothing.
    fn reload_index(&self) {}

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.open(path)?;
        let mut buf = Vec::new();
        reader
            .read_to_end(&mut buf)
            .wrap_err_with(|| format!("cannot read {}", path))?;
        Ok(buf)
    }
}

/// A [`FileStore`] that also accepts writes.
pub trait WritableFileStore: FileStore {
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()>;

    fn delete(&self, path: &str) -> Result<()>;
}

/// In-memory store. Starts empty; useful for tests, tooling, and
/// runtime-generated overlays.
#[derive(Debug, Default)]
pub struct MemoryStore {
    files: Mutex<AHashMap<Arc<str>, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> MemoryStore {
        MemoryStore::default()
    }

    pub fn insert(&self, path: impl Into<Arc<str>>, bytes: impl Into<Vec<u8>>) {
        self.files.lock().insert(path.into(), bytes.into());
    }

    pub fn remove(&self, path: &str) {
        self.files.lock().remove(path);
    }
}

impl FileStore for MemoryStore {
    fn exists(&self, path: &str) -> bool {
        self.files.lock().contains_key(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let files = self.files.lock();
        let bytes = files
            .get(path)
            .ok_or_else(|| eyre!("no such file: {}", path))?;
        Ok(Box::new(Cursor::new(bytes.clone())))
    }

    fn enumerate(&self) -> Vec<Arc<str>> {
        self.files.lock().keys().cloned().collect()
    }
}

impl WritableFileStore for MemoryStore {
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        self.insert(path, bytes);
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        self.files.lock().remove(path);
        Ok(())
    }
}

/// Directory-backed store with a rebuildable path index.
///
/// The index is scanned once at construction; callers invalidate it with
/// [`FileStore::reload_index`] after external changes.
pub struct DirStore {
    root: PathBuf,
    index: Mutex<AHashSet<Arc<str>>>,
}

impl Debug for DirStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl DirStore {
    pub fn new(root: impl AsRef<Path>) -> Result<DirStore> {
        let root = root.as_ref().canonicalize()?;
        let mut index = AHashSet::new();
        scan_dir(&root, String::new(), &mut index)?;

        Ok(DirStore {
            root,
            index: Mutex::new(index),
        })
    }

    fn file_path(&self, path: &str) -> PathBuf {
        let mut file_path = self.root.clone();
        file_path.extend(path.split('/'));
        file_path
    }
}

fn scan_dir(dir: &Path, prefix: String, index: &mut AHashSet<Arc<str>>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .wrap_err_with(|| format!("cannot scan {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(_) => continue,
        };

        let logical = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            scan_dir(&entry.path(), logical, index)?;
        } else {
            index.insert(logical.into());
        }
    }

    Ok(())
}

impl FileStore for DirStore {
    fn exists(&self, path: &str) -> bool {
        self.index.lock().contains(path)
    }

    fn open(&self, path: &str) -> Result<Box<dyn Read + Send>> {
        let file_path = self.file_path(path);
        let file = File::open(&file_path)
            .wrap_err_with(|| format!("cannot open {}", file_path.display()))?;
        Ok(Box::new(file))
    }

    fn enumerate(&self) -> Vec<Arc<str>> {
        self.index.lock().iter().cloned().collect()
    }

    fn reload_index(&self) {
        let mut index = AHashSet::new();
        if let Err(error) = scan_dir(&self.root, String::new(), &mut index) {
            tracing::error!(?error, root = %self.root.display(), "index rescan failed");
            return;
        }

        *self.index.lock() = index;
    }

    fn read_bytes(&self, path: &str) -> Result<Vec<u8>> {
        let file_path = self.file_path(path);
        let mut file = File::open(&file_path)
            .wrap_err_with(|| format!("cannot open {}", file_path.display()))?;

        let meta = file.metadata().ok();
        let capacity = meta
            .and_then(|meta| usize::try_from(meta.len()).ok())
            .unwrap_or(0);

        let mut buf = Vec::with_capacity(capacity);
        file.read_to_end(&mut buf)
            .wrap_err_with(|| format!("cannot read {}", file_path.display()))?;

        Ok(buf)
    }
}

impl WritableFileStore for DirStore {
    fn save(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let file_path = self.file_path(path);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent)
                .wrap_err_with(|| format!("cannot create {}", parent.display()))?;
        }

        std::fs::write(&file_path, bytes)
            .wrap_err_with(|| format!("cannot write {}", file_path.display()))?;
        self.index.lock().insert(path.into());
        Ok(())
    }

    fn delete(&self, path: &str) -> Result<()> {
        let file_path = self.file_path(path);
        std::fs::remove_file(&file_path)
            .wrap_err_with(|| format!("cannot delete {}", file_path.display()))?;
        self.index.lock().remove(path);
        Ok(())
    }
}
