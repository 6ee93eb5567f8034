//! File-backed aggregate store with advisory locking.
//!
//! Each collection lives in `<root>/<collection>.json` as a map from id to
//! document. A sibling `<collection>.lock` file is locked (shared for reads,
//! exclusive for writes) for the whole read-modify-write, so conditional
//! updates stay atomic across processes. Writes go to a temp file that is
//! synced and then renamed over the collection file.

use super::collection::{self, Collection};
use super::{acquire, AggregateStore, Document, Filter, DEFAULT_OPERATION_TIMEOUT};
use crate::{Error, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub struct FileStore {
    root: PathBuf,
    timeout: Duration,
}

/// Held collection lock, released on drop
struct CollectionLock {
    file: File,
}

impl Drop for CollectionLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!("Failed to release collection lock: {}", e);
        }
    }
}

#[derive(Clone, Copy)]
enum LockMode {
    Shared,
    Exclusive,
}

impl FileStore {
    /// Open (creating if needed) a store rooted at `root`
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with_timeout(root, DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn open_with_timeout(root: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        tracing::debug!("Opened file store at {:?}", root);
        Ok(Self { root, timeout })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn collection_path(&self, name: &str) -> PathBuf {
        self.root.join(format!("{}.json", name))
    }

    fn lock(&self, name: &str, mode: LockMode, operation: &'static str) -> Result<CollectionLock> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(self.root.join(format!("{}.lock", name)))?;

        let contended = fs2::lock_contended_error().kind();
        acquire(self.timeout, operation, || {
            let attempt = match mode {
                LockMode::Shared => FileExt::try_lock_shared(&file),
                LockMode::Exclusive => FileExt::try_lock_exclusive(&file),
            };
            match attempt {
                Ok(()) => Ok(Some(())),
                Err(e) if e.kind() == contended => Ok(None),
                Err(e) => Err(Error::Io(e)),
            }
        })?;

        Ok(CollectionLock { file })
    }

    fn load(&self, name: &str) -> Result<Collection> {
        let path = self.collection_path(name);
        if !path.exists() {
            return Ok(Collection::new());
        }

        let mut contents = String::new();
        File::open(&path)?.read_to_string(&mut contents)?;
        if contents.trim().is_empty() {
            return Ok(Collection::new());
        }

        serde_json::from_str(&contents).map_err(|e| {
            tracing::warn!("Failed to parse collection file {:?}: {}", path, e);
            Error::Json(e)
        })
    }

    /// Atomically replace the collection file: temp file, fsync, rename
    fn save(&self, name: &str, collection: &Collection) -> Result<()> {
        let path = self.collection_path(name);
        let temp = NamedTempFile::new_in(&self.root)?;

        {
            let mut writer = std::io::BufWriter::new(temp.as_file());
            let contents = serde_json::to_string(collection)?;
            writer.write_all(contents.as_bytes())?;
            writer.flush()?;
        }

        temp.as_file().sync_all()?;
        temp.persist(&path).map_err(|e| Error::Io(e.error))?;

        tracing::debug!("Saved {} documents to {:?}", collection.len(), path);
        Ok(())
    }

    fn read<D, T>(&self, operation: &'static str, f: impl FnOnce(&Collection) -> Result<T>) -> Result<T>
    where
        D: Document,
    {
        let _lock = self.lock(D::COLLECTION, LockMode::Shared, operation)?;
        let collection = self.load(D::COLLECTION)?;
        f(&collection)
    }

    /// Read-modify-write under the exclusive lock; `f` reports whether to save
    fn write<D, T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Collection) -> Result<(T, bool)>,
    ) -> Result<T>
    where
        D: Document,
    {
        let _lock = self.lock(D::COLLECTION, LockMode::Exclusive, operation)?;
        let mut collection = self.load(D::COLLECTION)?;
        let (value, changed) = f(&mut collection)?;
        if changed {
            self.save(D::COLLECTION, &collection)?;
        }
        Ok(value)
    }
}

impl AggregateStore for FileStore {
    fn insert_one<D: Document>(&self, doc: &D) -> Result<()> {
        self.write::<D, _>("insert", |c| collection::insert(c, doc).map(|()| ((), true)))
    }

    fn find_one<D: Document>(&self, filter: &Filter) -> Result<Option<D>> {
        self.read::<D, _>("find", |c| {
            Ok(collection::scan::<D>(c, filter)?.into_iter().next())
        })
    }

    fn find_all<D: Document>(&self, filter: &Filter) -> Result<Vec<D>> {
        self.read::<D, _>("find", |c| collection::scan(c, filter))
    }

    fn update_one<D, F>(&self, filter: &Filter, mutation: F) -> Result<u64>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()>,
    {
        self.write::<D, _>("update", |c| {
            let matched = collection::update_first(c, filter, mutation)?;
            Ok((matched, matched > 0))
        })
    }

    fn delete_one<D: Document>(&self, filter: &Filter) -> Result<u64> {
        self.write::<D, _>("delete", |c| {
            let deleted = collection::delete_first::<D>(c, filter)?;
            Ok((deleted, deleted > 0))
        })
    }
}
