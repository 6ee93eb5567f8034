//! In-process aggregate store.
//!
//! Documents are kept as JSON values so they have the same shape as on disk.
//! One mutex guards all collections, which makes every call atomic.

use super::collection::{self, Collection};
use super::{acquire, AggregateStore, Document, Filter, DEFAULT_OPERATION_TIMEOUT};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, TryLockError};
use std::time::Duration;

pub struct MemoryStore {
    collections: Mutex<HashMap<&'static str, Collection>>,
    timeout: Duration,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_OPERATION_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            collections: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, HashMap<&'static str, Collection>>> {
        acquire(self.timeout, operation, || match self.collections.try_lock() {
            Ok(guard) => Ok(Some(guard)),
            Err(TryLockError::WouldBlock) => Ok(None),
            Err(TryLockError::Poisoned(_)) => {
                Err(Error::Store("memory store lock poisoned".into()))
            }
        })
    }

    fn with_collection<D, T>(
        &self,
        operation: &'static str,
        f: impl FnOnce(&mut Collection) -> Result<T>,
    ) -> Result<T>
    where
        D: Document,
    {
        let mut guard = self.lock(operation)?;
        f(guard.entry(D::COLLECTION).or_default())
    }
}

impl AggregateStore for MemoryStore {
    fn insert_one<D: Document>(&self, doc: &D) -> Result<()> {
        self.with_collection::<D, _>("insert", |c| collection::insert(c, doc))
    }

    fn find_one<D: Document>(&self, filter: &Filter) -> Result<Option<D>> {
        self.with_collection::<D, _>("find", |c| {
            Ok(collection::scan::<D>(c, filter)?.into_iter().next())
        })
    }

    fn find_all<D: Document>(&self, filter: &Filter) -> Result<Vec<D>> {
        self.with_collection::<D, _>("find", |c| collection::scan(c, filter))
    }

    fn update_one<D, F>(&self, filter: &Filter, mutation: F) -> Result<u64>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()>,
    {
        self.with_collection::<D, _>("update", |c| collection::update_first(c, filter, mutation))
    }

    fn delete_one<D: Document>(&self, filter: &Filter) -> Result<u64> {
        self.with_collection::<D, _>("delete", |c| collection::delete_first::<D>(c, filter))
    }
}
