//! Aggregate store abstraction.
//!
//! Every aggregate is persisted as one self-contained JSON document keyed by
//! its id. The engine only relies on per-document atomicity of
//! [`AggregateStore::update_one`]: the filter is evaluated and the mutation
//! applied under the same lock, so a version predicate in the filter makes
//! the write a compare-and-swap.

mod collection;
pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::{Error, ExerciseId, Result, Version};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

/// Deadline used when a store is built without configuration
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(5);

const LOCK_RETRY_INTERVAL: Duration = Duration::from_millis(1);

/// A stored aggregate
pub trait Document: Serialize + DeserializeOwned + Clone {
    /// Collection name, also used as the aggregate kind in errors
    const COLLECTION: &'static str;

    fn id(&self) -> Uuid;

    /// Owning user; `None` for users themselves
    fn owner_id(&self) -> Option<Uuid>;

    fn version(&self) -> Version;

    /// Whether the embedded exercise list contains `exercise_id`
    fn has_exercise(&self, _exercise_id: ExerciseId) -> bool {
        false
    }

    /// Record a successful mutation
    fn touch(&mut self, version: Version, now: DateTime<Utc>);
}

/// Conjunction of optional predicates over a document
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Filter {
    pub id: Option<Uuid>,
    pub owner_id: Option<Uuid>,
    pub version: Option<Version>,
    pub exercise_id: Option<ExerciseId>,
}

impl Filter {
    /// Matches every document in a collection
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_id(id: Uuid) -> Self {
        Self {
            id: Some(id),
            ..Self::default()
        }
    }

    pub fn by_owner(owner_id: Uuid) -> Self {
        Self {
            owner_id: Some(owner_id),
            ..Self::default()
        }
    }

    pub fn owned_by(mut self, owner_id: Uuid) -> Self {
        self.owner_id = Some(owner_id);
        self
    }

    pub fn at_version(mut self, version: Version) -> Self {
        self.version = Some(version);
        self
    }

    pub fn with_exercise(mut self, exercise_id: ExerciseId) -> Self {
        self.exercise_id = Some(exercise_id);
        self
    }

    pub fn matches<D: Document>(&self, doc: &D) -> bool {
        self.id.map_or(true, |id| doc.id() == id)
            && self.owner_id.map_or(true, |owner| doc.owner_id() == Some(owner))
            && self.version.map_or(true, |version| doc.version() == version)
            && self.exercise_id.map_or(true, |ex| doc.has_exercise(ex))
    }
}

/// Durable document storage with atomic conditional read-modify-write
pub trait AggregateStore: Send + Sync {
    /// Insert a new document; its id must not already exist
    fn insert_one<D: Document>(&self, doc: &D) -> Result<()>;

    fn find_one<D: Document>(&self, filter: &Filter) -> Result<Option<D>>;

    fn find_all<D: Document>(&self, filter: &Filter) -> Result<Vec<D>>;

    /// Apply `mutation` to the first document matching `filter`.
    ///
    /// Returns the matched count (0 or 1). Filter evaluation and mutation
    /// happen atomically; if the mutation fails nothing is written.
    fn update_one<D, F>(&self, filter: &Filter, mutation: F) -> Result<u64>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()>;

    /// Returns the deleted count (0 or 1)
    fn delete_one<D: Document>(&self, filter: &Filter) -> Result<u64>;
}

impl<S: AggregateStore> AggregateStore for std::sync::Arc<S> {
    fn insert_one<D: Document>(&self, doc: &D) -> Result<()> {
        (**self).insert_one(doc)
    }

    fn find_one<D: Document>(&self, filter: &Filter) -> Result<Option<D>> {
        (**self).find_one(filter)
    }

    fn find_all<D: Document>(&self, filter: &Filter) -> Result<Vec<D>> {
        (**self).find_all(filter)
    }

    fn update_one<D, F>(&self, filter: &Filter, mutation: F) -> Result<u64>
    where
        D: Document,
        F: FnOnce(&mut D) -> Result<()>,
    {
        (**self).update_one(filter, mutation)
    }

    fn delete_one<D: Document>(&self, filter: &Filter) -> Result<u64> {
        (**self).delete_one::<D>(filter)
    }
}

/// Poll `attempt` until it yields a value or `timeout` elapses
pub(crate) fn acquire<T>(
    timeout: Duration,
    operation: &'static str,
    mut attempt: impl FnMut() -> Result<Option<T>>,
) -> Result<T> {
    let started = Instant::now();
    loop {
        if let Some(value) = attempt()? {
            return Ok(value);
        }
        if started.elapsed() >= timeout {
            tracing::warn!("{} gave up after {:?}", operation, timeout);
            return Err(Error::Timeout { operation, timeout });
        }
        std::thread::sleep(LOCK_RETRY_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Routine, RoutineExercise};

    fn routine(owner: Uuid) -> Routine {
        Routine {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: "Legs".into(),
            description: None,
            exercises: vec![RoutineExercise {
                exercise_id: Uuid::from_u128(7),
                order: 0,
                template_sets: vec![],
            }],
            version: Version::new(3),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_filter_requires_every_predicate() {
        let owner = Uuid::new_v4();
        let doc = routine(owner);

        assert!(Filter::all().matches(&doc));
        assert!(Filter::by_id(doc.id)
            .owned_by(owner)
            .at_version(Version::new(3))
            .with_exercise(Uuid::from_u128(7))
            .matches(&doc));

        assert!(!Filter::by_id(doc.id).owned_by(Uuid::new_v4()).matches(&doc));
        assert!(!Filter::by_id(doc.id).at_version(Version::new(2)).matches(&doc));
        assert!(!Filter::by_id(doc.id)
            .with_exercise(Uuid::from_u128(8))
            .matches(&doc));
    }

    #[test]
    fn test_acquire_times_out() {
        let result: Result<()> = acquire(Duration::from_millis(5), "test lock", || Ok(None));
        match result {
            Err(e) => assert!(e.is_transient()),
            Ok(()) => panic!("expected timeout"),
        }
    }

    #[test]
    fn test_acquire_returns_first_success() {
        let mut calls = 0;
        let value = acquire(Duration::from_secs(1), "test lock", || {
            calls += 1;
            Ok(if calls == 3 { Some(calls) } else { None })
        })
        .unwrap();
        assert_eq!(value, 3);
    }
}
