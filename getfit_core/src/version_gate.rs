//! Version-gated updates (optimistic concurrency control).
//!
//! Every mutation of a stored aggregate goes through [`update_with`]: the
//! filter pins `{id, owner, version = expected}` and the store applies the
//! change, `version = expected + 1` and `updated_at = now` in one atomic
//! conditional write. Two writers holding the same expected version cannot
//! both match, so exactly one commits and the other gets
//! [`Error::VersionConflict`]. Retrying after a fresh read is the caller's
//! job.
//!
//! A zero match count alone cannot tell a missing aggregate from a stale
//! version, so on failure one diagnostic read by `{id, owner}` decides which
//! error to report.

use crate::store::{AggregateStore, Document, Filter};
use crate::{Error, ExerciseId, Result, Version};
use chrono::Utc;
use uuid::Uuid;

/// Typed field mask for one aggregate kind
pub trait Patch<D> {
    fn is_empty(&self) -> bool;

    /// Merge-set: only fields present in the patch change
    fn apply(self, doc: &mut D);
}

/// The aggregate (and optionally one embedded exercise) a write addresses
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Target {
    pub id: Uuid,
    pub owner_id: Option<Uuid>,
    pub exercise_id: Option<ExerciseId>,
}

impl Target {
    /// An aggregate owned by a user
    pub fn owned(id: Uuid, owner_id: Uuid) -> Self {
        Self {
            id,
            owner_id: Some(owner_id),
            exercise_id: None,
        }
    }

    /// A user aggregate, which has no owner
    pub fn user(id: Uuid) -> Self {
        Self {
            id,
            owner_id: None,
            exercise_id: None,
        }
    }

    /// Additionally require the embedded exercise list to contain `exercise_id`
    pub fn exercise(mut self, exercise_id: ExerciseId) -> Self {
        self.exercise_id = Some(exercise_id);
        self
    }

    fn identity_filter(&self) -> Filter {
        let mut filter = Filter::by_id(self.id);
        if let Some(owner) = self.owner_id {
            filter = filter.owned_by(owner);
        }
        filter
    }

    fn cas_filter(&self, expected: Version) -> Filter {
        let mut filter = self.identity_filter().at_version(expected);
        if let Some(exercise_id) = self.exercise_id {
            filter = filter.with_exercise(exercise_id);
        }
        filter
    }
}

/// Apply a field mask under the version gate, returning the new version
pub fn update<S, D, P>(store: &S, target: Target, expected: Version, patch: P) -> Result<Version>
where
    S: AggregateStore,
    D: Document,
    P: Patch<D>,
{
    if expected.is_unset() {
        return Err(Error::Validation("expected version is required".into()));
    }
    if patch.is_empty() {
        return Err(Error::Validation("no fields to update".into()));
    }
    update_with::<S, D, _>(store, target, expected, |doc| {
        patch.apply(doc);
        Ok(())
    })
}

/// Apply an arbitrary mutation under the version gate.
///
/// The mutation sees the exact document state being replaced; returning an
/// error aborts the write.
pub fn update_with<S, D, F>(store: &S, target: Target, expected: Version, mutation: F) -> Result<Version>
where
    S: AggregateStore,
    D: Document,
    F: FnOnce(&mut D) -> Result<()>,
{
    if expected.is_unset() {
        return Err(Error::Validation("expected version is required".into()));
    }

    let next = expected.next()?;
    let now = Utc::now();
    let matched = store.update_one::<D, _>(&target.cas_filter(expected), |doc| {
        mutation(doc)?;
        doc.touch(next, now);
        Ok(())
    })?;

    if matched > 0 {
        tracing::debug!("Updated {} {} to version {}", D::COLLECTION, target.id, next);
        return Ok(next);
    }

    let err = diagnose::<S, D>(store, target, expected)?;
    if err.is_conflict() {
        tracing::info!("{}", err);
    }
    Err(err)
}

/// Explain a zero match count with one read by id and owner
fn diagnose<S, D>(store: &S, target: Target, expected: Version) -> Result<Error>
where
    S: AggregateStore,
    D: Document,
{
    let current = store.find_one::<D>(&target.identity_filter())?;
    let err = match current {
        None => Error::NotFound {
            kind: D::COLLECTION,
            id: target.id,
        },
        Some(doc) if doc.version() != expected => Error::VersionConflict {
            kind: D::COLLECTION,
            id: target.id,
            expected,
            actual: doc.version(),
        },
        Some(doc) => match target.exercise_id {
            Some(exercise_id) if !doc.has_exercise(exercise_id) => Error::NotFound {
                kind: "exercise",
                id: exercise_id,
            },
            // Another writer interleaved between the write and this read.
            _ => Error::VersionConflict {
                kind: D::COLLECTION,
                id: target.id,
                expected,
                actual: doc.version(),
            },
        },
    };
    Ok(err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileStore, MemoryStore};
    use crate::{Routine, RoutineExercise, RoutinePatch};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn seed<S: AggregateStore>(store: &S, owner: Uuid) -> Routine {
        let now = Utc::now();
        let routine = Routine {
            id: Uuid::new_v4(),
            owner_id: owner,
            title: "Full body".into(),
            description: None,
            exercises: vec![RoutineExercise {
                exercise_id: Uuid::from_u128(1),
                order: 0,
                template_sets: vec![],
            }],
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        };
        store.insert_one(&routine).unwrap();
        routine
    }

    fn retitle(title: &str) -> RoutinePatch {
        RoutinePatch {
            title: Some(title.into()),
            description: None,
        }
    }

    #[test]
    fn test_matching_version_succeeds_then_goes_stale() {
        crate::logging::init_test();
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = seed(&store, owner);
        let target = Target::owned(routine.id, owner);

        let next = update::<_, Routine, _>(&store, target, Version::INITIAL, retitle("A")).unwrap();
        assert_eq!(next, Version::new(2));

        let stored: Routine = store.find_one(&Filter::by_id(routine.id)).unwrap().unwrap();
        assert_eq!(stored.version, Version::new(2));
        assert_eq!(stored.title, "A");
        assert!(stored.updated_at >= routine.updated_at);

        let again = update::<_, Routine, _>(&store, target, Version::INITIAL, retitle("B"));
        match again {
            Err(Error::VersionConflict { expected, actual, .. }) => {
                assert_eq!(expected, Version::INITIAL);
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("expected conflict, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_version_rejected_before_store_call() {
        let store = MemoryStore::new();
        let target = Target::owned(Uuid::new_v4(), Uuid::new_v4());
        let result = update::<_, Routine, _>(&store, target, Version::new(0), retitle("A"));
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_empty_patch_rejected() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = seed(&store, owner);
        let result = update::<_, Routine, _>(
            &store,
            Target::owned(routine.id, owner),
            Version::INITIAL,
            RoutinePatch::default(),
        );
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_missing_and_foreign_aggregates_are_not_found() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = seed(&store, owner);

        let missing = Target::owned(Uuid::new_v4(), owner);
        assert!(matches!(
            update::<_, Routine, _>(&store, missing, Version::INITIAL, retitle("A")),
            Err(Error::NotFound { kind: "routine", .. })
        ));

        let foreign = Target::owned(routine.id, Uuid::new_v4());
        assert!(matches!(
            update::<_, Routine, _>(&store, foreign, Version::INITIAL, retitle("A")),
            Err(Error::NotFound { kind: "routine", .. })
        ));
    }

    #[test]
    fn test_missing_nested_exercise_is_not_found() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = seed(&store, owner);
        let target = Target::owned(routine.id, owner).exercise(Uuid::from_u128(99));

        let result = update_with::<_, Routine, _>(&store, target, Version::INITIAL, |_| Ok(()));
        assert!(matches!(result, Err(Error::NotFound { kind: "exercise", .. })));
    }

    #[test]
    fn test_failed_mutation_does_not_bump_version() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = seed(&store, owner);

        let result = update_with::<_, Routine, _>(
            &store,
            Target::owned(routine.id, owner),
            Version::INITIAL,
            |_| Err(Error::InvalidState("nope".into())),
        );
        assert!(matches!(result, Err(Error::InvalidState(_))));

        let stored: Routine = store.find_one(&Filter::by_id(routine.id)).unwrap().unwrap();
        assert_eq!(stored.version, Version::INITIAL);
    }

    #[test]
    fn test_exhausted_version_is_never_rewritten() {
        let store = MemoryStore::new();
        let owner = Uuid::new_v4();
        let routine = Routine {
            version: Version::new(u32::MAX),
            ..seed(&MemoryStore::new(), owner)
        };
        store.insert_one(&routine).unwrap();

        let result = update::<_, Routine, _>(
            &store,
            Target::owned(routine.id, owner),
            Version::new(u32::MAX),
            retitle("A"),
        );
        assert!(matches!(result, Err(Error::InvalidState(_))));

        let stored: Routine = store.find_one(&Filter::by_id(routine.id)).unwrap().unwrap();
        assert_eq!(stored.version, Version::new(u32::MAX));
        assert_eq!(stored.title, "Full body");
    }

    fn race<S: AggregateStore>(store: &S, writers: usize) {
        let owner = Uuid::new_v4();
        let routine = seed(store, owner);
        let target = Target::owned(routine.id, owner);
        let wins = AtomicUsize::new(0);
        let conflicts = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for i in 0..writers {
                let (wins, conflicts) = (&wins, &conflicts);
                scope.spawn(move || {
                    let patch = retitle(&format!("writer {}", i));
                    match update::<_, Routine, _>(store, target, Version::INITIAL, patch) {
                        Ok(_) => wins.fetch_add(1, Ordering::SeqCst),
                        Err(Error::VersionConflict { .. }) => conflicts.fetch_add(1, Ordering::SeqCst),
                        Err(e) => panic!("unexpected error: {}", e),
                    };
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(conflicts.load(Ordering::SeqCst), writers - 1);

        let stored: Routine = store.find_one(&Filter::by_id(routine.id)).unwrap().unwrap();
        assert_eq!(stored.version, Version::new(2));
    }

    #[test]
    fn test_concurrent_writers_exactly_one_wins_in_memory() {
        race(&MemoryStore::new(), 16);
    }

    #[test]
    fn test_concurrent_writers_exactly_one_wins_on_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        race(&FileStore::open(temp_dir.path()).unwrap(), 8);
    }
}
