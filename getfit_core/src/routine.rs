//! Routine aggregate editor.
//!
//! Routines embed their exercise slots and planned sets. The three
//! nested-list operations (add, update, remove) each bump the routine's
//! single top-level version; nested exercises are not versioned on their own.

use crate::store::{AggregateStore, Document, Filter};
use crate::user;
use crate::validation::Validator;
use crate::version_gate::{self, Patch, Target};
use crate::{
    Error, ExerciseId, ExercisePlan, NewRoutine, Result, Routine, RoutineExercise, RoutineId,
    RoutinePatch, SetPlan, TemplateSet, User, UserId, Version,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

impl Document for Routine {
    const COLLECTION: &'static str = "routine";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.owner_id)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn has_exercise(&self, exercise_id: ExerciseId) -> bool {
        self.exercises.iter().any(|e| e.exercise_id == exercise_id)
    }

    fn touch(&mut self, version: Version, now: DateTime<Utc>) {
        self.version = version;
        self.updated_at = now;
    }
}

impl Patch<Routine> for RoutinePatch {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none()
    }

    fn apply(self, routine: &mut Routine) {
        if let Some(title) = self.title {
            routine.title = title;
        }
        if let Some(description) = self.description {
            routine.description = Some(description);
        }
    }
}

/// Order for a newly appended slot: one past the highest existing order.
///
/// Orders are never compacted, so gaps left by removals persist.
pub(crate) fn next_order(orders: impl Iterator<Item = u32>) -> u32 {
    orders.max().map_or(0, |max| max.saturating_add(1))
}

fn user_routines(user: &mut User) -> &mut Vec<Uuid> {
    &mut user.routine_ids
}

pub struct RoutineEditor<S> {
    store: Arc<S>,
    validator: Validator,
}

impl<S: AggregateStore> RoutineEditor<S> {
    pub fn new(store: Arc<S>, validator: Validator) -> Self {
        Self { store, validator }
    }

    /// Number planned sets by position where the caller left it out
    fn template_sets(&self, plans: Vec<SetPlan>) -> Result<Vec<TemplateSet>> {
        plans
            .into_iter()
            .enumerate()
            .map(|(i, plan)| {
                self.validator.set_values(plan.weight, plan.reps)?;
                Ok(TemplateSet {
                    weight: plan.weight,
                    reps: plan.reps,
                    set_number: plan.set_number.unwrap_or(i as u32 + 1),
                })
            })
            .collect()
    }

    fn slot(&self, existing: &[RoutineExercise], plan: ExercisePlan) -> Result<RoutineExercise> {
        if existing.iter().any(|e| e.exercise_id == plan.exercise_id) {
            return Err(Error::Validation(format!(
                "exercise {} is already in this routine",
                plan.exercise_id
            )));
        }
        let order = plan
            .order
            .unwrap_or_else(|| next_order(existing.iter().map(|e| e.order)));
        Ok(RoutineExercise {
            exercise_id: plan.exercise_id,
            order,
            template_sets: self.template_sets(plan.sets)?,
        })
    }

    pub fn create(&self, owner_id: UserId, new_routine: NewRoutine) -> Result<Routine> {
        self.validator.title("title", &new_routine.title)?;
        user::require_owner(&*self.store, owner_id)?;

        let mut exercises = Vec::with_capacity(new_routine.exercises.len());
        for plan in new_routine.exercises {
            let slot = self.slot(&exercises, plan)?;
            exercises.push(slot);
        }

        let now = Utc::now();
        let routine = Routine {
            id: Uuid::new_v4(),
            owner_id,
            title: new_routine.title,
            description: new_routine.description,
            exercises,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_one(&routine)?;
        if let Err(e) = user::link(&*self.store, owner_id, routine.id, user_routines) {
            self.store.delete_one::<Routine>(&Filter::by_id(routine.id))?;
            return Err(e);
        }
        tracing::info!("Created routine {} for {}", routine.id, owner_id);
        Ok(routine)
    }

    pub fn get(&self, owner_id: UserId, routine_id: RoutineId) -> Result<Routine> {
        self.store
            .find_one(&Filter::by_id(routine_id).owned_by(owner_id))?
            .ok_or(Error::NotFound {
                kind: Routine::COLLECTION,
                id: routine_id,
            })
    }

    pub fn list(&self, owner_id: UserId) -> Result<Vec<Routine>> {
        self.store.find_all(&Filter::by_owner(owner_id))
    }

    pub fn update(
        &self,
        owner_id: UserId,
        routine_id: RoutineId,
        expected: Version,
        patch: RoutinePatch,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        if let Some(title) = &patch.title {
            self.validator.title("title", title)?;
        }
        version_gate::update::<_, Routine, _>(
            &*self.store,
            Target::owned(routine_id, owner_id),
            expected,
            patch,
        )
    }

    /// Append an exercise slot; the order is computed against the exact
    /// version being replaced
    pub fn add_exercise(
        &self,
        owner_id: UserId,
        routine_id: RoutineId,
        expected: Version,
        plan: ExercisePlan,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        for set in &plan.sets {
            self.validator.set_values(set.weight, set.reps)?;
        }

        version_gate::update_with::<_, Routine, _>(
            &*self.store,
            Target::owned(routine_id, owner_id),
            expected,
            |routine| {
                let slot = self.slot(&routine.exercises, plan)?;
                routine.exercises.push(slot);
                Ok(())
            },
        )
    }

    /// Replace the planned sets of one embedded exercise, leaving siblings
    /// untouched
    pub fn update_exercise(
        &self,
        owner_id: UserId,
        routine_id: RoutineId,
        exercise_id: ExerciseId,
        expected: Version,
        sets: Vec<SetPlan>,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        let template_sets = self.template_sets(sets)?;

        version_gate::update_with::<_, Routine, _>(
            &*self.store,
            Target::owned(routine_id, owner_id).exercise(exercise_id),
            expected,
            |routine| {
                if let Some(slot) = routine
                    .exercises
                    .iter_mut()
                    .find(|e| e.exercise_id == exercise_id)
                {
                    slot.template_sets = template_sets;
                }
                Ok(())
            },
        )
    }

    pub fn remove_exercise(
        &self,
        owner_id: UserId,
        routine_id: RoutineId,
        exercise_id: ExerciseId,
        expected: Version,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        version_gate::update_with::<_, Routine, _>(
            &*self.store,
            Target::owned(routine_id, owner_id).exercise(exercise_id),
            expected,
            |routine| {
                routine.exercises.retain(|e| e.exercise_id != exercise_id);
                Ok(())
            },
        )
    }

    /// Delete the routine, then pull its id from the owner's list.
    ///
    /// The two writes are not atomic: if the second fails the routine is
    /// already gone and the owner keeps a dangling id.
    pub fn delete(&self, owner_id: UserId, routine_id: RoutineId) -> Result<()> {
        let filter = Filter::by_id(routine_id).owned_by(owner_id);
        if self.store.delete_one::<Routine>(&filter)? == 0 {
            return Err(Error::NotFound {
                kind: Routine::COLLECTION,
                id: routine_id,
            });
        }
        tracing::info!("Deleted routine {}", routine_id);

        user::unlink(&*self.store, owner_id, routine_id, user_routines).map_err(|e| {
            tracing::warn!(
                "Routine {} deleted but owner {} still references it: {}",
                routine_id,
                owner_id,
                e
            );
            Error::Store(format!(
                "routine {} deleted but unlinking from user {} failed: {}",
                routine_id, owner_id, e
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ValidationConfig;
    use crate::store::MemoryStore;
    use crate::user::tests as users;

    struct Fixture {
        store: Arc<MemoryStore>,
        routines: RoutineEditor<MemoryStore>,
        owner: UserId,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let owner = users::editor(store.clone())
            .register(users::new_user("ana"))
            .unwrap()
            .id;
        let routines = RoutineEditor::new(store.clone(), Validator::new(ValidationConfig::default()));
        Fixture {
            store,
            routines,
            owner,
        }
    }

    fn plan(n: u128) -> ExercisePlan {
        ExercisePlan {
            exercise_id: Uuid::from_u128(n),
            order: None,
            sets: vec![],
        }
    }

    fn new_routine(title: &str) -> NewRoutine {
        NewRoutine {
            title: title.into(),
            ..NewRoutine::default()
        }
    }

    #[test]
    fn test_create_reads_back_at_version_one() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Push")).unwrap();

        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        assert_eq!(loaded.version, Version::INITIAL);
        assert!(loaded.created_at.timestamp() > 0);
        assert!(loaded.updated_at.timestamp() > 0);

        let owner: User = f.store.find_one(&Filter::by_id(f.owner)).unwrap().unwrap();
        assert_eq!(owner.routine_ids, vec![routine.id]);
        assert_eq!(owner.version, Version::INITIAL);
    }

    #[test]
    fn test_blank_title_rejected() {
        let f = fixture();
        assert!(matches!(
            f.routines.create(f.owner, new_routine("  ")),
            Err(Error::Validation(_))
        ));
    }

    #[test]
    fn test_orders_append_and_survive_gaps() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Legs")).unwrap();

        let mut version = routine.version;
        for n in 1..=3 {
            version = f
                .routines
                .add_exercise(f.owner, routine.id, version, plan(n))
                .unwrap();
        }
        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        let orders: Vec<u32> = loaded.exercises.iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(loaded.version, Version::new(4));

        version = f
            .routines
            .remove_exercise(f.owner, routine.id, Uuid::from_u128(2), version)
            .unwrap();
        f.routines
            .add_exercise(f.owner, routine.id, version, plan(4))
            .unwrap();

        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        let orders: Vec<u32> = loaded.exercises.iter().map(|e| e.order).collect();
        assert_eq!(orders, vec![0, 2, 3]);
    }

    #[test]
    fn test_explicit_order_and_set_numbering() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Pull")).unwrap();

        let with_sets = ExercisePlan {
            exercise_id: Uuid::from_u128(1),
            order: Some(10),
            sets: vec![
                SetPlan { weight: 60.0, reps: 8, set_number: None },
                SetPlan { weight: 60.0, reps: 8, set_number: None },
                SetPlan { weight: 50.0, reps: 12, set_number: Some(7) },
            ],
        };
        f.routines
            .add_exercise(f.owner, routine.id, routine.version, with_sets)
            .unwrap();

        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        let slot = &loaded.exercises[0];
        assert_eq!(slot.order, 10);
        let numbers: Vec<u32> = slot.template_sets.iter().map(|s| s.set_number).collect();
        assert_eq!(numbers, vec![1, 2, 7]);
    }

    #[test]
    fn test_duplicate_exercise_rejected_without_bump() {
        let f = fixture();
        let routine = f
            .routines
            .create(
                f.owner,
                NewRoutine {
                    exercises: vec![plan(1)],
                    ..new_routine("Arms")
                },
            )
            .unwrap();

        let result = f
            .routines
            .add_exercise(f.owner, routine.id, routine.version, plan(1));
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(
            f.routines.get(f.owner, routine.id).unwrap().version,
            Version::INITIAL
        );
    }

    #[test]
    fn test_update_exercise_leaves_siblings_alone() {
        let f = fixture();
        let routine = f
            .routines
            .create(
                f.owner,
                NewRoutine {
                    exercises: vec![
                        ExercisePlan {
                            sets: vec![SetPlan { weight: 20.0, reps: 10, set_number: None }],
                            ..plan(1)
                        },
                        plan(2),
                    ],
                    ..new_routine("Upper")
                },
            )
            .unwrap();

        let sets = vec![SetPlan { weight: 40.0, reps: 5, set_number: None }];
        let next = f
            .routines
            .update_exercise(f.owner, routine.id, Uuid::from_u128(2), routine.version, sets)
            .unwrap();
        assert_eq!(next, Version::new(2));

        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        assert_eq!(loaded.exercises[0].template_sets[0].weight, 20.0);
        assert_eq!(loaded.exercises[1].template_sets[0].weight, 40.0);
        assert_eq!(loaded.exercises[1].template_sets[0].set_number, 1);
    }

    #[test]
    fn test_nested_operations_on_missing_exercise() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Core")).unwrap();

        assert!(matches!(
            f.routines
                .remove_exercise(f.owner, routine.id, Uuid::from_u128(5), routine.version),
            Err(Error::NotFound { kind: "exercise", .. })
        ));
        assert!(matches!(
            f.routines
                .update_exercise(f.owner, routine.id, Uuid::from_u128(5), routine.version, vec![]),
            Err(Error::NotFound { kind: "exercise", .. })
        ));
    }

    #[test]
    fn test_patch_is_version_gated() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Old")).unwrap();
        let patch = RoutinePatch {
            title: Some("New".into()),
            description: Some("Heavy day".into()),
        };

        f.routines
            .update(f.owner, routine.id, routine.version, patch.clone())
            .unwrap();
        let loaded = f.routines.get(f.owner, routine.id).unwrap();
        assert_eq!(loaded.title, "New");
        assert_eq!(loaded.description.as_deref(), Some("Heavy day"));

        assert!(matches!(
            f.routines.update(f.owner, routine.id, routine.version, patch),
            Err(Error::VersionConflict { .. })
        ));
    }

    #[test]
    fn test_foreign_owner_cannot_read_or_delete() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Mine")).unwrap();
        let stranger = Uuid::new_v4();

        assert!(matches!(
            f.routines.get(stranger, routine.id),
            Err(Error::NotFound { .. })
        ));
        assert!(matches!(
            f.routines.delete(stranger, routine.id),
            Err(Error::NotFound { .. })
        ));
        assert!(f.routines.get(f.owner, routine.id).is_ok());
    }

    #[test]
    fn test_delete_unlinks_then_reports_not_found() {
        let f = fixture();
        let keep = f.routines.create(f.owner, new_routine("Keep")).unwrap();
        let gone = f.routines.create(f.owner, new_routine("Gone")).unwrap();

        f.routines.delete(f.owner, gone.id).unwrap();

        assert!(matches!(
            f.routines.get(f.owner, gone.id),
            Err(Error::NotFound { .. })
        ));
        let owner: User = f.store.find_one(&Filter::by_id(f.owner)).unwrap().unwrap();
        assert_eq!(owner.routine_ids, vec![keep.id]);

        assert!(matches!(
            f.routines.delete(f.owner, gone.id),
            Err(Error::NotFound { kind: "routine", .. })
        ));
    }

    #[test]
    fn test_create_for_unknown_user_not_found() {
        let f = fixture();
        assert!(matches!(
            f.routines.create(Uuid::new_v4(), new_routine("Ghost")),
            Err(Error::NotFound { kind: "user", .. })
        ));
        assert!(f.store.find_all::<Routine>(&Filter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_link_to_deleted_owner_fails() {
        let f = fixture();
        let routine = f.routines.create(f.owner, new_routine("Orphan")).unwrap();
        users::editor(f.store.clone()).delete(f.owner).unwrap();

        assert!(matches!(
            user::link(&*f.store, f.owner, routine.id, user_routines),
            Err(Error::NotFound { kind: "user", .. })
        ));
    }

    #[test]
    fn test_list_is_owner_scoped() {
        let f = fixture();
        f.routines.create(f.owner, new_routine("A")).unwrap();
        f.routines.create(f.owner, new_routine("B")).unwrap();
        let other = users::editor(f.store.clone())
            .register(users::new_user("bea"))
            .unwrap()
            .id;
        f.routines.create(other, new_routine("C")).unwrap();

        assert_eq!(f.routines.list(f.owner).unwrap().len(), 2);
    }
}
