//! Custom exercise editor.

use crate::store::{AggregateStore, Document, Filter};
use crate::user;
use crate::validation::Validator;
use crate::version_gate::{self, Patch, Target};
use crate::{Error, Exercise, ExerciseId, ExercisePatch, NewExercise, Result, User, UserId, Version};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

impl Document for Exercise {
    const COLLECTION: &'static str = "exercise";

    fn id(&self) -> Uuid {
        self.id
    }

    fn owner_id(&self) -> Option<Uuid> {
        Some(self.owner_id)
    }

    fn version(&self) -> Version {
        self.version
    }

    fn touch(&mut self, version: Version, now: DateTime<Utc>) {
        self.version = version;
        self.updated_at = now;
    }
}

impl Patch<Exercise> for ExercisePatch {
    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.category.is_none()
            && self.force.is_none()
            && self.level.is_none()
            && self.mechanic.is_none()
            && self.equipment.is_none()
            && self.primary_muscles.is_none()
            && self.secondary_muscles.is_none()
            && self.instructions.is_none()
    }

    fn apply(self, exercise: &mut Exercise) {
        if let Some(name) = self.name {
            exercise.name = name;
        }
        if let Some(category) = self.category {
            exercise.category = category;
        }
        if self.force.is_some() {
            exercise.force = self.force;
        }
        if self.level.is_some() {
            exercise.level = self.level;
        }
        if self.mechanic.is_some() {
            exercise.mechanic = self.mechanic;
        }
        if self.equipment.is_some() {
            exercise.equipment = self.equipment;
        }
        if let Some(muscles) = self.primary_muscles {
            exercise.primary_muscles = muscles;
        }
        if let Some(muscles) = self.secondary_muscles {
            exercise.secondary_muscles = muscles;
        }
        if let Some(instructions) = self.instructions {
            exercise.instructions = instructions;
        }
    }
}

fn user_exercises(user: &mut User) -> &mut Vec<Uuid> {
    &mut user.custom_exercise_ids
}

pub struct ExerciseEditor<S> {
    store: Arc<S>,
    validator: Validator,
}

impl<S: AggregateStore> ExerciseEditor<S> {
    pub fn new(store: Arc<S>, validator: Validator) -> Self {
        Self { store, validator }
    }

    pub fn create(&self, owner_id: UserId, new_exercise: NewExercise) -> Result<Exercise> {
        self.validator.title("name", &new_exercise.name)?;
        user::require_owner(&*self.store, owner_id)?;

        let now = Utc::now();
        let exercise = Exercise {
            id: Uuid::new_v4(),
            owner_id,
            name: new_exercise.name,
            force: new_exercise.force,
            level: new_exercise.level,
            mechanic: new_exercise.mechanic,
            equipment: new_exercise.equipment,
            primary_muscles: new_exercise.primary_muscles,
            secondary_muscles: new_exercise.secondary_muscles,
            instructions: new_exercise.instructions,
            category: new_exercise.category,
            is_custom: true,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_one(&exercise)?;
        if let Err(e) = user::link(&*self.store, owner_id, exercise.id, user_exercises) {
            self.store.delete_one::<Exercise>(&Filter::by_id(exercise.id))?;
            return Err(e);
        }
        tracing::info!("Created exercise {} ({}) for {}", exercise.name, exercise.id, owner_id);
        Ok(exercise)
    }

    pub fn get(&self, owner_id: UserId, exercise_id: ExerciseId) -> Result<Exercise> {
        self.store
            .find_one(&Filter::by_id(exercise_id).owned_by(owner_id))?
            .ok_or(Error::NotFound {
                kind: Exercise::COLLECTION,
                id: exercise_id,
            })
    }

    /// Owner's exercises sorted by name
    pub fn list(&self, owner_id: UserId) -> Result<Vec<Exercise>> {
        let mut exercises: Vec<Exercise> = self.store.find_all(&Filter::by_owner(owner_id))?;
        exercises.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        Ok(exercises)
    }

    pub fn update(
        &self,
        owner_id: UserId,
        exercise_id: ExerciseId,
        expected: Version,
        patch: ExercisePatch,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        if let Some(name) = &patch.name {
            self.validator.title("name", name)?;
        }
        version_gate::update::<_, Exercise, _>(
            &*self.store,
            Target::owned(exercise_id, owner_id),
            expected,
            patch,
        )
    }

    /// Delete the exercise, then pull its id from the owner's list.
    ///
    /// Routines and sessions referencing it keep the dangling id.
    pub fn delete(&self, owner_id: UserId, exercise_id: ExerciseId) -> Result<()> {
        let filter = Filter::by_id(exercise_id).owned_by(owner_id);
        if self.store.delete_one::<Exercise>(&filter)? == 0 {
            return Err(Error::NotFound {
                kind: Exercise::COLLECTION,
                id: exercise_id,
            });
        }
        tracing::info!("Deleted exercise {}", exercise_id);

        user::unlink(&*self.store, owner_id, exercise_id, user_exercises).map_err(|e| {
            tracing::warn!(
                "Exercise {} deleted but owner {} still references it: {}",
                exercise_id,
                owner_id,
                e
            );
            Error::Store(format!(
                "exercise {} deleted but unlinking from user {} failed: {}",
                exercise_id, owner_id, e
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

    fn setup() -> (Arc<MemoryStore>, ExerciseEditor<MemoryStore>, UserId) {
        let store = Arc::new(MemoryStore::new());
        let owner = users::editor(store.clone())
            .register(users::new_user("ana"))
            .unwrap()
            .id;
        let editor = ExerciseEditor::new(store.clone(), Validator::new(ValidationConfig::default()));
        (store, editor, owner)
    }

    fn named(name: &str) -> NewExercise {
        NewExercise {
            name: name.into(),
            category: "strength".into(),
            ..NewExercise::default()
        }
    }

    #[test]
    fn test_create_marks_custom_and_links_owner() {
        let (store, exercises, owner) = setup();
        let exercise = exercises.create(owner, named("Zercher Squat")).unwrap();

        assert!(exercise.is_custom);
        assert_eq!(exercise.version, Version::INITIAL);
        assert!(exercise.primary_muscles.is_empty());

        let user: User = store.find_one(&Filter::by_id(owner)).unwrap().unwrap();
        assert_eq!(user.custom_exercise_ids, vec![exercise.id]);
    }

    #[test]
    fn test_create_for_unknown_user_not_found() {
        let (store, exercises, _owner) = setup();
        assert!(matches!(
            exercises.create(Uuid::new_v4(), named("Ghost Row")),
            Err(Error::NotFound { kind: "user", .. })
        ));
        assert!(store.find_all::<Exercise>(&Filter::all()).unwrap().is_empty());
    }

    #[test]
    fn test_list_sorted_by_name() {
        let (_store, exercises, owner) = setup();
        exercises.create(owner, named("row")).unwrap();
        exercises.create(owner, named("Bench Press")).unwrap();
        exercises.create(owner, named("Deadlift")).unwrap();

        let names: Vec<String> = exercises
            .list(owner)
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["Bench Press", "Deadlift", "row"]);
    }

    #[test]
    fn test_patch_only_touches_listed_fields() {
        let (_store, exercises, owner) = setup();
        let exercise = exercises
            .create(
                owner,
                NewExercise {
                    equipment: Some("barbell".into()),
                    ..named("Press")
                },
            )
            .unwrap();

        let patch = ExercisePatch {
            primary_muscles: Some(vec!["shoulders".into()]),
            ..ExercisePatch::default()
        };
        let next = exercises
            .update(owner, exercise.id, exercise.version, patch)
            .unwrap();
        assert_eq!(next, Version::new(2));

        let loaded = exercises.get(owner, exercise.id).unwrap();
        assert_eq!(loaded.primary_muscles, vec!["shoulders"]);
        assert_eq!(loaded.equipment.as_deref(), Some("barbell"));
        assert_eq!(loaded.name, "Press");
    }

    #[test]
    fn test_stale_patch_conflicts() {
        let (_store, exercises, owner) = setup();
        let exercise = exercises.create(owner, named("Dip")).unwrap();
        let patch = ExercisePatch {
            level: Some("beginner".into()),
            ..ExercisePatch::default()
        };
        exercises
            .update(owner, exercise.id, exercise.version, patch.clone())
            .unwrap();

        let err = exercises
            .update(owner, exercise.id, exercise.version, patch)
            .unwrap_err();
        assert!(err.is_conflict());
    }

    #[test]
    fn test_delete_unlinks_owner() {
        let (store, exercises, owner) = setup();
        let exercise = exercises.create(owner, named("Curl")).unwrap();

        exercises.delete(owner, exercise.id).unwrap();

        let user: User = store.find_one(&Filter::by_id(owner)).unwrap().unwrap();
        assert!(user.custom_exercise_ids.is_empty());
        assert!(matches!(
            exercises.delete(owner, exercise.id),
            Err(Error::NotFound { kind: "exercise", .. })
        ));
    }
}
