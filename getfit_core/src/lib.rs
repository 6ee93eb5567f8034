#![forbid(unsafe_code)]

//! Core domain model and aggregate engine for GetFit.
//!
//! This crate provides:
//! - Domain types (users, exercises, routines, workout sessions)
//! - Aggregate store abstraction (in-memory and file-backed)
//! - Version-gated updates with optimistic concurrency control
//! - Editors for each aggregate kind
//! - CSV export of completed sessions

pub mod types;
pub mod error;
pub mod config;
pub mod logging;
pub mod validation;
pub mod store;
pub mod version_gate;
pub mod user;
pub mod exercise;
pub mod routine;
pub mod workout;
pub mod export;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use config::Config;
pub use store::{AggregateStore, FileStore, MemoryStore};
pub use validation::Validator;
pub use user::UserEditor;
pub use exercise::ExerciseEditor;
pub use routine::RoutineEditor;
pub use workout::{compute_metrics, WorkoutManager};

use std::sync::Arc;

/// Every editor wired to one shared store
pub struct Services<S> {
    pub users: UserEditor<S>,
    pub exercises: ExerciseEditor<S>,
    pub routines: RoutineEditor<S>,
    pub workouts: WorkoutManager<S>,
}

impl<S: AggregateStore> Services<S> {
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let validator = Validator::new(config.validation.clone());
        Self {
            users: UserEditor::new(store.clone(), validator.clone(), config.security.bcrypt_cost),
            exercises: ExerciseEditor::new(store.clone(), validator.clone()),
            routines: RoutineEditor::new(store.clone(), validator.clone()),
            workouts: WorkoutManager::new(store, validator),
        }
    }
}

impl Services<FileStore> {
    /// Open the file store under the configured data directory
    pub fn open(config: &Config) -> Result<Self> {
        let root = config.data.data_dir.join("store");
        let store = FileStore::open_with_timeout(root, config.store.operation_timeout())?;
        Ok(Self::new(Arc::new(store), config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_services_share_one_store() {
        let temp_dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.data.data_dir = temp_dir.path().to_path_buf();
        config.security.bcrypt_cost = crate::config::MIN_BCRYPT_COST;

        let services = Services::open(&config).unwrap();
        let user = services
            .users
            .register(NewUser {
                username: "ana".into(),
                email: "ana@example.com".into(),
                password: "correct horse".into(),
            })
            .unwrap();
        let routine = services
            .routines
            .create(
                user.id,
                NewRoutine {
                    title: "Push".into(),
                    ..NewRoutine::default()
                },
            )
            .unwrap();

        let reopened = Services::open(&config).unwrap();
        assert_eq!(reopened.users.get(user.id).unwrap().routine_ids, vec![routine.id]);
        assert!(temp_dir.path().join("store").join("routine.json").exists());
    }
}
