//! Workout session lifecycle.
//!
//! Sessions move from `in_progress` to `completed` and never back. A session
//! created from a routine takes a snapshot of the routine's exercise list;
//! later routine edits do not reach it.
//!
//! Every mutation, completion included, is version-gated. Deletion is
//! owner-scoped only.

use crate::routine::next_order;
use crate::store::{AggregateStore, Document, Filter};
use crate::user;
use crate::validation::Validator;
use crate::version_gate::{self, Patch, Target};
use crate::{
    CompletedSet, Error, ExerciseId, NewWorkout, Result, Routine, RoutineId, SessionExercise,
    SessionId, SessionMetrics, SessionPatch, SessionSet, SessionStatus, UserId, Version,
    WorkoutSession,
};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

impl Document for WorkoutSession {
    const COLLECTION: &'static str = "workout_session";

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

impl Patch<WorkoutSession> for SessionPatch {
    fn is_empty(&self) -> bool {
        self.title.is_none() && self.description.is_none() && self.notes.is_none()
    }

    fn apply(self, session: &mut WorkoutSession) {
        if let Some(title) = self.title {
            session.title = title;
        }
        if self.description.is_some() {
            session.description = self.description;
        }
        if self.notes.is_some() {
            session.notes = self.notes;
        }
    }
}

impl WorkoutSession {
    pub fn is_completed(&self) -> bool {
        self.status == SessionStatus::Completed
    }

    fn ensure_in_progress(&self) -> Result<()> {
        if self.is_completed() {
            return Err(Error::InvalidState(format!(
                "workout session {} is already completed",
                self.id
            )));
        }
        Ok(())
    }
}

/// Totals over every performed set, with duration measured up to `now`
pub fn compute_metrics(session: &WorkoutSession, now: DateTime<Utc>) -> SessionMetrics {
    let mut metrics = SessionMetrics::default();
    for set in session.exercises.iter().flat_map(|e| &e.completed_sets) {
        metrics.total_weight += set.weight * f64::from(set.reps);
        metrics.total_reps += u64::from(set.reps);
        metrics.total_sets += 1;
    }
    let elapsed = now.signed_duration_since(session.start_time);
    metrics.duration_minutes = (elapsed.num_milliseconds().max(0) as f64) / 60_000.0;
    metrics
}

pub struct WorkoutManager<S> {
    store: Arc<S>,
    validator: Validator,
}

impl<S: AggregateStore> WorkoutManager<S> {
    pub fn new(store: Arc<S>, validator: Validator) -> Self {
        Self { store, validator }
    }

    fn insert(&self, session: WorkoutSession) -> Result<WorkoutSession> {
        self.store.insert_one(&session)?;
        tracing::info!(
            "Started workout session {} ({} exercises) for {}",
            session.id,
            session.exercises.len(),
            session.owner_id
        );
        Ok(session)
    }

    fn blank(owner_id: UserId, title: String, description: Option<String>) -> WorkoutSession {
        let now = Utc::now();
        WorkoutSession {
            id: Uuid::new_v4(),
            owner_id,
            routine_id: None,
            title,
            description,
            status: SessionStatus::InProgress,
            start_time: now,
            end_time: None,
            exercises: Vec::new(),
            metrics: None,
            notes: None,
            version: Version::INITIAL,
            created_at: now,
            updated_at: now,
        }
    }

    /// Start an empty session
    pub fn create(&self, owner_id: UserId, new_workout: NewWorkout) -> Result<WorkoutSession> {
        self.validator.title("title", &new_workout.title)?;
        user::require_owner(&*self.store, owner_id)?;
        let mut session = Self::blank(owner_id, new_workout.title, new_workout.description);
        session.notes = new_workout.notes;
        self.insert(session)
    }

    /// Start a session from a snapshot of one of the owner's routines.
    ///
    /// Exercises are copied in routine order with no performed sets; planned
    /// sets stay with the routine.
    pub fn create_from_routine(&self, owner_id: UserId, routine_id: RoutineId) -> Result<WorkoutSession> {
        let routine: Routine = self
            .store
            .find_one(&Filter::by_id(routine_id).owned_by(owner_id))?
            .ok_or(Error::NotFound {
                kind: Routine::COLLECTION,
                id: routine_id,
            })?;

        let mut slots = routine.exercises;
        slots.sort_by_key(|e| e.order);

        let mut session = Self::blank(owner_id, routine.title, routine.description);
        session.routine_id = Some(routine_id);
        session.exercises = slots
            .into_iter()
            .map(|e| SessionExercise {
                exercise_id: e.exercise_id,
                order: e.order,
                completed_sets: Vec::new(),
            })
            .collect();
        self.insert(session)
    }

    pub fn get(&self, owner_id: UserId, session_id: SessionId) -> Result<WorkoutSession> {
        self.store
            .find_one(&Filter::by_id(session_id).owned_by(owner_id))?
            .ok_or(Error::NotFound {
                kind: WorkoutSession::COLLECTION,
                id: session_id,
            })
    }

    /// Owner's sessions, newest start first
    pub fn list(&self, owner_id: UserId) -> Result<Vec<WorkoutSession>> {
        let mut sessions: Vec<WorkoutSession> = self.store.find_all(&Filter::by_owner(owner_id))?;
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(sessions)
    }

    pub fn update(
        &self,
        owner_id: UserId,
        session_id: SessionId,
        expected: Version,
        patch: SessionPatch,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        if let Some(title) = &patch.title {
            self.validator.title("title", title)?;
        }
        version_gate::update::<_, WorkoutSession, _>(
            &*self.store,
            Target::owned(session_id, owner_id),
            expected,
            patch,
        )
    }

    /// Append an exercise to an in-progress session
    pub fn add_exercise(
        &self,
        owner_id: UserId,
        session_id: SessionId,
        expected: Version,
        exercise_id: ExerciseId,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        version_gate::update_with::<_, WorkoutSession, _>(
            &*self.store,
            Target::owned(session_id, owner_id),
            expected,
            |session| {
                session.ensure_in_progress()?;
                if session.has_exercise(exercise_id) {
                    return Err(Error::Validation(format!(
                        "exercise {} is already in this session",
                        exercise_id
                    )));
                }
                let order = next_order(session.exercises.iter().map(|e| e.order));
                session.exercises.push(SessionExercise {
                    exercise_id,
                    order,
                    completed_sets: Vec::new(),
                });
                Ok(())
            },
        )
    }

    /// Record a performed set against one exercise of the session
    pub fn record_set(
        &self,
        owner_id: UserId,
        session_id: SessionId,
        exercise_id: ExerciseId,
        expected: Version,
        set: CompletedSet,
    ) -> Result<Version> {
        self.validator.expected_version(expected)?;
        self.validator.set_values(set.weight, set.reps)?;

        version_gate::update_with::<_, WorkoutSession, _>(
            &*self.store,
            Target::owned(session_id, owner_id).exercise(exercise_id),
            expected,
            |session| {
                session.ensure_in_progress()?;
                let Some(slot) = session
                    .exercises
                    .iter_mut()
                    .find(|e| e.exercise_id == exercise_id)
                else {
                    return Err(Error::NotFound {
                        kind: "exercise",
                        id: exercise_id,
                    });
                };
                let set_number = set
                    .set_number
                    .unwrap_or(slot.completed_sets.len() as u32 + 1);
                slot.completed_sets.push(SessionSet {
                    weight: set.weight,
                    reps: set.reps,
                    set_number,
                    completed_at: set.completed_at.unwrap_or_else(Utc::now),
                });
                Ok(())
            },
        )
    }

    /// Finish the session and persist its metrics.
    ///
    /// Metrics are computed from the exact state the write replaces, so a set
    /// recorded concurrently either lands first and is counted or loses the
    /// version race.
    pub fn complete(
        &self,
        owner_id: UserId,
        session_id: SessionId,
        expected: Version,
    ) -> Result<SessionMetrics> {
        self.validator.expected_version(expected)?;

        let mut computed = None;
        version_gate::update_with::<_, WorkoutSession, _>(
            &*self.store,
            Target::owned(session_id, owner_id),
            expected,
            |session| {
                session.ensure_in_progress()?;
                let now = Utc::now();
                let metrics = compute_metrics(session, now);
                session.status = SessionStatus::Completed;
                session.end_time = Some(now);
                session.metrics = Some(metrics.clone());
                computed = Some(metrics);
                Ok(())
            },
        )?;

        let metrics = computed.ok_or_else(|| {
            Error::Store(format!("completion of session {} left no metrics", session_id))
        })?;
        tracing::info!(
            "Completed workout session {}: {} sets, {} reps, {} total weight",
            session_id,
            metrics.total_sets,
            metrics.total_reps,
            metrics.total_weight
        );
        Ok(metrics)
    }

    pub fn delete(&self, owner_id: UserId, session_id: SessionId) -> Result<()> {
        let filter = Filter::by_id(session_id).owned_by(owner_id);
        if self.store.delete_one::<WorkoutSession>(&filter)? == 0 {
            return Err(Error::NotFound {
                kind: WorkoutSession::COLLECTION,
                id: session_id,
            });
        }
        tracing::info!("Deleted workout session {}", session_id);
        Ok(())
    }
}
