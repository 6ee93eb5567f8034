//! Core domain types for GetFit.
//!
//! This module defines the aggregates stored as self-contained documents:
//! - Users (profile and credential material)
//! - Exercises (custom catalog entries)
//! - Routines (reusable workout templates)
//! - Workout sessions (logged workouts, optionally snapshotted from a routine)
//!
//! plus the inputs and typed field masks accepted by the editors.

use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type UserId = Uuid;
pub type ExerciseId = Uuid;
pub type RoutineId = Uuid;
pub type SessionId = Uuid;

// ============================================================================
// Versioning
// ============================================================================

/// Optimistic concurrency version of an aggregate.
///
/// Starts at 1 on creation and grows by exactly one per successful mutation.
/// Zero never appears on a stored document; as an expected version it means
/// the caller never read the aggregate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(u32);

impl Version {
    pub const INITIAL: Version = Version(1);

    pub fn new(raw: u32) -> Self {
        Version(raw)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    pub fn is_unset(self) -> bool {
        self.0 == 0
    }

    /// The version a successful write moves to
    pub fn next(self) -> Result<Self> {
        self.0.checked_add(1).map(Version).ok_or_else(|| {
            Error::InvalidState(format!("version {} cannot be incremented", self.0))
        })
    }
}

impl From<u32> for Version {
    fn from(raw: u32) -> Self {
        Version(raw)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// User
// ============================================================================

/// A registered user and the ids of the aggregates they own
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub age: Option<u8>,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub routine_ids: Vec<RoutineId>,
    #[serde(default)]
    pub custom_exercise_ids: Vec<ExerciseId>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Public view of a user without credential material
#[derive(Clone, Debug, Serialize)]
pub struct UserProfile {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub age: Option<u8>,
    pub title: String,
    pub bio: String,
    pub routine_ids: Vec<RoutineId>,
    pub custom_exercise_ids: Vec<ExerciseId>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            age: self.age,
            title: self.title.clone(),
            bio: self.bio.clone(),
            routine_ids: self.routine_ids.clone(),
            custom_exercise_ids: self.custom_exercise_ids.clone(),
            version: self.version,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Registration input
#[derive(Clone, Debug, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
}

/// Mutable profile fields; `None` leaves the stored value untouched
#[derive(Clone, Debug, Default, Deserialize)]
pub struct UserPatch {
    pub username: Option<String>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub age: Option<u8>,
    pub title: Option<String>,
    pub bio: Option<String>,
}

// ============================================================================
// Exercise
// ============================================================================

/// A catalog exercise created by a user
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Exercise {
    pub id: ExerciseId,
    pub owner_id: UserId,
    pub name: String,
    pub force: Option<String>,
    pub level: Option<String>,
    pub mechanic: Option<String>,
    pub equipment: Option<String>,
    #[serde(default)]
    pub primary_muscles: Vec<String>,
    #[serde(default)]
    pub secondary_muscles: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
    pub category: String,
    pub is_custom: bool,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for a new custom exercise
#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewExercise {
    pub name: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub force: Option<String>,
    #[serde(default)]
    pub level: Option<String>,
    #[serde(default)]
    pub mechanic: Option<String>,
    #[serde(default)]
    pub equipment: Option<String>,
    #[serde(default)]
    pub primary_muscles: Vec<String>,
    #[serde(default)]
    pub secondary_muscles: Vec<String>,
    #[serde(default)]
    pub instructions: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ExercisePatch {
    pub name: Option<String>,
    pub category: Option<String>,
    pub force: Option<String>,
    pub level: Option<String>,
    pub mechanic: Option<String>,
    pub equipment: Option<String>,
    pub primary_muscles: Option<Vec<String>>,
    pub secondary_muscles: Option<Vec<String>>,
    pub instructions: Option<Vec<String>>,
}

// ============================================================================
// Routine
// ============================================================================

/// A planned set inside a routine
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct TemplateSet {
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
}

/// Caller-supplied planned set; a missing set number is filled from position
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct SetPlan {
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub set_number: Option<u32>,
}

/// An exercise slot inside a routine, referencing the catalog by id only
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct RoutineExercise {
    pub exercise_id: ExerciseId,
    pub order: u32,
    #[serde(default)]
    pub template_sets: Vec<TemplateSet>,
}

/// Caller-supplied routine exercise; a missing order is appended after the last
#[derive(Clone, Debug, Deserialize)]
pub struct ExercisePlan {
    pub exercise_id: ExerciseId,
    #[serde(default)]
    pub order: Option<u32>,
    #[serde(default)]
    pub sets: Vec<SetPlan>,
}

/// A reusable workout template
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Routine {
    pub id: RoutineId,
    pub owner_id: UserId,
    pub title: String,
    pub description: Option<String>,
    #[serde(default)]
    pub exercises: Vec<RoutineExercise>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewRoutine {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub exercises: Vec<ExercisePlan>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct RoutinePatch {
    pub title: Option<String>,
    pub description: Option<String>,
}

// ============================================================================
// Workout Session
// ============================================================================

/// Lifecycle of a workout session; `Completed` is terminal
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    InProgress,
    Completed,
}

/// A set actually performed during a session
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionSet {
    pub weight: f64,
    pub reps: u32,
    pub set_number: u32,
    pub completed_at: DateTime<Utc>,
}

/// Caller-supplied performed set
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CompletedSet {
    pub weight: f64,
    pub reps: u32,
    #[serde(default)]
    pub set_number: Option<u32>,
    #[serde(default)]
    pub completed_at: Option<DateTime<Utc>>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct SessionExercise {
    pub exercise_id: ExerciseId,
    pub order: u32,
    #[serde(default)]
    pub completed_sets: Vec<SessionSet>,
}

/// Summary computed when a session is completed
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct SessionMetrics {
    pub total_weight: f64,
    pub total_reps: u64,
    pub total_sets: u64,
    pub duration_minutes: f64,
}

/// A logged workout
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkoutSession {
    pub id: SessionId,
    pub owner_id: UserId,
    /// Provenance only; the exercise list is a snapshot taken at creation
    pub routine_id: Option<RoutineId>,
    pub title: String,
    pub description: Option<String>,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub exercises: Vec<SessionExercise>,
    pub metrics: Option<SessionMetrics>,
    pub notes: Option<String>,
    pub version: Version,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct NewWorkout {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct SessionPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub notes: Option<String>,
}
