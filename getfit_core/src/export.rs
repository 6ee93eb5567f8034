//! CSV export of completed workout sessions.
//!
//! In-progress sessions are skipped. File exports replace the target
//! atomically: rows go to a temp file next to it, which is synced and then
//! renamed over the destination.

use crate::{Error, Result, WorkoutSession};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// A row in the CSV output
#[derive(Debug, serde::Serialize)]
struct CsvRow {
    id: String,
    title: String,
    routine_id: Option<String>,
    start_time: String,
    end_time: Option<String>,
    exercises: usize,
    total_sets: u64,
    total_reps: u64,
    total_weight: f64,
    duration_minutes: f64,
}

impl From<&WorkoutSession> for CsvRow {
    fn from(session: &WorkoutSession) -> Self {
        let metrics = session.metrics.clone().unwrap_or_default();
        CsvRow {
            id: session.id.to_string(),
            title: session.title.clone(),
            routine_id: session.routine_id.map(|id| id.to_string()),
            start_time: session.start_time.to_rfc3339(),
            end_time: session.end_time.map(|t| t.to_rfc3339()),
            exercises: session.exercises.len(),
            total_sets: metrics.total_sets,
            total_reps: metrics.total_reps,
            total_weight: metrics.total_weight,
            duration_minutes: (metrics.duration_minutes * 100.0).round() / 100.0,
        }
    }
}

/// Write completed sessions as CSV (with headers) to `writer`
pub fn write_completed<W: Write>(sessions: &[WorkoutSession], writer: W) -> Result<usize> {
    let mut writer = csv::Writer::from_writer(writer);
    let mut count = 0;
    for session in sessions.iter().filter(|s| s.is_completed()) {
        writer.serialize(CsvRow::from(session))?;
        count += 1;
    }
    writer.flush()?;
    Ok(count)
}

/// Export completed sessions to `path`, replacing any previous export
pub fn export_completed(sessions: &[WorkoutSession], path: &Path) -> Result<usize> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)?;

    let temp = NamedTempFile::new_in(dir)?;
    let count = write_completed(sessions, temp.as_file())?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;

    tracing::info!("Exported {} completed sessions to {:?}", count, path);
    Ok(count)
}
