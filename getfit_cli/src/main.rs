use clap::{Args, Parser, Subcommand};
use getfit_core::*;
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "getfit")]
#[command(about = "Fitness tracking with versioned routines and workout sessions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Read configuration from this file instead of the default location
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Register and manage users
    User {
        #[command(subcommand)]
        command: UserCommand,
    },

    /// Manage custom exercises
    Exercise {
        #[command(subcommand)]
        command: ExerciseCommand,
    },

    /// Manage routine templates
    Routine {
        #[command(subcommand)]
        command: RoutineCommand,
    },

    /// Log workout sessions
    Workout {
        #[command(subcommand)]
        command: WorkoutCommand,
    },
}

/// Owner and aggregate addressed by a command
#[derive(Args)]
struct Addr {
    /// Owning user id
    #[arg(long)]
    user: Uuid,

    /// Aggregate id
    #[arg(long)]
    id: Uuid,
}

/// Owner, aggregate and the version last read by the caller
#[derive(Args)]
struct Gated {
    #[command(flatten)]
    addr: Addr,

    /// Version from the caller's last read
    #[arg(long)]
    expected_version: u32,
}

impl Gated {
    fn version(&self) -> Version {
        Version::new(self.expected_version)
    }
}

#[derive(Subcommand)]
enum UserCommand {
    Register {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
    },
    Show {
        #[arg(long)]
        user: Uuid,
    },
    Update {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        expected_version: u32,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        age: Option<u8>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        bio: Option<String>,
    },
    Password {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        expected_version: u32,
        #[arg(long)]
        password: String,
    },
    Delete {
        #[arg(long)]
        user: Uuid,
    },
}

#[derive(Subcommand)]
enum ExerciseCommand {
    Create {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "strength")]
        category: String,
        #[arg(long)]
        equipment: Option<String>,
        #[arg(long)]
        force: Option<String>,
        #[arg(long)]
        level: Option<String>,
        #[arg(long)]
        mechanic: Option<String>,
        /// Repeat for several muscles
        #[arg(long = "primary-muscle")]
        primary_muscles: Vec<String>,
        #[arg(long = "secondary-muscle")]
        secondary_muscles: Vec<String>,
        #[arg(long = "instruction")]
        instructions: Vec<String>,
    },
    List {
        #[arg(long)]
        user: Uuid,
    },
    Show {
        #[command(flatten)]
        addr: Addr,
    },
    Update {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        equipment: Option<String>,
        #[arg(long)]
        level: Option<String>,
    },
    Delete {
        #[command(flatten)]
        addr: Addr,
    },
}

#[derive(Subcommand)]
enum RoutineCommand {
    Create {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        /// Exercise ids in order; repeat for several
        #[arg(long = "exercise")]
        exercises: Vec<Uuid>,
    },
    List {
        #[arg(long)]
        user: Uuid,
    },
    Show {
        #[command(flatten)]
        addr: Addr,
    },
    Update {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    AddExercise {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        exercise: Uuid,
        /// Explicit position; defaults to after the last exercise
        #[arg(long)]
        order: Option<u32>,
        /// Planned set as WEIGHTxREPS, e.g. 60x8; repeat for several
        #[arg(long = "set", value_parser = parse_set)]
        sets: Vec<SetPlan>,
    },
    UpdateExercise {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        exercise: Uuid,
        #[arg(long = "set", value_parser = parse_set)]
        sets: Vec<SetPlan>,
    },
    RemoveExercise {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        exercise: Uuid,
    },
    Delete {
        #[command(flatten)]
        addr: Addr,
    },
}

#[derive(Subcommand)]
enum WorkoutCommand {
    /// Start an empty session
    Start {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        notes: Option<String>,
    },
    /// Start a session from a routine snapshot
    FromRoutine {
        #[arg(long)]
        user: Uuid,
        #[arg(long)]
        routine: Uuid,
    },
    List {
        #[arg(long)]
        user: Uuid,
    },
    Show {
        #[command(flatten)]
        addr: Addr,
    },
    AddExercise {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        exercise: Uuid,
    },
    AddSet {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        exercise: Uuid,
        #[arg(long)]
        weight: f64,
        #[arg(long)]
        reps: u32,
        #[arg(long)]
        set_number: Option<u32>,
    },
    Notes {
        #[command(flatten)]
        gated: Gated,
        #[arg(long)]
        notes: Option<String>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Complete {
        #[command(flatten)]
        gated: Gated,
    },
    Delete {
        #[command(flatten)]
        addr: Addr,
    },
    /// Export completed sessions as CSV
    Export {
        #[arg(long)]
        user: Uuid,
        /// Write to a file instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Result of a version-gated write
#[derive(Serialize)]
struct Written {
    id: Uuid,
    version: Version,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<SessionMetrics>,
}

fn main() -> ExitCode {
    // Initialize logging
    getfit_core::logging::init();

    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            if e.is_conflict() {
                eprintln!("hint: re-read the aggregate to get its current version, then retry");
            }
            exit_code(&e)
        }
    }
}

fn exit_code(error: &Error) -> ExitCode {
    match error {
        Error::Validation(_) | Error::Duplicate { .. } | Error::InvalidState(_) => ExitCode::from(2),
        Error::VersionConflict { .. } => ExitCode::from(3),
        Error::NotFound { .. } => ExitCode::from(4),
        Error::Timeout { .. } => ExitCode::from(5),
        _ => ExitCode::FAILURE,
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(data_dir) = cli.data_dir {
        config.data.data_dir = data_dir;
    }

    tracing::debug!("Using data directory {:?}", config.data.data_dir);
    let services = Services::open(&config)?;

    match cli.command {
        Commands::User { command } => cmd_user(&services, command),
        Commands::Exercise { command } => cmd_exercise(&services, command),
        Commands::Routine { command } => cmd_routine(&services, command),
        Commands::Workout { command } => cmd_workout(&services, command),
    }
}

fn emit<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn written(id: Uuid, version: Version) -> Result<()> {
    emit(&Written {
        id,
        version,
        metrics: None,
    })
}

fn deleted(id: Uuid) -> Result<()> {
    emit(&serde_json::json!({ "id": id, "deleted": true }))
}

/// Parse a planned set written as `WEIGHTxREPS`
fn parse_set(s: &str) -> std::result::Result<SetPlan, String> {
    let (weight, reps) = s
        .split_once(|c| c == 'x' || c == 'X')
        .ok_or_else(|| format!("expected WEIGHTxREPS, got '{}'", s))?;
    let weight = weight
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid weight '{}': {}", weight, e))?;
    let reps = reps
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid reps '{}': {}", reps, e))?;
    Ok(SetPlan {
        weight,
        reps,
        set_number: None,
    })
}

fn cmd_user(services: &Services<FileStore>, command: UserCommand) -> Result<()> {
    let users = &services.users;
    match command {
        UserCommand::Register {
            username,
            email,
            password,
        } => {
            let user = users.register(NewUser {
                username,
                email,
                password,
            })?;
            emit(&user.profile())
        }
        UserCommand::Show { user } => emit(&users.get(user)?.profile()),
        UserCommand::Update {
            user,
            expected_version,
            username,
            email,
            first_name,
            last_name,
            age,
            title,
            bio,
        } => {
            let patch = UserPatch {
                username,
                email,
                first_name,
                last_name,
                age,
                title,
                bio,
            };
            let version = users.update(user, Version::new(expected_version), patch)?;
            written(user, version)
        }
        UserCommand::Password {
            user,
            expected_version,
            password,
        } => {
            let version = users.change_password(user, Version::new(expected_version), &password)?;
            written(user, version)
        }
        UserCommand::Delete { user } => {
            users.delete(user)?;
            deleted(user)
        }
    }
}

fn cmd_exercise(services: &Services<FileStore>, command: ExerciseCommand) -> Result<()> {
    let exercises = &services.exercises;
    match command {
        ExerciseCommand::Create {
            user,
            name,
            category,
            equipment,
            force,
            level,
            mechanic,
            primary_muscles,
            secondary_muscles,
            instructions,
        } => {
            let exercise = exercises.create(
                user,
                NewExercise {
                    name,
                    category,
                    force,
                    level,
                    mechanic,
                    equipment,
                    primary_muscles,
                    secondary_muscles,
                    instructions,
                },
            )?;
            emit(&exercise)
        }
        ExerciseCommand::List { user } => emit(&exercises.list(user)?),
        ExerciseCommand::Show { addr } => emit(&exercises.get(addr.user, addr.id)?),
        ExerciseCommand::Update {
            gated,
            name,
            category,
            equipment,
            level,
        } => {
            let patch = ExercisePatch {
                name,
                category,
                equipment,
                level,
                ..ExercisePatch::default()
            };
            let version = exercises.update(gated.addr.user, gated.addr.id, gated.version(), patch)?;
            written(gated.addr.id, version)
        }
        ExerciseCommand::Delete { addr } => {
            exercises.delete(addr.user, addr.id)?;
            deleted(addr.id)
        }
    }
}

fn cmd_routine(services: &Services<FileStore>, command: RoutineCommand) -> Result<()> {
    let routines = &services.routines;
    match command {
        RoutineCommand::Create {
            user,
            title,
            description,
            exercises,
        } => {
            let plans = exercises
                .into_iter()
                .map(|exercise_id| ExercisePlan {
                    exercise_id,
                    order: None,
                    sets: Vec::new(),
                })
                .collect();
            let routine = routines.create(
                user,
                NewRoutine {
                    title,
                    description,
                    exercises: plans,
                },
            )?;
            emit(&routine)
        }
        RoutineCommand::List { user } => emit(&routines.list(user)?),
        RoutineCommand::Show { addr } => emit(&routines.get(addr.user, addr.id)?),
        RoutineCommand::Update {
            gated,
            title,
            description,
        } => {
            let patch = RoutinePatch { title, description };
            let version = routines.update(gated.addr.user, gated.addr.id, gated.version(), patch)?;
            written(gated.addr.id, version)
        }
        RoutineCommand::AddExercise {
            gated,
            exercise,
            order,
            sets,
        } => {
            let plan = ExercisePlan {
                exercise_id: exercise,
                order,
                sets,
            };
            let version =
                routines.add_exercise(gated.addr.user, gated.addr.id, gated.version(), plan)?;
            written(gated.addr.id, version)
        }
        RoutineCommand::UpdateExercise {
            gated,
            exercise,
            sets,
        } => {
            let version = routines.update_exercise(
                gated.addr.user,
                gated.addr.id,
                exercise,
                gated.version(),
                sets,
            )?;
            written(gated.addr.id, version)
        }
        RoutineCommand::RemoveExercise { gated, exercise } => {
            let version =
                routines.remove_exercise(gated.addr.user, gated.addr.id, exercise, gated.version())?;
            written(gated.addr.id, version)
        }
        RoutineCommand::Delete { addr } => {
            routines.delete(addr.user, addr.id)?;
            deleted(addr.id)
        }
    }
}

fn cmd_workout(services: &Services<FileStore>, command: WorkoutCommand) -> Result<()> {
    let workouts = &services.workouts;
    match command {
        WorkoutCommand::Start {
            user,
            title,
            description,
            notes,
        } => {
            let session = workouts.create(
                user,
                NewWorkout {
                    title,
                    description,
                    notes,
                },
            )?;
            emit(&session)
        }
        WorkoutCommand::FromRoutine { user, routine } => {
            emit(&workouts.create_from_routine(user, routine)?)
        }
        WorkoutCommand::List { user } => emit(&workouts.list(user)?),
        WorkoutCommand::Show { addr } => emit(&workouts.get(addr.user, addr.id)?),
        WorkoutCommand::AddExercise { gated, exercise } => {
            let version =
                workouts.add_exercise(gated.addr.user, gated.addr.id, gated.version(), exercise)?;
            written(gated.addr.id, version)
        }
        WorkoutCommand::AddSet {
            gated,
            exercise,
            weight,
            reps,
            set_number,
        } => {
            let set = CompletedSet {
                weight,
                reps,
                set_number,
                completed_at: None,
            };
            let version = workouts.record_set(
                gated.addr.user,
                gated.addr.id,
                exercise,
                gated.version(),
                set,
            )?;
            written(gated.addr.id, version)
        }
        WorkoutCommand::Notes {
            gated,
            notes,
            title,
            description,
        } => {
            let patch = SessionPatch {
                title,
                description,
                notes,
            };
            let version = workouts.update(gated.addr.user, gated.addr.id, gated.version(), patch)?;
            written(gated.addr.id, version)
        }
        WorkoutCommand::Complete { gated } => {
            let metrics = workouts.complete(gated.addr.user, gated.addr.id, gated.version())?;
            emit(&Written {
                id: gated.addr.id,
                version: gated.version().next()?,
                metrics: Some(metrics),
            })
        }
        WorkoutCommand::Delete { addr } => {
            workouts.delete(addr.user, addr.id)?;
            deleted(addr.id)
        }
        WorkoutCommand::Export { user, output } => {
            let sessions = workouts.list(user)?;
            match output {
                Some(path) => {
                    let count = export::export_completed(&sessions, &path)?;
                    emit(&serde_json::json!({ "exported": count, "path": path }))
                }
                None => {
                    export::write_completed(&sessions, std::io::stdout().lock())?;
                    Ok(())
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let set = parse_set("62.5x8").unwrap();
        assert_eq!(set.weight, 62.5);
        assert_eq!(set.reps, 8);
        assert_eq!(set.set_number, None);

        assert!(parse_set("60").is_err());
        assert!(parse_set("heavyx5").is_err());
        assert!(parse_set("60x-1").is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
