mod commands;
mod config;
mod metrics_file;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::commands::{
    EditWorkoutArgs, MetricArgs, NewWorkoutArgs, cmd_equipment_add, cmd_equipment_attach,
    cmd_equipment_detach, cmd_equipment_list, cmd_equipment_refresh, cmd_equipment_set_active,
    cmd_records_rebuild, cmd_records_show, cmd_sport_list, cmd_user_add, cmd_workout_add,
    cmd_workout_delete, cmd_workout_edit, cmd_workout_list, cmd_workout_reprocess, resolve_user,
};
use crate::config::Config;
use stride_core::db::Database;
use stride_core::service::StrideService;

#[derive(Parser)]
#[command(
    name = "stride",
    version,
    about = "A local-first workout log with personal records and gear mileage"
)]
struct Cli {
    /// Database file (default: the per-user data directory)
    #[arg(long, global = true, env = "STRIDE_DB", value_name = "PATH")]
    db: Option<PathBuf>,
    /// User to act as
    #[arg(short, long, global = true, env = "STRIDE_USER")]
    user: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users
    User {
        #[command(subcommand)]
        command: UserCommands,
    },
    /// List sports
    Sport {
        #[command(subcommand)]
        command: SportCommands,
    },
    /// Record, edit and delete workouts
    Workout {
        #[command(subcommand)]
        command: WorkoutCommands,
    },
    /// Manage equipment and its usage totals
    Equipment {
        #[command(subcommand)]
        command: EquipmentCommands,
    },
    /// Show or rebuild personal records
    Records {
        #[command(subcommand)]
        command: RecordsCommands,
    },
}

#[derive(Subcommand)]
enum UserCommands {
    /// Create a user
    Add {
        /// Username
        username: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum SportCommands {
    /// List all sports
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum WorkoutCommands {
    /// Record a workout, either from flags or from a metrics file
    Add {
        /// Sport ID (see `stride sport list`)
        #[arg(short, long)]
        sport: i64,
        /// Workout title
        #[arg(short, long)]
        title: Option<String>,
        /// Date and time (YYYY-MM-DD [HH:MM[:SS]], today/yesterday, default: now)
        #[arg(long)]
        date: Option<String>,
        /// Equipment ID to attach
        #[arg(short, long)]
        equipment: Option<i64>,
        /// JSON file with precomputed metrics
        #[arg(long, value_name = "PATH")]
        from_file: Option<String>,
        #[command(flatten)]
        metrics: MetricArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit a workout's sport, title, date or metrics
    Edit {
        /// Workout ID
        id: i64,
        /// New sport ID
        #[arg(short, long)]
        sport: Option<i64>,
        /// New title (empty to clear)
        #[arg(short, long)]
        title: Option<String>,
        /// New date and time
        #[arg(long)]
        date: Option<String>,
        #[command(flatten)]
        metrics: MetricArgs,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Re-read a workout's metrics file and apply the new metrics
    Reprocess {
        /// Workout ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete one or more workouts
    Delete {
        /// Workout IDs
        #[arg(required = true)]
        ids: Vec<i64>,
        /// Detach equipment before deleting instead of refusing
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List workouts, most recent first
    List {
        /// Only this sport ID
        #[arg(short, long)]
        sport: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum EquipmentCommands {
    /// Register a piece of equipment
    Add {
        /// Label (unique per user)
        label: String,
        /// Free-form description
        #[arg(short, long)]
        description: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List equipment with usage totals
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Attach equipment to a workout
    Attach {
        /// Workout ID
        workout_id: i64,
        /// Equipment ID
        equipment_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Detach equipment from a workout
    Detach {
        /// Workout ID
        workout_id: i64,
        /// Equipment ID
        equipment_id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Retire equipment so it can no longer be attached
    Retire {
        /// Equipment ID
        id: i64,
        /// Reactivate instead
        #[arg(long)]
        undo: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute totals from the attached workouts
    Refresh {
        /// Equipment ID
        id: i64,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum RecordsCommands {
    /// Show personal records
    Show {
        /// Only this sport ID
        #[arg(short, long)]
        sport: Option<i64>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Recompute every record from the workouts
    Rebuild {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(
            tracing_subscriber::fmt::layer()
                .compact()
                .with_writer(std::io::stderr),
        )
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {e:#}");
        process::exit(1);
    }
}

#[allow(clippy::too_many_lines)]
fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.db)?;
    let service = StrideService::from_database(Database::open(&config.db_path)?);
    let db = service.database();
    let user = || resolve_user(db, cli.user.as_deref());

    match cli.command {
        Commands::User { command } => match command {
            UserCommands::Add { username, json } => cmd_user_add(db, &username, json),
        },
        Commands::Sport { command } => match command {
            SportCommands::List { json } => cmd_sport_list(db, json),
        },
        Commands::Workout { command } => match command {
            WorkoutCommands::Add {
                sport,
                title,
                date,
                equipment,
                from_file,
                metrics,
                json,
            } => cmd_workout_add(
                &service,
                &user()?,
                NewWorkoutArgs {
                    sport_id: sport,
                    title,
                    date,
                    equipment,
                    from_file,
                    metrics,
                },
                json,
            ),
            WorkoutCommands::Edit {
                id,
                sport,
                title,
                date,
                metrics,
                json,
            } => cmd_workout_edit(
                db,
                id,
                EditWorkoutArgs {
                    sport_id: sport,
                    title,
                    date,
                    metrics,
                },
                json,
            ),
            WorkoutCommands::Reprocess { id, json } => cmd_workout_reprocess(&service, id, json),
            WorkoutCommands::Delete { ids, force, json } => {
                cmd_workout_delete(db, &ids, force, json)
            }
            WorkoutCommands::List { sport, json } => cmd_workout_list(db, &user()?, sport, json),
        },
        Commands::Equipment { command } => match command {
            EquipmentCommands::Add {
                label,
                description,
                json,
            } => cmd_equipment_add(db, &user()?, &label, description, json),
            EquipmentCommands::List { json } => cmd_equipment_list(db, &user()?, json),
            EquipmentCommands::Attach {
                workout_id,
                equipment_id,
                json,
            } => cmd_equipment_attach(db, workout_id, equipment_id, json),
            EquipmentCommands::Detach {
                workout_id,
                equipment_id,
                json,
            } => cmd_equipment_detach(db, workout_id, equipment_id, json),
            EquipmentCommands::Retire { id, undo, json } => {
                cmd_equipment_set_active(db, id, undo, json)
            }
            EquipmentCommands::Refresh { id, json } => cmd_equipment_refresh(db, id, json),
        },
        Commands::Records { command } => match command {
            RecordsCommands::Show { sport, json } => cmd_records_show(db, &user()?, sport, json),
            RecordsCommands::Rebuild { json } => cmd_records_rebuild(db, &user()?, json),
        },
    }
}
