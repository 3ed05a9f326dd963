use anyhow::{Result, bail};
use clap::Args;

use stride_core::db::Database;
use stride_core::models::{
    NewWorkout, UpdateWorkout, User, WorkoutMetrics, average_speed, format_duration,
    parse_duration,
};
use stride_core::service::{StrideService, WorkoutDraft};

use super::helpers::{parse_datetime, print_workout_table};
use crate::metrics_file::JsonMetricsFile;

/// Metrics entered on the command line.
#[derive(Args, Debug, Default)]
pub(crate) struct MetricArgs {
    /// Distance in kilometres
    #[arg(long)]
    pub distance: Option<f64>,
    /// Total duration (H:MM:SS)
    #[arg(long)]
    pub duration: Option<String>,
    /// Moving time (H:MM:SS, default: the total duration)
    #[arg(long)]
    pub moving: Option<String>,
    /// Ascent in metres
    #[arg(long)]
    pub ascent: Option<f64>,
    /// Descent in metres
    #[arg(long)]
    pub descent: Option<f64>,
    /// Maximum speed in km/h
    #[arg(long)]
    pub max_speed: Option<f64>,
}

impl MetricArgs {
    fn is_empty(&self) -> bool {
        self.distance.is_none()
            && self.duration.is_none()
            && self.moving.is_none()
            && self.ascent.is_none()
            && self.descent.is_none()
            && self.max_speed.is_none()
    }

    fn to_metrics(&self) -> Result<WorkoutMetrics> {
        let (Some(distance), Some(duration)) = (self.distance, self.duration.as_deref()) else {
            bail!("--distance and --duration are required unless --from-file is given");
        };
        let duration = parse_duration(duration)?;
        let moving = match self.moving.as_deref() {
            Some(m) => parse_duration(m)?,
            None => duration,
        };
        let mut metrics = WorkoutMetrics::basic(distance, duration, moving);
        metrics.ascent = self.ascent;
        metrics.descent = self.descent;
        if self.max_speed.is_some() {
            metrics.max_speed = self.max_speed;
        }
        Ok(metrics)
    }
}

pub(crate) struct NewWorkoutArgs {
    pub sport_id: i64,
    pub title: Option<String>,
    pub date: Option<String>,
    pub equipment: Option<i64>,
    pub from_file: Option<String>,
    pub metrics: MetricArgs,
}

pub(crate) fn cmd_workout_add(
    service: &StrideService,
    user: &User,
    args: NewWorkoutArgs,
    json: bool,
) -> Result<()> {
    let workout_date = parse_datetime(args.date)?;
    let equipment_ids: Vec<i64> = args.equipment.into_iter().collect();

    let workout = if let Some(path) = args.from_file {
        if !args.metrics.is_empty() {
            bail!("Metric flags cannot be combined with --from-file");
        }
        service.create_workout_from_source(
            &JsonMetricsFile,
            &path,
            WorkoutDraft {
                user_id: user.id,
                sport_id: args.sport_id,
                title: args.title,
                workout_date,
                equipment_ids,
            },
        )?
    } else {
        service.database().insert_workout(&NewWorkout {
            user_id: user.id,
            sport_id: args.sport_id,
            title: args.title,
            workout_date,
            metrics: args.metrics.to_metrics()?,
            source_file: None,
            equipment_ids,
        })?
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!(
            "Added workout {} on {}: {:.2} km in {}",
            workout.id,
            workout.workout_date.format("%Y-%m-%d %H:%M"),
            workout.metrics.distance,
            format_duration(workout.metrics.moving)
        );
    }

    Ok(())
}

pub(crate) struct EditWorkoutArgs {
    pub sport_id: Option<i64>,
    pub title: Option<String>,
    pub date: Option<String>,
    pub metrics: MetricArgs,
}

pub(crate) fn cmd_workout_edit(
    db: &Database,
    id: i64,
    args: EditWorkoutArgs,
    json: bool,
) -> Result<()> {
    let current = db.get_workout(id)?;
    let m = &args.metrics;

    let mut update = UpdateWorkout {
        sport_id: args.sport_id,
        title: args.title.map(|t| (!t.is_empty()).then_some(t)),
        workout_date: args.date.map(|d| parse_datetime(Some(d))).transpose()?,
        distance: m.distance,
        duration: m.duration.as_deref().map(parse_duration).transpose()?,
        moving: m.moving.as_deref().map(parse_duration).transpose()?,
        ascent: m.ascent.map(Some),
        descent: m.descent.map(Some),
        max_speed: m.max_speed.map(Some),
        ..UpdateWorkout::default()
    };
    if update.distance.is_some() || update.moving.is_some() {
        let distance = update.distance.unwrap_or(current.metrics.distance);
        let moving = update.moving.unwrap_or(current.metrics.moving);
        let ave_speed = average_speed(distance, moving);
        update.ave_speed = Some(ave_speed);
        // A manual entry's max speed is its average; keep the two together.
        if m.max_speed.is_none() && current.metrics.max_speed == current.metrics.ave_speed {
            update.max_speed = Some(ave_speed);
        }
    }

    let workout = db.update_workout(id, &update)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!("Updated workout {}", workout.id);
    }

    Ok(())
}

pub(crate) fn cmd_workout_reprocess(service: &StrideService, id: i64, json: bool) -> Result<()> {
    let workout = service.reprocess_workout(&JsonMetricsFile, id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!(
            "Reprocessed workout {}: {:.2} km in {}",
            workout.id,
            workout.metrics.distance,
            format_duration(workout.metrics.moving)
        );
    }

    Ok(())
}

pub(crate) fn cmd_workout_delete(db: &Database, ids: &[i64], force: bool, json: bool) -> Result<()> {
    let deleted = db.delete_workouts(ids, force)?;

    if json {
        println!("{}", serde_json::json!({ "deleted": deleted }));
    } else {
        println!("Deleted {deleted} workout(s)");
    }

    Ok(())
}

pub(crate) fn cmd_workout_list(
    db: &Database,
    user: &User,
    sport_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let workouts = db.list_workouts(user.id, sport_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workouts)?);
    } else if workouts.is_empty() {
        eprintln!("No workouts found. Use `stride workout add` to record one.");
    } else {
        print_workout_table(db, &workouts)?;
    }

    Ok(())
}
