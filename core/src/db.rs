use std::collections::BTreeSet;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDateTime, TimeDelta};
use rusqlite::types::Type;
use rusqlite::{Connection, OptionalExtension, Row, params};
use tracing::{debug, info};
use uuid::Uuid;

use crate::codec;
use crate::coordinator::{self, UnitOfWork, WorkoutMutation, WorkoutSnapshot};
use crate::equipment::{self, TotalsDelta};
use crate::error::AggregateError;
use crate::models::{
    DATETIME_FORMAT, Equipment, NewEquipment, NewWorkout, RecordType, Sport, UpdateWorkout, User,
    Workout, WorkoutMetrics, WorkoutRecord, validate_workout_metrics,
};
use crate::records::{self, ReconcileOutcome};

const DEFAULT_SPORTS: [&str; 8] = [
    "Cycling (Sport)",
    "Cycling (Transport)",
    "Hiking",
    "Mountain Biking",
    "Running",
    "Walking",
    "Trail",
    "Skiing",
];

const WORKOUT_COLUMNS: &str = "id, uuid, user_id, sport_id, title, workout_date, distance, duration,
    moving, ascent, descent, max_speed, ave_speed, source_file, created_at, updated_at";

const EQUIPMENT_COLUMNS: &str = "id, uuid, user_id, label, description, is_active, total_distance,
    total_duration, total_moving, total_workouts, created_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Database { conn };
        db.migrate()?;
        Ok(db)
    }

    /// The underlying connection, for maintenance queries.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn migrate(&self) -> Result<()> {
        self.conn.pragma_update(None, "foreign_keys", true)?;

        let version: i64 = self
            .conn
            .pragma_query_value(None, "user_version", |row| row.get(0))?;

        if version < 1 {
            self.conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS users (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    username TEXT NOT NULL UNIQUE,
                    created_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS sports (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    label TEXT NOT NULL UNIQUE,
                    is_active INTEGER NOT NULL DEFAULT 1
                );

                CREATE TABLE IF NOT EXISTS workouts (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    sport_id INTEGER NOT NULL REFERENCES sports(id),
                    title TEXT,
                    workout_date TEXT NOT NULL,
                    distance REAL NOT NULL,
                    duration INTEGER NOT NULL,
                    moving INTEGER NOT NULL,
                    ascent REAL,
                    descent REAL,
                    max_speed REAL,
                    ave_speed REAL,
                    source_file TEXT,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS equipment (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    uuid TEXT NOT NULL UNIQUE,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    label TEXT NOT NULL,
                    description TEXT,
                    is_active INTEGER NOT NULL DEFAULT 1,
                    total_distance INTEGER NOT NULL DEFAULT 0,
                    total_duration INTEGER NOT NULL DEFAULT 0,
                    total_moving INTEGER NOT NULL DEFAULT 0,
                    total_workouts INTEGER NOT NULL DEFAULT 0,
                    created_at TEXT NOT NULL,
                    UNIQUE (user_id, label)
                );

                CREATE TABLE IF NOT EXISTS workout_equipment (
                    workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
                    equipment_id INTEGER NOT NULL REFERENCES equipment(id),
                    PRIMARY KEY (workout_id, equipment_id)
                );

                CREATE TABLE IF NOT EXISTS records (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    user_id INTEGER NOT NULL REFERENCES users(id),
                    sport_id INTEGER NOT NULL REFERENCES sports(id),
                    record_type TEXT NOT NULL CHECK (record_type IN ('AS', 'FD', 'HA', 'LD', 'MS')),
                    workout_id INTEGER NOT NULL REFERENCES workouts(id) ON DELETE CASCADE,
                    value INTEGER NOT NULL,
                    workout_date TEXT NOT NULL,
                    UNIQUE (user_id, sport_id, record_type)
                );

                CREATE INDEX IF NOT EXISTS idx_workouts_user_sport ON workouts(user_id, sport_id);
                CREATE INDEX IF NOT EXISTS idx_workout_equipment_equipment ON workout_equipment(equipment_id);
                CREATE INDEX IF NOT EXISTS idx_records_workout ON records(workout_id);

                PRAGMA user_version = 1;",
            )?;

            for label in DEFAULT_SPORTS {
                self.conn.execute(
                    "INSERT OR IGNORE INTO sports (label) VALUES (?1)",
                    params![label],
                )?;
            }
            info!("Database migrated to version 1");
        }

        Ok(())
    }

    // --- Row mapping helpers ---

    // Expects WORKOUT_COLUMNS order; equipment ids are loaded separately.
    fn workout_from_row(row: &Row) -> rusqlite::Result<Workout> {
        Ok(Workout {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            sport_id: row.get(3)?,
            title: row.get(4)?,
            workout_date: datetime_from_row(row, 5)?,
            metrics: metrics_from_row(row, 6)?,
            source_file: row.get(13)?,
            equipment_ids: Vec::new(),
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }

    fn equipment_from_row(row: &Row) -> rusqlite::Result<Equipment> {
        Ok(Equipment {
            id: row.get(0)?,
            uuid: row.get(1)?,
            user_id: row.get(2)?,
            label: row.get(3)?,
            description: row.get(4)?,
            is_active: row.get(5)?,
            total_distance: codec::decode_distance(row.get(6)?),
            total_duration: span_from_row(row, 7)?,
            total_moving: span_from_row(row, 8)?,
            total_workouts: row.get(9)?,
            created_at: row.get(10)?,
        })
    }

    // 0: r.id, 1: r.user_id, 2: u.username, 3: r.sport_id, 4: r.workout_id,
    // 5: r.record_type, 6: r.workout_date, 7: r.value
    fn record_from_row(row: &Row) -> rusqlite::Result<WorkoutRecord> {
        let code: String = row.get(5)?;
        let record_type = RecordType::from_code(&code)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(5, Type::Text, e.into()))?;
        Ok(WorkoutRecord {
            id: row.get(0)?,
            user_id: row.get(1)?,
            username: row.get(2)?,
            sport_id: row.get(3)?,
            workout_id: row.get(4)?,
            record_type,
            workout_date: datetime_from_row(row, 6)?,
            value: codec::decode(record_type, row.get(7)?),
        })
    }

    // --- Users & sports ---

    pub fn create_user(&self, username: &str) -> Result<User> {
        let username = username.trim();
        if username.is_empty() {
            bail!("Username must not be empty");
        }
        let now = Local::now().to_rfc3339();
        self.conn
            .execute(
                "INSERT INTO users (username, created_at) VALUES (?1, ?2)",
                params![username, now],
            )
            .with_context(|| format!("Failed to create user '{username}'"))?;
        self.get_user(self.conn.last_insert_rowid())
    }

    pub fn get_user(&self, id: i64) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE id = ?1",
                params![id],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .context("User not found")
    }

    pub fn get_user_by_name(&self, username: &str) -> Result<User> {
        self.conn
            .query_row(
                "SELECT id, username, created_at FROM users WHERE username = ?1",
                params![username],
                |row| {
                    Ok(User {
                        id: row.get(0)?,
                        username: row.get(1)?,
                        created_at: row.get(2)?,
                    })
                },
            )
            .context(format!("User '{username}' not found"))
    }

    pub fn list_sports(&self) -> Result<Vec<Sport>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, label, is_active FROM sports ORDER BY id")?;
        let sports = stmt
            .query_map([], |row| {
                Ok(Sport {
                    id: row.get(0)?,
                    label: row.get(1)?,
                    is_active: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(sports)
    }

    pub fn get_sport(&self, id: i64) -> Result<Sport> {
        self.conn
            .query_row(
                "SELECT id, label, is_active FROM sports WHERE id = ?1",
                params![id],
                |row| {
                    Ok(Sport {
                        id: row.get(0)?,
                        label: row.get(1)?,
                        is_active: row.get(2)?,
                    })
                },
            )
            .context("Sport not found")
    }

    // --- Workouts ---

    fn load_workout(conn: &Connection, id: i64) -> Result<Workout> {
        let mut workout = conn
            .query_row(
                &format!("SELECT {WORKOUT_COLUMNS} FROM workouts WHERE id = ?1"),
                params![id],
                Self::workout_from_row,
            )
            .optional()?
            .ok_or(AggregateError::NotFound("Workout", id))?;
        workout.equipment_ids = equipment_ids_for(conn, id)?;
        Ok(workout)
    }

    pub fn get_workout(&self, id: i64) -> Result<Workout> {
        Self::load_workout(&self.conn, id)
    }

    pub fn list_workouts(&self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {WORKOUT_COLUMNS} FROM workouts
             WHERE user_id = ?1 AND (?2 IS NULL OR sport_id = ?2)
             ORDER BY workout_date DESC, id DESC"
        ))?;
        let mut workouts = stmt
            .query_map(params![user_id, sport_id], Self::workout_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        for workout in &mut workouts {
            workout.equipment_ids = equipment_ids_for(&self.conn, workout.id)?;
        }
        Ok(workouts)
    }

    pub fn insert_workout(&self, new: &NewWorkout) -> Result<Workout> {
        validate_workout_metrics(&new.metrics)?;
        let tx = self.conn.unchecked_transaction()?;
        validate_equipment(&tx, new.user_id, &new.equipment_ids, &[])?;

        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        let m = &new.metrics;
        tx.execute(
            "INSERT INTO workouts (uuid, user_id, sport_id, title, workout_date, distance, duration,
             moving, ascent, descent, max_speed, ave_speed, source_file, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            params![
                uuid,
                new.user_id,
                new.sport_id,
                new.title,
                format_datetime(new.workout_date),
                normalize_distance(m.distance),
                codec::encode_span(m.duration),
                codec::encode_span(m.moving),
                m.ascent,
                m.descent,
                m.max_speed,
                m.ave_speed,
                new.source_file,
                now,
                now,
            ],
        )
        .context("Failed to insert workout")?;
        let id = tx.last_insert_rowid();
        for equipment_id in dedup(&new.equipment_ids) {
            tx.execute(
                "INSERT INTO workout_equipment (workout_id, equipment_id) VALUES (?1, ?2)",
                params![id, equipment_id],
            )?;
        }

        let workout = Self::load_workout(&tx, id)?;
        let mut uow = UnitOfWork::new();
        coordinator::dispatch(&mut uow, &WorkoutMutation::Created((&workout).into()))?;
        uow.flush(&tx)?;
        tx.commit()?;
        debug!(workout_id = id, "inserted workout");
        Ok(workout)
    }

    pub fn update_workout(&self, id: i64, update: &UpdateWorkout) -> Result<Workout> {
        let tx = self.conn.unchecked_transaction()?;
        // The maintainers need both sides, so capture the old state first.
        let before = Self::load_workout(&tx, id)?;

        let metrics = update.apply_metrics(&before.metrics);
        validate_workout_metrics(&metrics)?;
        let sport_id = update.sport_id.unwrap_or(before.sport_id);
        let title = update.title.clone().unwrap_or_else(|| before.title.clone());
        let workout_date = update.workout_date.unwrap_or(before.workout_date);

        let now = Local::now().to_rfc3339();
        tx.execute(
            "UPDATE workouts SET sport_id = ?1, title = ?2, workout_date = ?3, distance = ?4,
             duration = ?5, moving = ?6, ascent = ?7, descent = ?8, max_speed = ?9,
             ave_speed = ?10, updated_at = ?11 WHERE id = ?12",
            params![
                sport_id,
                title,
                format_datetime(workout_date),
                normalize_distance(metrics.distance),
                codec::encode_span(metrics.duration),
                codec::encode_span(metrics.moving),
                metrics.ascent,
                metrics.descent,
                metrics.max_speed,
                metrics.ave_speed,
                now,
                id
            ],
        )
        .context("Failed to update workout")?;

        if let Some(ref equipment_ids) = update.equipment_ids {
            validate_equipment(&tx, before.user_id, equipment_ids, &before.equipment_ids)?;
            replace_equipment(&tx, id, &before.equipment_ids, equipment_ids)?;
        }

        let after = Self::load_workout(&tx, id)?;
        let mut uow = UnitOfWork::new();
        coordinator::dispatch(
            &mut uow,
            &WorkoutMutation::Updated {
                before: (&before).into(),
                after: (&after).into(),
            },
        )?;
        uow.flush(&tx)?;
        tx.commit()?;
        Ok(after)
    }

    /// Replaces every metric, as when a workout's source file is reprocessed.
    pub fn update_workout_metrics(&self, id: i64, metrics: WorkoutMetrics) -> Result<Workout> {
        self.update_workout(id, &UpdateWorkout::from_metrics(metrics))
    }

    /// Deletes a workout. Refused while equipment is attached unless `force`
    /// is set, in which case the equipment is detached first.
    pub fn delete_workout(&self, id: i64, force: bool) -> Result<()> {
        self.delete_workouts(&[id], force).map(|_| ())
    }

    pub fn delete_workouts(&self, ids: &[i64], force: bool) -> Result<usize> {
        let tx = self.conn.unchecked_transaction()?;
        let workouts = dedup(ids)
            .into_iter()
            .map(|id| Self::load_workout(&tx, id))
            .collect::<Result<Vec<_>>>()?;

        let with_equipment = workouts
            .iter()
            .filter(|w| !w.equipment_ids.is_empty())
            .count();
        if with_equipment > 0 && !force {
            return Err(AggregateError::WorkoutHasAssociatedEquipment {
                count: with_equipment,
            }
            .into());
        }

        let mut uow = UnitOfWork::new();
        for workout in &workouts {
            let mut before: WorkoutSnapshot = workout.into();
            if !before.equipment_ids.is_empty() {
                let detached = WorkoutSnapshot {
                    equipment_ids: Vec::new(),
                    ..before.clone()
                };
                tx.execute(
                    "DELETE FROM workout_equipment WHERE workout_id = ?1",
                    params![workout.id],
                )?;
                coordinator::dispatch(
                    &mut uow,
                    &WorkoutMutation::Updated {
                        before,
                        after: detached.clone(),
                    },
                )?;
                before = detached;
            }

            let held_record_sports = records::sports_with_records_for_workout(&tx, workout.id)?;
            tx.execute("DELETE FROM workouts WHERE id = ?1", params![workout.id])?;
            coordinator::dispatch(
                &mut uow,
                &WorkoutMutation::Deleted {
                    before,
                    held_record_sports,
                },
            )?;
        }

        uow.flush(&tx)?;
        tx.commit()?;
        debug!(count = workouts.len(), force, "deleted workouts");
        Ok(workouts.len())
    }

    // --- Equipment ---

    pub fn insert_equipment(&self, new: &NewEquipment) -> Result<Equipment> {
        let label = new.label.trim();
        if label.is_empty() {
            bail!("Equipment label must not be empty");
        }
        let now = Local::now().to_rfc3339();
        let uuid = Uuid::new_v4().to_string();
        self.conn
            .execute(
                "INSERT INTO equipment (uuid, user_id, label, description, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![uuid, new.user_id, label, new.description, now],
            )
            .with_context(|| format!("Failed to add equipment '{label}'"))?;
        self.get_equipment(self.conn.last_insert_rowid())
    }

    pub fn get_equipment(&self, id: i64) -> Result<Equipment> {
        self.conn
            .query_row(
                &format!("SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE id = ?1"),
                params![id],
                Self::equipment_from_row,
            )
            .optional()?
            .ok_or_else(|| AggregateError::NotFound("Equipment", id).into())
    }

    pub fn list_equipment(&self, user_id: i64) -> Result<Vec<Equipment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {EQUIPMENT_COLUMNS} FROM equipment WHERE user_id = ?1 ORDER BY label"
        ))?;
        let items = stmt
            .query_map(params![user_id], Self::equipment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Retired equipment keeps its totals and existing associations but can
    /// no longer be attached to workouts.
    pub fn set_equipment_active(&self, id: i64, active: bool) -> Result<Equipment> {
        let rows = self.conn.execute(
            "UPDATE equipment SET is_active = ?1 WHERE id = ?2",
            params![active, id],
        )?;
        if rows == 0 {
            return Err(AggregateError::NotFound("Equipment", id).into());
        }
        self.get_equipment(id)
    }

    /// Attaches equipment to a workout. A no-op when already attached.
    pub fn attach_equipment(&self, workout_id: i64, equipment_id: i64) -> Result<Workout> {
        let workout = self.get_workout(workout_id)?;
        if workout.equipment_ids.contains(&equipment_id) {
            return Ok(workout);
        }
        let mut ids = workout.equipment_ids;
        ids.push(equipment_id);
        self.update_workout(
            workout_id,
            &UpdateWorkout {
                equipment_ids: Some(ids),
                ..UpdateWorkout::default()
            },
        )
    }

    /// Detaches equipment from a workout. A no-op when not attached.
    pub fn detach_equipment(&self, workout_id: i64, equipment_id: i64) -> Result<Workout> {
        let workout = self.get_workout(workout_id)?;
        if !workout.equipment_ids.contains(&equipment_id) {
            return Ok(workout);
        }
        let ids = workout
            .equipment_ids
            .into_iter()
            .filter(|id| *id != equipment_id)
            .collect();
        self.update_workout(
            workout_id,
            &UpdateWorkout {
                equipment_ids: Some(ids),
                ..UpdateWorkout::default()
            },
        )
    }

    /// Recomputes an item's totals from its workouts, returning the correction.
    pub fn refresh_equipment_totals(&self, equipment_id: i64) -> Result<TotalsDelta> {
        let tx = self.conn.unchecked_transaction()?;
        let correction = equipment::recompute(&tx, equipment_id)?;
        tx.commit()?;
        Ok(correction)
    }

    // --- Records ---

    pub fn get_records(&self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<WorkoutRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT r.id, r.user_id, u.username, r.sport_id, r.workout_id, r.record_type,
                    r.workout_date, r.value
             FROM records r JOIN users u ON u.id = r.user_id
             WHERE r.user_id = ?1 AND (?2 IS NULL OR r.sport_id = ?2)
             ORDER BY r.sport_id, r.record_type",
        )?;
        let records = stmt
            .query_map(params![user_id, sport_id], Self::record_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    pub fn get_record(
        &self,
        user_id: i64,
        sport_id: i64,
        record_type: RecordType,
    ) -> Result<Option<WorkoutRecord>> {
        let record = self
            .conn
            .query_row(
                "SELECT r.id, r.user_id, u.username, r.sport_id, r.workout_id, r.record_type,
                        r.workout_date, r.value
                 FROM records r JOIN users u ON u.id = r.user_id
                 WHERE r.user_id = ?1 AND r.sport_id = ?2 AND r.record_type = ?3",
                params![user_id, sport_id, record_type.code()],
                Self::record_from_row,
            )
            .optional()?;
        Ok(record)
    }

    /// Reconciles every sport for a user in one transaction.
    pub fn rebuild_records(&self, user_id: i64) -> Result<ReconcileOutcome> {
        let tx = self.conn.unchecked_transaction()?;
        let outcome = records::rebuild_for_user(&tx, user_id)?;
        tx.commit()?;
        Ok(outcome)
    }
}

pub(crate) fn format_datetime(dt: NaiveDateTime) -> String {
    dt.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn datetime_from_row(row: &Row, idx: usize) -> rusqlite::Result<NaiveDateTime> {
    let raw: String = row.get(idx)?;
    NaiveDateTime::parse_from_str(&raw, DATETIME_FORMAT)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn span_from_row(row: &Row, idx: usize) -> rusqlite::Result<TimeDelta> {
    let secs: i64 = row.get(idx)?;
    TimeDelta::try_seconds(secs).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Integer,
            format!("{secs} seconds is out of range").into(),
        )
    })
}

// Expects distance, duration, moving, ascent, descent, max_speed, ave_speed from `start`.
pub(crate) fn metrics_from_row(row: &Row, start: usize) -> rusqlite::Result<WorkoutMetrics> {
    Ok(WorkoutMetrics {
        distance: row.get(start)?,
        duration: span_from_row(row, start + 1)?,
        moving: span_from_row(row, start + 2)?,
        ascent: row.get(start + 3)?,
        descent: row.get(start + 4)?,
        max_speed: row.get(start + 5)?,
        ave_speed: row.get(start + 6)?,
    })
}

/// Stored distances keep the three decimals the totals are summed at.
fn normalize_distance(km: f64) -> f64 {
    codec::decode_distance(codec::encode_distance(km))
}

fn dedup(ids: &[i64]) -> Vec<i64> {
    ids.iter().copied().collect::<BTreeSet<_>>().into_iter().collect()
}

fn equipment_ids_for(conn: &Connection, workout_id: i64) -> rusqlite::Result<Vec<i64>> {
    let mut stmt = conn.prepare(
        "SELECT equipment_id FROM workout_equipment WHERE workout_id = ?1 ORDER BY equipment_id",
    )?;
    stmt.query_map(params![workout_id], |row| row.get(0))?
        .collect()
}

/// Equipment must exist, belong to the workout owner and be active when newly
/// attached. A workout carries at most one item.
fn validate_equipment(
    conn: &Connection,
    user_id: i64,
    ids: &[i64],
    already_attached: &[i64],
) -> Result<(), AggregateError> {
    let ids = dedup(ids);
    if ids.len() > 1 {
        return Err(AggregateError::InvalidEquipment(
            "a workout can carry at most one equipment item".to_string(),
        ));
    }
    for id in ids {
        let (owner, active): (i64, bool) = conn
            .query_row(
                "SELECT user_id, is_active FROM equipment WHERE id = ?1",
                params![id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or(AggregateError::NotFound("Equipment", id))?;
        if owner != user_id {
            return Err(AggregateError::InvalidEquipment(format!(
                "equipment {id} belongs to another user"
            )));
        }
        if !active && !already_attached.contains(&id) {
            return Err(AggregateError::InvalidEquipment(format!(
                "equipment {id} is retired"
            )));
        }
    }
    Ok(())
}

fn replace_equipment(
    conn: &Connection,
    workout_id: i64,
    current: &[i64],
    wanted: &[i64],
) -> rusqlite::Result<()> {
    let wanted = dedup(wanted);
    for id in current.iter().filter(|id| !wanted.contains(id)) {
        conn.execute(
            "DELETE FROM workout_equipment WHERE workout_id = ?1 AND equipment_id = ?2",
            params![workout_id, id],
        )?;
    }
    for id in wanted.iter().filter(|id| !current.contains(id)) {
        conn.execute(
            "INSERT INTO workout_equipment (workout_id, equipment_id) VALUES (?1, ?2)",
            params![workout_id, id],
        )?;
    }
    Ok(())
}
