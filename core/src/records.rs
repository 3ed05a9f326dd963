//! Per-user, per-sport "best ever" records.
//!
//! `reconcile` recomputes the five categories from the live workouts of one
//! (user, sport) pair and brings the `records` table in line, writing only
//! the rows that differ.

use std::cmp::Reverse;
use std::ops::AddAssign;

use chrono::NaiveDateTime;
use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::codec;
use crate::db::{datetime_from_row, format_datetime, metrics_from_row};
use crate::error::AggregateError;
use crate::models::{RecordType, WorkoutMetrics};

/// Rows written by one or more reconciliations.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ReconcileOutcome {
    #[must_use]
    pub fn writes(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

impl AddAssign for ReconcileOutcome {
    fn add_assign(&mut self, other: Self) {
        self.inserted += other.inserted;
        self.updated += other.updated;
        self.deleted += other.deleted;
    }
}

struct LiveWorkout {
    id: i64,
    workout_date: NaiveDateTime,
    metrics: WorkoutMetrics,
}

#[derive(Debug, PartialEq, Eq)]
struct Holder {
    workout_id: i64,
    workout_date: NaiveDateTime,
    value: i64,
}

struct StoredRecord {
    id: i64,
    holder: Holder,
}

pub fn reconcile(
    conn: &Connection,
    user_id: i64,
    sport_id: i64,
) -> Result<ReconcileOutcome, AggregateError> {
    let map_err = AggregateError::reconciliation(user_id, sport_id);
    let workouts = scan_workouts(conn, user_id, sport_id).map_err(&map_err)?;

    let mut outcome = ReconcileOutcome::default();
    for record_type in RecordType::ALL {
        let best = best_holder(&workouts, record_type);
        let stored = stored_record(conn, user_id, sport_id, record_type).map_err(&map_err)?;

        match (best, stored) {
            (Some(best), Some(stored)) if best == stored.holder => {}
            (Some(best), Some(stored)) => {
                conn.execute(
                    "UPDATE records SET workout_id = ?1, value = ?2, workout_date = ?3 WHERE id = ?4",
                    params![
                        best.workout_id,
                        best.value,
                        format_datetime(best.workout_date),
                        stored.id
                    ],
                )
                .map_err(&map_err)?;
                outcome.updated += 1;
            }
            (Some(best), None) => {
                conn.execute(
                    "INSERT INTO records (user_id, sport_id, record_type, workout_id, value, workout_date)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        user_id,
                        sport_id,
                        record_type.code(),
                        best.workout_id,
                        best.value,
                        format_datetime(best.workout_date)
                    ],
                )
                .map_err(&map_err)?;
                outcome.inserted += 1;
            }
            (None, Some(stored)) => {
                conn.execute("DELETE FROM records WHERE id = ?1", params![stored.id])
                    .map_err(&map_err)?;
                outcome.deleted += 1;
            }
            (None, None) => {}
        }
    }

    debug!(
        user_id,
        sport_id,
        scanned = workouts.len(),
        inserted = outcome.inserted,
        updated = outcome.updated,
        deleted = outcome.deleted,
        "reconciled records"
    );
    Ok(outcome)
}

/// Sports in which the workout currently holds at least one record.
pub fn sports_with_records_for_workout(
    conn: &Connection,
    workout_id: i64,
) -> Result<Vec<i64>, AggregateError> {
    let mut stmt =
        conn.prepare("SELECT DISTINCT sport_id FROM records WHERE workout_id = ?1 ORDER BY sport_id")?;
    let sports = stmt
        .query_map(params![workout_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;
    Ok(sports)
}

/// Reconciles every sport the user has workouts or records in.
pub fn rebuild_for_user(conn: &Connection, user_id: i64) -> Result<ReconcileOutcome, AggregateError> {
    let mut stmt = conn.prepare(
        "SELECT sport_id FROM workouts WHERE user_id = ?1
         UNION
         SELECT sport_id FROM records WHERE user_id = ?1
         ORDER BY sport_id",
    )?;
    let sports = stmt
        .query_map(params![user_id], |row| row.get(0))?
        .collect::<Result<Vec<i64>, _>>()?;

    let mut total = ReconcileOutcome::default();
    for sport_id in sports {
        total += reconcile(conn, user_id, sport_id)?;
    }
    Ok(total)
}

fn scan_workouts(
    conn: &Connection,
    user_id: i64,
    sport_id: i64,
) -> rusqlite::Result<Vec<LiveWorkout>> {
    let mut stmt = conn.prepare(
        "SELECT id, workout_date, distance, duration, moving, ascent, descent, max_speed, ave_speed
         FROM workouts WHERE user_id = ?1 AND sport_id = ?2",
    )?;
    stmt.query_map(params![user_id, sport_id], |row| {
        Ok(LiveWorkout {
            id: row.get(0)?,
            workout_date: datetime_from_row(row, 1)?,
            metrics: metrics_from_row(row, 2)?,
        })
    })?
    .collect()
}

/// Highest encoded value wins; ties go to the earliest workout, then the lowest id.
fn best_holder(workouts: &[LiveWorkout], record_type: RecordType) -> Option<Holder> {
    workouts
        .iter()
        .filter_map(|w| {
            codec::encoded_value_of(record_type, &w.metrics).map(|value| Holder {
                workout_id: w.id,
                workout_date: w.workout_date,
                value,
            })
        })
        .max_by_key(|h| (h.value, Reverse(h.workout_date), Reverse(h.workout_id)))
}

fn stored_record(
    conn: &Connection,
    user_id: i64,
    sport_id: i64,
    record_type: RecordType,
) -> rusqlite::Result<Option<StoredRecord>> {
    conn.query_row(
        "SELECT id, workout_id, value, workout_date FROM records
         WHERE user_id = ?1 AND sport_id = ?2 AND record_type = ?3",
        params![user_id, sport_id, record_type.code()],
        |row| {
            Ok(StoredRecord {
                id: row.get(0)?,
                holder: Holder {
                    workout_id: row.get(1)?,
                    value: row.get(2)?,
                    workout_date: datetime_from_row(row, 3)?,
                },
            })
        },
    )
    .optional()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewWorkout, RecordValue, UpdateWorkout};
    use chrono::{NaiveDate, TimeDelta};

    const CYCLING: i64 = 1;
    const RUNNING: i64 = 5;

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 6, day)
            .unwrap()
            .and_hms_opt(8, 0, 0)
            .unwrap()
    }

    fn ride(user_id: i64, day: u32, distance: f64, minutes: i64) -> NewWorkout {
        NewWorkout {
            user_id,
            sport_id: CYCLING,
            title: None,
            workout_date: at(day),
            metrics: WorkoutMetrics::basic(
                distance,
                TimeDelta::minutes(minutes),
                TimeDelta::minutes(minutes),
            ),
            source_file: None,
            equipment_ids: Vec::new(),
        }
    }

    fn setup() -> (Database, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("sam").unwrap();
        (db, user.id)
    }

    #[test]
    fn test_farthest_distance_follows_edits() {
        let (db, user) = setup();
        let w1 = db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();
        let w2 = db.insert_workout(&ride(user, 2, 15.0, 90)).unwrap();

        let fd = db
            .get_record(user, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd.workout_id, w2.id);
        assert_eq!(fd.value, RecordValue::Distance(15.0));

        db.update_workout(
            w2.id,
            &UpdateWorkout {
                distance: Some(5.0),
                ..UpdateWorkout::default()
            },
        )
        .unwrap();

        let fd = db
            .get_record(user, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd.workout_id, w1.id);
        assert_eq!(fd.value, RecordValue::Distance(10.0));
    }

    #[test]
    fn test_reconcile_is_idempotent() {
        let (db, user) = setup();
        db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();
        db.insert_workout(&ride(user, 2, 15.0, 90)).unwrap();

        let again = reconcile(db.connection(), user, CYCLING).unwrap();
        assert_eq!(again.writes(), 0);
        let third = reconcile(db.connection(), user, CYCLING).unwrap();
        assert_eq!(third, ReconcileOutcome::default());
    }

    #[test]
    fn test_tie_goes_to_earliest_workout() {
        let (db, user) = setup();
        let late = db.insert_workout(&ride(user, 20, 12.0, 60)).unwrap();
        let early = db.insert_workout(&ride(user, 3, 12.0, 60)).unwrap();

        let fd = db
            .get_record(user, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd.workout_id, early.id);
        assert_ne!(fd.workout_id, late.id);
        assert_eq!(fd.workout_date, at(3));
    }

    #[test]
    fn test_null_categories_have_no_record() {
        let (db, user) = setup();
        db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();

        assert!(
            db.get_record(user, CYCLING, RecordType::HighestAscent)
                .unwrap()
                .is_none()
        );
        // Distance, duration and both speeds qualify.
        assert_eq!(db.get_records(user, Some(CYCLING)).unwrap().len(), 4);
    }

    #[test]
    fn test_clearing_last_value_deletes_record() {
        let (db, user) = setup();
        let mut new = ride(user, 1, 10.0, 60);
        new.metrics.ascent = Some(250.0);
        let w = db.insert_workout(&new).unwrap();
        assert!(
            db.get_record(user, CYCLING, RecordType::HighestAscent)
                .unwrap()
                .is_some()
        );

        db.update_workout(
            w.id,
            &UpdateWorkout {
                ascent: Some(None),
                ..UpdateWorkout::default()
            },
        )
        .unwrap();
        assert!(
            db.get_record(user, CYCLING, RecordType::HighestAscent)
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn test_reconcile_repairs_tampered_row() {
        let (db, user) = setup();
        let w1 = db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();
        db.insert_workout(&ride(user, 2, 8.0, 30)).unwrap();

        db.connection()
            .execute(
                "UPDATE records SET value = 1 WHERE record_type = 'FD'",
                [],
            )
            .unwrap();
        let outcome = reconcile(db.connection(), user, CYCLING).unwrap();
        assert_eq!(outcome.updated, 1);
        let fd = db
            .get_record(user, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd.workout_id, w1.id);
        assert_eq!(fd.value, RecordValue::Distance(10.0));
    }

    #[test]
    fn test_records_are_per_user() {
        let (db, sam) = setup();
        let alex = db.create_user("alex").unwrap().id;
        db.insert_workout(&ride(sam, 1, 10.0, 60)).unwrap();
        let theirs = db.insert_workout(&ride(alex, 1, 50.0, 120)).unwrap();

        let fd_sam = db
            .get_record(sam, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd_sam.value, RecordValue::Distance(10.0));
        let fd_alex = db
            .get_record(alex, CYCLING, RecordType::FarthestDistance)
            .unwrap()
            .unwrap();
        assert_eq!(fd_alex.workout_id, theirs.id);
    }

    #[test]
    fn test_rebuild_for_user_restores_deleted_rows() {
        let (db, user) = setup();
        db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();
        let mut run = ride(user, 2, 5.0, 30);
        run.sport_id = RUNNING;
        db.insert_workout(&run).unwrap();

        db.connection().execute("DELETE FROM records", []).unwrap();
        let outcome = rebuild_for_user(db.connection(), user).unwrap();
        assert_eq!(outcome.inserted, 8);
        assert_eq!(rebuild_for_user(db.connection(), user).unwrap().writes(), 0);
    }

    #[test]
    fn test_sports_with_records_for_workout() {
        let (db, user) = setup();
        let w = db.insert_workout(&ride(user, 1, 10.0, 60)).unwrap();
        assert_eq!(
            sports_with_records_for_workout(db.connection(), w.id).unwrap(),
            vec![CYCLING]
        );
    }
}
