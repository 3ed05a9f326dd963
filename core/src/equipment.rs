//! Running usage totals per equipment item.
//!
//! Totals live in fixed point (distance in metres, spans in seconds) and
//! change only through signed deltas produced here: attaching or detaching a
//! workout, or editing the metrics of an attached one.

use std::ops::Neg;

use rusqlite::{Connection, OptionalExtension, params};
use tracing::{debug, warn};

use crate::codec::{encode_distance, encode_span};
use crate::error::AggregateError;
use crate::models::WorkoutMetrics;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TotalsDelta {
    pub distance: i64,
    pub duration: i64,
    pub moving: i64,
    pub workouts: i64,
}

impl TotalsDelta {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }

    /// Field-wise sum, or the name of the first field that overflows.
    pub fn checked_add(self, other: Self) -> Result<Self, &'static str> {
        Ok(Self {
            distance: self
                .distance
                .checked_add(other.distance)
                .ok_or("total_distance")?,
            duration: self
                .duration
                .checked_add(other.duration)
                .ok_or("total_duration")?,
            moving: self.moving.checked_add(other.moving).ok_or("total_moving")?,
            workouts: self
                .workouts
                .checked_add(other.workouts)
                .ok_or("total_workouts")?,
        })
    }

    fn contribution(metrics: &WorkoutMetrics) -> Self {
        Self {
            distance: encode_distance(metrics.distance),
            duration: encode_span(metrics.duration),
            moving: encode_span(metrics.moving),
            workouts: 1,
        }
    }
}

impl Neg for TotalsDelta {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            distance: -self.distance,
            duration: -self.duration,
            moving: -self.moving,
            workouts: -self.workouts,
        }
    }
}

/// The workout's distance, duration, moving time and one workout.
#[must_use]
pub fn on_attach(metrics: &WorkoutMetrics) -> TotalsDelta {
    TotalsDelta::contribution(metrics)
}

#[must_use]
pub fn on_detach(metrics: &WorkoutMetrics) -> TotalsDelta {
    -TotalsDelta::contribution(metrics)
}

/// `new - old` for distance, duration and moving time; the workout count is
/// unaffected. `None` when none of the three changed.
#[must_use]
pub fn on_metrics_changed(old: &WorkoutMetrics, new: &WorkoutMetrics) -> Option<TotalsDelta> {
    let (new, old) = (TotalsDelta::contribution(new), TotalsDelta::contribution(old));
    let delta = TotalsDelta {
        distance: new.distance - old.distance,
        duration: new.duration - old.duration,
        moving: new.moving - old.moving,
        workouts: 0,
    };
    (!delta.is_zero()).then_some(delta)
}

/// Adds `delta` to the stored totals, clamping every field at zero.
pub fn apply(
    conn: &Connection,
    equipment_id: i64,
    delta: TotalsDelta,
) -> Result<(), AggregateError> {
    if delta.is_zero() {
        return Ok(());
    }
    let current = load_totals(conn, equipment_id)?;
    let next = TotalsDelta {
        distance: clamped(equipment_id, "total_distance", current.distance, delta.distance)?,
        duration: clamped(equipment_id, "total_duration", current.duration, delta.duration)?,
        moving: clamped(equipment_id, "total_moving", current.moving, delta.moving)?,
        workouts: clamped(equipment_id, "total_workouts", current.workouts, delta.workouts)?,
    };
    store_totals(conn, equipment_id, next)?;
    debug!(
        equipment_id,
        distance = delta.distance,
        duration = delta.duration,
        moving = delta.moving,
        workouts = delta.workouts,
        "adjusted equipment totals"
    );
    Ok(())
}

/// Recomputes totals from the currently associated workouts and returns the
/// correction that was applied.
pub fn recompute(conn: &Connection, equipment_id: i64) -> Result<TotalsDelta, AggregateError> {
    let current = load_totals(conn, equipment_id)?;

    let mut stmt = conn.prepare(
        "SELECT w.distance, w.duration, w.moving
         FROM workout_equipment we JOIN workouts w ON w.id = we.workout_id
         WHERE we.equipment_id = ?1",
    )?;
    let expected = stmt
        .query_map(params![equipment_id], |row| {
            let distance: f64 = row.get(0)?;
            Ok(TotalsDelta {
                distance: encode_distance(distance),
                duration: row.get(1)?,
                moving: row.get(2)?,
                workouts: 1,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?
        .into_iter()
        .try_fold(TotalsDelta::default(), TotalsDelta::checked_add)
        .map_err(|field| AggregateError::EquipmentTotalsOverflow {
            equipment_id,
            field,
        })?;

    let correction = TotalsDelta {
        distance: expected.distance - current.distance,
        duration: expected.duration - current.duration,
        moving: expected.moving - current.moving,
        workouts: expected.workouts - current.workouts,
    };
    if !correction.is_zero() {
        store_totals(conn, equipment_id, expected)?;
        warn!(
            equipment_id,
            distance = correction.distance,
            duration = correction.duration,
            moving = correction.moving,
            workouts = correction.workouts,
            "equipment totals were out of step and have been recomputed"
        );
    }
    Ok(correction)
}

fn clamped(
    equipment_id: i64,
    field: &'static str,
    current: i64,
    delta: i64,
) -> Result<i64, AggregateError> {
    let next = current
        .checked_add(delta)
        .ok_or(AggregateError::EquipmentTotalsOverflow {
            equipment_id,
            field,
        })?;
    if next >= 0 {
        return Ok(next);
    }
    let issue = AggregateError::EquipmentTotalsInconsistency {
        equipment_id,
        field,
        current,
        delta,
    };
    warn!(equipment_id, field, current, delta, "{issue}");
    Ok(0)
}

fn load_totals(conn: &Connection, equipment_id: i64) -> Result<TotalsDelta, AggregateError> {
    conn.query_row(
        "SELECT total_distance, total_duration, total_moving, total_workouts
         FROM equipment WHERE id = ?1",
        params![equipment_id],
        |row| {
            Ok(TotalsDelta {
                distance: row.get(0)?,
                duration: row.get(1)?,
                moving: row.get(2)?,
                workouts: row.get(3)?,
            })
        },
    )
    .optional()?
    .ok_or(AggregateError::NotFound("Equipment", equipment_id))
}

fn store_totals(
    conn: &Connection,
    equipment_id: i64,
    totals: TotalsDelta,
) -> Result<(), AggregateError> {
    conn.execute(
        "UPDATE equipment SET total_distance = ?1, total_duration = ?2, total_moving = ?3,
         total_workouts = ?4 WHERE id = ?5",
        params![
            totals.distance,
            totals.duration,
            totals.moving,
            totals.workouts,
            equipment_id
        ],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{NewEquipment, NewWorkout, UpdateWorkout};
    use chrono::{NaiveDate, TimeDelta};

    fn metrics(distance: f64, minutes: i64) -> WorkoutMetrics {
        WorkoutMetrics::basic(
            distance,
            TimeDelta::minutes(minutes),
            TimeDelta::minutes(minutes),
        )
    }

    fn setup() -> (Database, i64, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("sam").unwrap().id;
        let bike = db
            .insert_equipment(&NewEquipment {
                user_id: user,
                label: "Gravel bike".to_string(),
                description: None,
            })
            .unwrap();
        (db, user, bike.id)
    }

    fn ride(user_id: i64, distance: f64, minutes: i64) -> NewWorkout {
        NewWorkout {
            user_id,
            sport_id: 1,
            title: None,
            workout_date: NaiveDate::from_ymd_opt(2024, 6, 1)
                .unwrap()
                .and_hms_opt(7, 30, 0)
                .unwrap(),
            metrics: metrics(distance, minutes),
            source_file: None,
            equipment_ids: Vec::new(),
        }
    }

    #[test]
    fn test_attach_then_detach_returns_to_zero() {
        let (db, user, bike) = setup();
        let w1 = db.insert_workout(&ride(user, 10.0, 60)).unwrap();

        db.attach_equipment(w1.id, bike).unwrap();
        let e = db.get_equipment(bike).unwrap();
        assert_eq!(e.total_distance, 10.0);
        assert_eq!(e.total_duration, TimeDelta::hours(1));
        assert_eq!(e.total_moving, TimeDelta::hours(1));
        assert_eq!(e.total_workouts, 1);

        db.detach_equipment(w1.id, bike).unwrap();
        let e = db.get_equipment(bike).unwrap();
        assert_eq!(e.total_distance, 0.0);
        assert_eq!(e.total_duration, TimeDelta::zero());
        assert_eq!(e.total_moving, TimeDelta::zero());
        assert_eq!(e.total_workouts, 0);
    }

    #[test]
    fn test_metric_edit_shifts_totals_by_difference() {
        let (db, user, bike) = setup();
        let mut new = ride(user, 10.0, 60);
        new.equipment_ids = vec![bike];
        let w = db.insert_workout(&new).unwrap();
        let mut other = ride(user, 2.5, 15);
        other.equipment_ids = vec![bike];
        db.insert_workout(&other).unwrap();

        db.update_workout(
            w.id,
            &UpdateWorkout {
                distance: Some(12.25),
                moving: Some(TimeDelta::minutes(55)),
                ..UpdateWorkout::default()
            },
        )
        .unwrap();

        let e = db.get_equipment(bike).unwrap();
        assert_eq!(e.total_distance, 14.75);
        assert_eq!(e.total_duration, TimeDelta::minutes(75));
        assert_eq!(e.total_moving, TimeDelta::minutes(70));
        assert_eq!(e.total_workouts, 2);
    }

    #[test]
    fn test_unchanged_metrics_produce_no_delta() {
        let m = metrics(10.0, 60);
        assert_eq!(on_metrics_changed(&m, &m.clone()), None);
        let faster = WorkoutMetrics {
            max_speed: Some(40.0),
            ..m.clone()
        };
        // Speeds do not feed equipment totals.
        assert_eq!(on_metrics_changed(&m, &faster), None);
    }

    #[test]
    fn test_attach_and_detach_are_opposites() {
        let m = metrics(7.5, 40);
        assert!(on_attach(&m).checked_add(on_detach(&m)).unwrap().is_zero());
        assert_eq!(on_attach(&m).workouts, 1);
        assert_eq!(on_detach(&m).distance, -7500);
    }

    #[test]
    fn test_negative_totals_are_clamped() {
        let (db, user, bike) = setup();
        let w = db.insert_workout(&ride(user, 10.0, 60)).unwrap();
        db.attach_equipment(w.id, bike).unwrap();

        // Simulate an earlier missed update.
        db.connection()
            .execute(
                "UPDATE equipment SET total_distance = 4000, total_workouts = 0 WHERE id = ?1",
                params![bike],
            )
            .unwrap();

        db.detach_equipment(w.id, bike).unwrap();
        let e = db.get_equipment(bike).unwrap();
        assert_eq!(e.total_distance, 0.0);
        assert_eq!(e.total_workouts, 0);
        assert_eq!(e.total_duration, TimeDelta::zero());
    }

    #[test]
    fn test_recompute_restores_exact_sums() {
        let (db, user, bike) = setup();
        for (distance, minutes) in [(0.1, 10), (0.2, 20), (0.3, 30)] {
            let mut new = ride(user, distance, minutes);
            new.equipment_ids = vec![bike];
            db.insert_workout(&new).unwrap();
        }
        let correction = recompute(db.connection(), bike).unwrap();
        assert!(correction.is_zero());

        db.connection()
            .execute("UPDATE equipment SET total_distance = 0 WHERE id = ?1", params![bike])
            .unwrap();
        let correction = recompute(db.connection(), bike).unwrap();
        assert_eq!(correction.distance, 600);
        assert_eq!(db.get_equipment(bike).unwrap().total_distance, 0.6);
    }

    #[test]
    fn test_apply_unknown_equipment() {
        let (db, _, _) = setup();
        let err = apply(
            db.connection(),
            999,
            on_attach(&metrics(1.0, 5)),
        )
        .unwrap_err();
        assert!(matches!(err, AggregateError::NotFound("Equipment", 999)));
    }
}
