//! Routes a classified workout mutation to the records and equipment
//! maintainers.
//!
//! Work is not executed immediately: `dispatch` only queues it on a
//! [`UnitOfWork`], which the storage layer flushes once, deduplicated, just
//! before the enclosing transaction commits.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use rusqlite::Connection;
use tracing::debug;

use crate::codec;
use crate::equipment::{self, TotalsDelta};
use crate::error::AggregateError;
use crate::models::{RecordType, Workout, WorkoutMetrics};
use crate::records::{self, ReconcileOutcome};

/// The fields of a workout the aggregates depend on, captured before or
/// after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkoutSnapshot {
    pub user_id: i64,
    pub sport_id: i64,
    pub workout_date: NaiveDateTime,
    pub metrics: WorkoutMetrics,
    pub equipment_ids: Vec<i64>,
}

impl From<&Workout> for WorkoutSnapshot {
    fn from(w: &Workout) -> Self {
        Self {
            user_id: w.user_id,
            sport_id: w.sport_id,
            workout_date: w.workout_date,
            metrics: w.metrics.clone(),
            equipment_ids: w.equipment_ids.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum WorkoutMutation {
    Created(WorkoutSnapshot),
    Updated {
        before: WorkoutSnapshot,
        after: WorkoutSnapshot,
    },
    Deleted {
        before: WorkoutSnapshot,
        /// Sports the workout held a record in at deletion time.
        held_record_sports: Vec<i64>,
    },
}

/// Pending aggregate work for one transaction.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    records: BTreeSet<(i64, i64)>,
    equipment: BTreeMap<i64, TotalsDelta>,
}

impl UnitOfWork {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule_records(&mut self, user_id: i64, sport_id: i64) {
        self.records.insert((user_id, sport_id));
    }

    /// Accumulates a totals adjustment; opposite deltas for the same item cancel out.
    pub fn adjust_equipment(
        &mut self,
        equipment_id: i64,
        delta: TotalsDelta,
    ) -> Result<(), AggregateError> {
        let pending = self.equipment.entry(equipment_id).or_default();
        *pending = pending
            .checked_add(delta)
            .map_err(|field| AggregateError::EquipmentTotalsOverflow {
                equipment_id,
                field,
            })?;
        Ok(())
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.equipment.values().all(TotalsDelta::is_zero)
    }

    pub fn pending_records(&self) -> impl Iterator<Item = (i64, i64)> + '_ {
        self.records.iter().copied()
    }

    #[must_use]
    pub fn pending_equipment(&self, equipment_id: i64) -> Option<TotalsDelta> {
        self.equipment
            .get(&equipment_id)
            .copied()
            .filter(|d| !d.is_zero())
    }

    /// Runs every queued reconciliation and totals adjustment exactly once.
    pub fn flush(self, conn: &Connection) -> Result<(), AggregateError> {
        let mut writes = ReconcileOutcome::default();
        for (user_id, sport_id) in &self.records {
            writes += records::reconcile(conn, *user_id, *sport_id)?;
        }
        let mut adjusted = 0;
        for (equipment_id, delta) in self.equipment {
            if delta.is_zero() {
                continue;
            }
            equipment::apply(conn, equipment_id, delta)?;
            adjusted += 1;
        }
        debug!(
            reconciled = self.records.len(),
            record_writes = writes.writes(),
            equipment_adjusted = adjusted,
            "flushed aggregate updates"
        );
        Ok(())
    }
}

/// Queues the aggregate work a mutation requires.
///
/// Fails with [`AggregateError::WorkoutHasAssociatedEquipment`] when a
/// workout is deleted with equipment still attached.
pub fn dispatch(uow: &mut UnitOfWork, mutation: &WorkoutMutation) -> Result<(), AggregateError> {
    match mutation {
        WorkoutMutation::Created(after) => {
            uow.schedule_records(after.user_id, after.sport_id);
            for id in &after.equipment_ids {
                uow.adjust_equipment(*id, equipment::on_attach(&after.metrics))?;
            }
        }
        WorkoutMutation::Updated { before, after } => {
            if before.sport_id != after.sport_id {
                uow.schedule_records(before.user_id, before.sport_id);
                uow.schedule_records(after.user_id, after.sport_id);
            } else if records_affected(before, after) {
                uow.schedule_records(after.user_id, after.sport_id);
            }
            dispatch_equipment(uow, before, after)?;
        }
        WorkoutMutation::Deleted {
            before,
            held_record_sports,
        } => {
            if !before.equipment_ids.is_empty() {
                return Err(AggregateError::WorkoutHasAssociatedEquipment { count: 1 });
            }
            uow.schedule_records(before.user_id, before.sport_id);
            for sport_id in held_record_sports {
                uow.schedule_records(before.user_id, *sport_id);
            }
        }
    }
    Ok(())
}

fn dispatch_equipment(
    uow: &mut UnitOfWork,
    before: &WorkoutSnapshot,
    after: &WorkoutSnapshot,
) -> Result<(), AggregateError> {
    let old: BTreeSet<i64> = before.equipment_ids.iter().copied().collect();
    let new: BTreeSet<i64> = after.equipment_ids.iter().copied().collect();

    for id in old.difference(&new) {
        uow.adjust_equipment(*id, equipment::on_detach(&before.metrics))?;
    }
    for id in new.difference(&old) {
        uow.adjust_equipment(*id, equipment::on_attach(&after.metrics))?;
    }
    if let Some(delta) = equipment::on_metrics_changed(&before.metrics, &after.metrics) {
        for id in old.intersection(&new) {
            uow.adjust_equipment(*id, delta)?;
        }
    }
    Ok(())
}

/// A record can move when any category value changes, or when the date does:
/// it breaks ties and is stored on the record.
fn records_affected(before: &WorkoutSnapshot, after: &WorkoutSnapshot) -> bool {
    before.workout_date != after.workout_date
        || RecordType::ALL.into_iter().any(|t| {
            codec::encoded_value_of(t, &before.metrics) != codec::encoded_value_of(t, &after.metrics)
        })
}
