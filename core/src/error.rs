use thiserror::Error;

/// Failures raised while keeping records and equipment totals in step with workouts.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// Storage failed while scanning or writing records. Fatal: the enclosing
    /// transaction is rolled back.
    #[error("Failed to reconcile records for user {user_id}, sport {sport_id}: {source}")]
    RecordReconciliation {
        user_id: i64,
        sport_id: i64,
        #[source]
        source: rusqlite::Error,
    },

    /// An adjustment would have driven an equipment total below zero. Only
    /// ever logged; the total is clamped at zero.
    #[error(
        "Equipment {equipment_id} {field} would go negative ({current} + {delta}), clamped to 0"
    )]
    EquipmentTotalsInconsistency {
        equipment_id: i64,
        field: &'static str,
        current: i64,
        delta: i64,
    },

    /// A totals adjustment left the range of the stored integers.
    #[error("Equipment {equipment_id} {field} overflowed")]
    EquipmentTotalsOverflow {
        equipment_id: i64,
        field: &'static str,
    },

    #[error(
        "{count} workout(s) still have equipment attached. Detach it first or force the deletion"
    )]
    WorkoutHasAssociatedEquipment { count: usize },

    #[error("Invalid equipment: {0}")]
    InvalidEquipment(String),

    #[error("{0} {1} not found")]
    NotFound(&'static str, i64),

    #[error(transparent)]
    Storage(#[from] rusqlite::Error),
}

impl AggregateError {
    pub(crate) fn reconciliation(user_id: i64, sport_id: i64) -> impl Fn(rusqlite::Error) -> Self {
        move |source| Self::RecordReconciliation {
            user_id,
            sport_id,
            source,
        }
    }
}
