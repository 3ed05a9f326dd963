use anyhow::{Context, Result, bail};
use chrono::NaiveDateTime;

use crate::db::Database;
use crate::models::{
    Equipment, NewEquipment, NewWorkout, User, Workout, WorkoutMetrics, WorkoutRecord,
};

/// Turns a recorded activity (a GPX file, a device export) into workout
/// metrics.
///
/// Called synchronously; implementations that parse large files should be
/// driven from a worker thread by the caller.
pub trait WorkoutMetricsSource: Send + Sync {
    fn compute(&self, source: &str) -> Result<WorkoutMetrics>;
}

pub struct StrideService {
    db: Database,
}

/// What a new workout needs beyond its computed metrics.
#[derive(Debug, Clone)]
pub struct WorkoutDraft {
    pub user_id: i64,
    pub sport_id: i64,
    pub title: Option<String>,
    pub workout_date: NaiveDateTime,
    pub equipment_ids: Vec<i64>,
}

impl StrideService {
    pub fn new_in_memory() -> Result<Self> {
        let db = Database::open_in_memory()?;
        Ok(Self { db })
    }

    #[must_use]
    pub fn from_database(db: Database) -> Self {
        Self { db }
    }

    #[must_use]
    pub fn database(&self) -> &Database {
        &self.db
    }

    // --- Source-driven workouts ---

    pub fn create_workout_from_source(
        &self,
        source_provider: &dyn WorkoutMetricsSource,
        source: &str,
        draft: WorkoutDraft,
    ) -> Result<Workout> {
        let metrics = source_provider
            .compute(source)
            .with_context(|| format!("Failed to process '{source}'"))?;
        self.db.insert_workout(&NewWorkout {
            user_id: draft.user_id,
            sport_id: draft.sport_id,
            title: draft.title,
            workout_date: draft.workout_date,
            metrics,
            source_file: Some(source.to_string()),
            equipment_ids: draft.equipment_ids,
        })
    }

    /// Re-reads a workout's source file and replaces its metrics.
    pub fn reprocess_workout(
        &self,
        source_provider: &dyn WorkoutMetricsSource,
        workout_id: i64,
    ) -> Result<Workout> {
        let workout = self.db.get_workout(workout_id)?;
        let Some(source) = workout.source_file else {
            bail!("Workout {workout_id} has no source file to reprocess");
        };
        let metrics = source_provider
            .compute(&source)
            .with_context(|| format!("Failed to reprocess '{source}'"))?;
        self.db.update_workout_metrics(workout_id, metrics)
    }

    // --- Direct DB operations ---

    pub fn create_user(&self, username: &str) -> Result<User> {
        self.db.create_user(username)
    }

    pub fn list_workouts(&self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<Workout>> {
        self.db.list_workouts(user_id, sport_id)
    }

    pub fn add_equipment(
        &self,
        user_id: i64,
        label: &str,
        description: Option<String>,
    ) -> Result<Equipment> {
        self.db.insert_equipment(&NewEquipment {
            user_id,
            label: label.to_string(),
            description,
        })
    }

    pub fn get_records(&self, user_id: i64, sport_id: Option<i64>) -> Result<Vec<WorkoutRecord>> {
        self.db.get_records(user_id, sport_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RecordType, RecordValue};
    use chrono::{NaiveDate, TimeDelta};
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Serves canned metrics per source path; missing paths fail like an
    /// unreadable file.
    struct MockSource {
        metrics: Mutex<HashMap<String, WorkoutMetrics>>,
    }

    impl MockSource {
        fn new() -> Self {
            Self {
                metrics: Mutex::new(HashMap::new()),
            }
        }

        fn set(&self, source: &str, distance: f64, minutes: i64) {
            self.metrics.lock().unwrap().insert(
                source.to_string(),
                WorkoutMetrics::basic(
                    distance,
                    TimeDelta::minutes(minutes),
                    TimeDelta::minutes(minutes),
                ),
            );
        }
    }

    impl WorkoutMetricsSource for MockSource {
        fn compute(&self, source: &str) -> Result<WorkoutMetrics> {
            self.metrics
                .lock()
                .unwrap()
                .get(source)
                .cloned()
                .with_context(|| format!("{source}: no such file"))
        }
    }

    fn draft(user_id: i64, equipment_ids: Vec<i64>) -> WorkoutDraft {
        WorkoutDraft {
            user_id,
            sport_id: 1,
            title: Some("Morning ride".to_string()),
            workout_date: NaiveDate::from_ymd_opt(2024, 7, 14)
                .unwrap()
                .and_hms_opt(6, 45, 0)
                .unwrap(),
            equipment_ids,
        }
    }

    #[test]
    fn test_create_from_source_maintains_aggregates() {
        let svc = StrideService::new_in_memory().unwrap();
        let user = svc.create_user("sam").unwrap().id;
        let bike = svc.add_equipment(user, "Road bike", None).unwrap().id;
        let source = MockSource::new();
        source.set("rides/0714.gpx", 42.0, 95);

        let w = svc
            .create_workout_from_source(&source, "rides/0714.gpx", draft(user, vec![bike]))
            .unwrap();
        assert_eq!(w.source_file.as_deref(), Some("rides/0714.gpx"));
        assert_eq!(w.metrics.distance, 42.0);

        let records = svc.get_records(user, Some(1)).unwrap();
        assert!(
            records
                .iter()
                .any(|r| r.record_type == RecordType::FarthestDistance
                    && r.value == RecordValue::Distance(42.0))
        );
        let bike = svc.database().get_equipment(bike).unwrap();
        assert_eq!(bike.total_distance, 42.0);
        assert_eq!(bike.total_workouts, 1);
    }

    #[test]
    fn test_reprocess_applies_new_metrics() {
        let svc = StrideService::new_in_memory().unwrap();
        let user = svc.create_user("sam").unwrap().id;
        let bike = svc.add_equipment(user, "Road bike", None).unwrap().id;
        let source = MockSource::new();
        source.set("a.gpx", 20.0, 60);
        let w = svc
            .create_workout_from_source(&source, "a.gpx", draft(user, vec![bike]))
            .unwrap();

        source.set("a.gpx", 21.5, 64);
        let w = svc.reprocess_workout(&source, w.id).unwrap();
        assert_eq!(w.metrics.distance, 21.5);
        assert_eq!(w.metrics.moving, TimeDelta::minutes(64));

        let bike = svc.database().get_equipment(bike).unwrap();
        assert_eq!(bike.total_distance, 21.5);
        assert_eq!(bike.total_moving, TimeDelta::minutes(64));
        assert_eq!(bike.total_workouts, 1);
    }

    #[test]
    fn test_source_failure_creates_nothing() {
        let svc = StrideService::new_in_memory().unwrap();
        let user = svc.create_user("sam").unwrap().id;
        let source = MockSource::new();

        let err = svc
            .create_workout_from_source(&source, "missing.gpx", draft(user, vec![]))
            .unwrap_err();
        assert!(format!("{err:#}").contains("missing.gpx"));
        assert!(svc.list_workouts(user, None).unwrap().is_empty());
    }

    #[test]
    fn test_reprocess_without_source_file() {
        let svc = StrideService::new_in_memory().unwrap();
        let user = svc.create_user("sam").unwrap().id;
        let d = draft(user, vec![]);
        let w = svc
            .database()
            .insert_workout(&NewWorkout {
                user_id: d.user_id,
                sport_id: d.sport_id,
                title: d.title,
                workout_date: d.workout_date,
                metrics: WorkoutMetrics::basic(5.0, TimeDelta::minutes(30), TimeDelta::minutes(30)),
                source_file: None,
                equipment_ids: vec![],
            })
            .unwrap();
        assert!(svc.reprocess_workout(&MockSource::new(), w.id).is_err());
    }
}
