use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::codec;
use stride_core::db::Database;
use stride_core::models::{NewEquipment, User, format_duration};

use super::helpers::{no_neg_zero, truncate};

pub(crate) fn cmd_equipment_add(
    db: &Database,
    user: &User,
    label: &str,
    description: Option<String>,
    json: bool,
) -> Result<()> {
    let equipment = db.insert_equipment(&NewEquipment {
        user_id: user.id,
        label: label.to_string(),
        description,
    })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&equipment)?);
    } else {
        println!("Added equipment '{}' (ID: {})", equipment.label, equipment.id);
    }

    Ok(())
}

pub(crate) fn cmd_equipment_list(db: &Database, user: &User, json: bool) -> Result<()> {
    let items = db.list_equipment(user.id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&items)?);
        return Ok(());
    }
    if items.is_empty() {
        eprintln!("No equipment found. Use `stride equipment add` to register some.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct EquipmentRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Label")]
        label: String,
        #[tabled(rename = "Workouts")]
        workouts: i64,
        #[tabled(rename = "Km")]
        distance: String,
        #[tabled(rename = "Duration")]
        duration: String,
        #[tabled(rename = "Moving")]
        moving: String,
        #[tabled(rename = "Active")]
        active: &'static str,
    }

    let rows: Vec<EquipmentRow> = items
        .iter()
        .map(|e| EquipmentRow {
            id: e.id,
            label: truncate(&e.label, 30),
            workouts: e.total_workouts,
            distance: format!("{:.3}", no_neg_zero(e.total_distance)),
            duration: format_duration(e.total_duration),
            moving: format_duration(e.total_moving),
            active: if e.is_active { "yes" } else { "retired" },
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..6)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_equipment_attach(
    db: &Database,
    workout_id: i64,
    equipment_id: i64,
    json: bool,
) -> Result<()> {
    let workout = db.attach_equipment(workout_id, equipment_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!("Attached equipment {equipment_id} to workout {workout_id}");
    }

    Ok(())
}

pub(crate) fn cmd_equipment_detach(
    db: &Database,
    workout_id: i64,
    equipment_id: i64,
    json: bool,
) -> Result<()> {
    let workout = db.detach_equipment(workout_id, equipment_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&workout)?);
    } else {
        println!("Detached equipment {equipment_id} from workout {workout_id}");
    }

    Ok(())
}

pub(crate) fn cmd_equipment_set_active(
    db: &Database,
    equipment_id: i64,
    active: bool,
    json: bool,
) -> Result<()> {
    let equipment = db.set_equipment_active(equipment_id, active)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&equipment)?);
    } else if active {
        println!("Reactivated '{}'", equipment.label);
    } else {
        println!("Retired '{}'", equipment.label);
    }

    Ok(())
}

pub(crate) fn cmd_equipment_refresh(db: &Database, equipment_id: i64, json: bool) -> Result<()> {
    let correction = db.refresh_equipment_totals(equipment_id)?;
    let equipment = db.get_equipment(equipment_id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "equipment": equipment,
                "corrected": !correction.is_zero(),
            })
        );
    } else if correction.is_zero() {
        println!("Totals for '{}' were already up to date", equipment.label);
    } else {
        println!(
            "Recomputed totals for '{}': {:+.3} km, {:+} workout(s)",
            equipment.label,
            codec::decode_distance(correction.distance),
            correction.workouts
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, TimeDelta};
    use stride_core::models::{NewWorkout, WorkoutMetrics};

    fn setup() -> (Database, User, i64) {
        let db = Database::open_in_memory().unwrap();
        let user = db.create_user("sam").unwrap();
        let w = db
            .insert_workout(&NewWorkout {
                user_id: user.id,
                sport_id: 3,
                title: Some("Ridge loop".to_string()),
                workout_date: NaiveDate::from_ymd_opt(2024, 9, 1)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap(),
                metrics: WorkoutMetrics::basic(14.0, TimeDelta::hours(5), TimeDelta::hours(4)),
                source_file: None,
                equipment_ids: vec![],
            })
            .unwrap();
        (db, user, w.id)
    }

    #[test]
    fn test_attach_detach_through_commands() {
        let (db, user, workout) = setup();
        cmd_equipment_add(&db, &user, "Boots", Some("Leather".to_string()), false).unwrap();
        let boots = db.list_equipment(user.id).unwrap()[0].id;

        cmd_equipment_attach(&db, workout, boots, false).unwrap();
        let e = db.get_equipment(boots).unwrap();
        assert_eq!(e.total_distance, 14.0);
        assert_eq!(e.total_duration, TimeDelta::hours(5));
        assert_eq!(e.total_moving, TimeDelta::hours(4));

        cmd_equipment_list(&db, &user, false).unwrap();
        cmd_equipment_detach(&db, workout, boots, true).unwrap();
        assert_eq!(db.get_equipment(boots).unwrap().total_workouts, 0);
    }

    #[test]
    fn test_retired_equipment_is_refused() {
        let (db, user, workout) = setup();
        cmd_equipment_add(&db, &user, "Old boots", None, false).unwrap();
        let boots = db.list_equipment(user.id).unwrap()[0].id;
        cmd_equipment_set_active(&db, boots, false, false).unwrap();
        assert!(cmd_equipment_attach(&db, workout, boots, false).is_err());
        cmd_equipment_set_active(&db, boots, true, true).unwrap();
        cmd_equipment_attach(&db, workout, boots, false).unwrap();
    }

    #[test]
    fn test_refresh_repairs_drift() {
        let (db, user, workout) = setup();
        cmd_equipment_add(&db, &user, "Poles", None, false).unwrap();
        let poles = db.list_equipment(user.id).unwrap()[0].id;
        cmd_equipment_attach(&db, workout, poles, false).unwrap();

        db.connection()
            .execute(
                "UPDATE equipment SET total_distance = 1, total_workouts = 7 WHERE id = ?1",
                [poles],
            )
            .unwrap();
        cmd_equipment_refresh(&db, poles, false).unwrap();

        let e = db.get_equipment(poles).unwrap();
        assert_eq!(e.total_distance, 14.0);
        assert_eq!(e.total_workouts, 1);
    }
}
