use anyhow::Result;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::db::Database;
use stride_core::models::User;

use super::helpers::truncate;

pub(crate) fn cmd_records_show(
    db: &Database,
    user: &User,
    sport_id: Option<i64>,
    json: bool,
) -> Result<()> {
    let records = db.get_records(user.id, sport_id)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&records)?);
        return Ok(());
    }
    if records.is_empty() {
        eprintln!("No records yet. Records appear as soon as workouts are logged.");
        return Ok(());
    }

    #[derive(Tabled)]
    struct RecordRow {
        #[tabled(rename = "Sport")]
        sport: String,
        #[tabled(rename = "Record")]
        record: &'static str,
        #[tabled(rename = "Value")]
        value: String,
        #[tabled(rename = "Workout")]
        workout_id: i64,
        #[tabled(rename = "Date")]
        date: String,
    }

    let sports = db.list_sports()?;
    let rows: Vec<RecordRow> = records
        .iter()
        .map(|r| RecordRow {
            sport: sports
                .iter()
                .find(|s| s.id == r.sport_id)
                .map_or_else(|| r.sport_id.to_string(), |s| truncate(&s.label, 20)),
            record: r.record_type.label(),
            value: r.value.to_string(),
            workout_id: r.workout_id,
            date: r.workout_date.format("%Y-%m-%d").to_string(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::single(2)).with(Alignment::right()))
        .to_string();
    println!("{table}");

    Ok(())
}

pub(crate) fn cmd_records_rebuild(db: &Database, user: &User, json: bool) -> Result<()> {
    let outcome = db.rebuild_records(user.id)?;

    if json {
        println!(
            "{}",
            serde_json::json!({
                "inserted": outcome.inserted,
                "updated": outcome.updated,
                "deleted": outcome.deleted,
            })
        );
    } else if outcome.writes() == 0 {
        println!("Records for '{}' were already up to date", user.username);
    } else {
        println!(
            "Rebuilt records for '{}': {} inserted, {} updated, {} deleted",
            user.username, outcome.inserted, outcome.updated, outcome.deleted
        );
    }

    Ok(())
}
