use anyhow::{Context, Result, bail};
use chrono::{Local, NaiveDate, NaiveDateTime, TimeDelta, Timelike};
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use stride_core::db::Database;
use stride_core::models::{User, Workout, format_duration};

/// Parse a workout date. Accepts "now", "today", "yesterday", "YYYY-MM-DD"
/// (midnight), "YYYY-MM-DD HH:MM[:SS]" and the same with a `T` separator.
/// Defaults to now.
pub(crate) fn parse_datetime(date_str: Option<String>) -> Result<NaiveDateTime> {
    let now = Local::now().naive_local();
    let now = now.with_nanosecond(0).unwrap_or(now);
    let Some(s) = date_str else {
        return Ok(now);
    };
    let s = s.trim();
    match s {
        "now" | "today" => return Ok(now),
        "yesterday" => return Ok(now - TimeDelta::days(1)),
        _ => {}
    }
    for format in [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
            return Ok(dt);
        }
    }
    let date = NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| {
        format!("Invalid date '{s}'. Use YYYY-MM-DD [HH:MM[:SS]] or today/yesterday")
    })?;
    date.and_hms_opt(0, 0, 0).with_context(|| format!("Invalid date '{s}'"))
}

pub(crate) fn resolve_user(db: &Database, username: Option<&str>) -> Result<User> {
    let Some(username) = username else {
        bail!("No user given. Pass --user <NAME> or set STRIDE_USER");
    };
    db.get_user_by_name(username)
}

pub(crate) fn print_workout_table(db: &Database, workouts: &[Workout]) -> Result<()> {
    #[derive(Tabled)]
    struct WorkoutRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Date")]
        date: String,
        #[tabled(rename = "Sport")]
        sport: String,
        #[tabled(rename = "Title")]
        title: String,
        #[tabled(rename = "Km")]
        distance: String,
        #[tabled(rename = "Moving")]
        moving: String,
        #[tabled(rename = "Avg km/h")]
        ave_speed: String,
        #[tabled(rename = "Ascent m")]
        ascent: String,
        #[tabled(rename = "Gear")]
        gear: String,
    }

    let sports = db.list_sports()?;
    let rows: Vec<WorkoutRow> = workouts
        .iter()
        .map(|w| WorkoutRow {
            id: w.id,
            date: w.workout_date.format("%Y-%m-%d %H:%M").to_string(),
            sport: sports
                .iter()
                .find(|s| s.id == w.sport_id)
                .map_or_else(|| w.sport_id.to_string(), |s| truncate(&s.label, 20)),
            title: w
                .title
                .as_deref()
                .map(|t| truncate(t, 30))
                .unwrap_or_default(),
            distance: format!("{:.2}", no_neg_zero(w.metrics.distance)),
            moving: format_duration(w.metrics.moving),
            ave_speed: w.metrics.ave_speed.map_or("-".into(), |v| format!("{v:.1}")),
            ascent: w.metrics.ascent.map_or("-".into(), |v| format!("{v:.0}")),
            gear: w
                .equipment_ids
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(4..8)).with(Alignment::right()))
        .to_string();
    println!("{table}");
    Ok(())
}

pub(crate) fn no_neg_zero(v: f64) -> f64 {
    if v == 0.0 { 0.0 } else { v }
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_datetime_none_is_now() {
        let before = Local::now().naive_local() - TimeDelta::seconds(1);
        let parsed = parse_datetime(None).unwrap();
        assert!(parsed >= before);
        assert_eq!(parsed.nanosecond(), 0);
    }

    #[test]
    fn test_parse_datetime_yesterday() {
        let parsed = parse_datetime(Some("yesterday".to_string())).unwrap();
        let expected = Local::now().naive_local() - TimeDelta::days(1);
        assert!((expected - parsed).num_seconds().abs() < 5);
    }

    #[test]
    fn test_parse_datetime_formats() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 9)
            .unwrap()
            .and_hms_opt(17, 5, 0)
            .unwrap();
        assert_eq!(
            parse_datetime(Some("2024-03-09 17:05".to_string())).unwrap(),
            expected
        );
        assert_eq!(
            parse_datetime(Some("2024-03-09T17:05:00".to_string())).unwrap(),
            expected
        );
        assert_eq!(
            parse_datetime(Some("2024-03-09".to_string())).unwrap(),
            NaiveDate::from_ymd_opt(2024, 3, 9)
                .unwrap()
                .and_hms_opt(0, 0, 0)
                .unwrap()
        );
    }

    #[test]
    fn test_parse_datetime_invalid() {
        assert!(parse_datetime(Some("last tuesday".to_string())).is_err());
    }

    #[test]
    fn test_resolve_user() {
        let db = Database::open_in_memory().unwrap();
        db.create_user("sam").unwrap();
        assert_eq!(resolve_user(&db, Some("sam")).unwrap().username, "sam");
        assert!(resolve_user(&db, Some("nobody")).is_err());
        assert!(resolve_user(&db, None).is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("Lunch ride", 20), "Lunch ride");
        assert_eq!(truncate("Cycling (Transport) to work", 10), "Cycling...");
    }

    #[test]
    fn test_no_neg_zero() {
        assert_eq!(no_neg_zero(-0.0).to_bits(), 0.0_f64.to_bits());
        assert_eq!(no_neg_zero(5.0), 5.0);
    }
}
