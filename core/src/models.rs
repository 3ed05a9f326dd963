use anyhow::{Context, Result, bail};
use chrono::{NaiveDateTime, TimeDelta};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::codec;

pub const DATETIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct Sport {
    pub id: i64,
    pub label: String,
    pub is_active: bool,
}

/// Motion metrics for one workout, as entered manually or computed from a
/// source file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkoutMetrics {
    /// Kilometres.
    pub distance: f64,
    #[serde(with = "span")]
    pub duration: TimeDelta,
    #[serde(with = "span")]
    pub moving: TimeDelta,
    /// Metres.
    #[serde(default)]
    pub ascent: Option<f64>,
    #[serde(default)]
    pub descent: Option<f64>,
    /// km/h.
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub ave_speed: Option<f64>,
}

impl WorkoutMetrics {
    /// Metrics with only the mandatory fields set. Average speed is derived
    /// from distance and moving time, the way manual entries get one.
    #[must_use]
    pub fn basic(distance: f64, duration: TimeDelta, moving: TimeDelta) -> Self {
        let ave_speed = average_speed(distance, moving);
        Self {
            distance,
            duration,
            moving,
            ascent: None,
            descent: None,
            max_speed: ave_speed,
            ave_speed,
        }
    }
}

/// km/h over the moving time, `None` when there is no moving time.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn average_speed(distance: f64, moving: TimeDelta) -> Option<f64> {
    let secs = moving.num_seconds();
    if secs <= 0 {
        return None;
    }
    let speed = distance / (secs as f64 / 3600.0);
    Some((speed * 100.0).round() / 100.0)
}

#[derive(Debug, Clone, Serialize)]
pub struct Workout {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub sport_id: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub workout_date: NaiveDateTime,
    #[serde(flatten)]
    pub metrics: WorkoutMetrics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub equipment_ids: Vec<i64>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone)]
pub struct NewWorkout {
    pub user_id: i64,
    pub sport_id: i64,
    pub title: Option<String>,
    pub workout_date: NaiveDateTime,
    pub metrics: WorkoutMetrics,
    pub source_file: Option<String>,
    pub equipment_ids: Vec<i64>,
}

/// Partial edit of a workout. `None` leaves a field untouched; nullable
/// metrics use `Some(None)` to clear.
#[derive(Debug, Clone, Default)]
pub struct UpdateWorkout {
    pub sport_id: Option<i64>,
    pub title: Option<Option<String>>,
    pub workout_date: Option<NaiveDateTime>,
    pub distance: Option<f64>,
    pub duration: Option<TimeDelta>,
    pub moving: Option<TimeDelta>,
    pub ascent: Option<Option<f64>>,
    pub descent: Option<Option<f64>>,
    pub max_speed: Option<Option<f64>>,
    pub ave_speed: Option<Option<f64>>,
    /// Replaces the whole association set when present.
    pub equipment_ids: Option<Vec<i64>>,
}

impl UpdateWorkout {
    /// An edit that overwrites every metric, as a source file reprocess does.
    #[must_use]
    pub fn from_metrics(metrics: WorkoutMetrics) -> Self {
        Self {
            distance: Some(metrics.distance),
            duration: Some(metrics.duration),
            moving: Some(metrics.moving),
            ascent: Some(metrics.ascent),
            descent: Some(metrics.descent),
            max_speed: Some(metrics.max_speed),
            ave_speed: Some(metrics.ave_speed),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn apply_metrics(&self, current: &WorkoutMetrics) -> WorkoutMetrics {
        WorkoutMetrics {
            distance: self.distance.unwrap_or(current.distance),
            duration: self.duration.unwrap_or(current.duration),
            moving: self.moving.unwrap_or(current.moving),
            ascent: self.ascent.unwrap_or(current.ascent),
            descent: self.descent.unwrap_or(current.descent),
            max_speed: self.max_speed.unwrap_or(current.max_speed),
            ave_speed: self.ave_speed.unwrap_or(current.ave_speed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RecordType {
    AverageSpeed,
    FarthestDistance,
    HighestAscent,
    LongestDuration,
    MaxSpeed,
}

impl RecordType {
    pub const ALL: [RecordType; 5] = [
        RecordType::AverageSpeed,
        RecordType::FarthestDistance,
        RecordType::HighestAscent,
        RecordType::LongestDuration,
        RecordType::MaxSpeed,
    ];

    #[must_use]
    pub fn code(self) -> &'static str {
        match self {
            RecordType::AverageSpeed => "AS",
            RecordType::FarthestDistance => "FD",
            RecordType::HighestAscent => "HA",
            RecordType::LongestDuration => "LD",
            RecordType::MaxSpeed => "MS",
        }
    }

    pub fn from_code(code: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|t| t.code() == code)
            .with_context(|| format!("Unknown record type '{code}'"))
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            RecordType::AverageSpeed => "Best average speed",
            RecordType::FarthestDistance => "Farthest distance",
            RecordType::HighestAscent => "Highest ascent",
            RecordType::LongestDuration => "Longest duration",
            RecordType::MaxSpeed => "Max speed",
        }
    }

    /// The workout's value in this category, `None` when it has none.
    #[must_use]
    pub fn value_of(self, metrics: &WorkoutMetrics) -> Option<RecordValue> {
        match self {
            RecordType::AverageSpeed => metrics.ave_speed.map(RecordValue::Speed),
            RecordType::FarthestDistance => Some(RecordValue::Distance(metrics.distance)),
            RecordType::HighestAscent => metrics.ascent.map(RecordValue::Ascent),
            RecordType::LongestDuration => Some(RecordValue::Duration(metrics.moving)),
            RecordType::MaxSpeed => metrics.max_speed.map(RecordValue::Speed),
        }
    }
}

impl Serialize for RecordType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.code())
    }
}

/// A record's value, typed by its category.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordValue {
    Speed(f64),
    Distance(f64),
    Duration(TimeDelta),
    Ascent(f64),
}

impl Serialize for RecordValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RecordValue::Speed(v) | RecordValue::Distance(v) | RecordValue::Ascent(v) => {
                serializer.serialize_f64(*v)
            }
            RecordValue::Duration(d) => serializer.serialize_str(&format_duration(*d)),
        }
    }
}

impl std::fmt::Display for RecordValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordValue::Speed(v) => write!(f, "{v:.2} km/h"),
            RecordValue::Distance(v) => write!(f, "{v:.3} km"),
            RecordValue::Ascent(v) => write!(f, "{v:.3} m"),
            RecordValue::Duration(d) => f.write_str(&format_duration(*d)),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WorkoutRecord {
    pub id: i64,
    #[serde(skip)]
    pub user_id: i64,
    #[serde(rename = "user")]
    pub username: String,
    pub sport_id: i64,
    pub workout_id: i64,
    pub record_type: RecordType,
    pub workout_date: NaiveDateTime,
    pub value: RecordValue,
}

#[derive(Debug, Clone, Serialize)]
pub struct Equipment {
    pub id: i64,
    pub uuid: String,
    pub user_id: i64,
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_active: bool,
    /// Kilometres.
    pub total_distance: f64,
    #[serde(serialize_with = "span::serialize")]
    pub total_duration: TimeDelta,
    #[serde(serialize_with = "span::serialize")]
    pub total_moving: TimeDelta,
    pub total_workouts: i64,
    pub created_at: String,
}

#[derive(Debug, Clone)]
pub struct NewEquipment {
    pub user_id: i64,
    pub label: String,
    pub description: Option<String>,
}

/// Formats a span as `H:MM:SS`; hours are not wrapped into days.
#[must_use]
pub fn format_duration(d: TimeDelta) -> String {
    let total = d.num_seconds();
    let sign = if total < 0 { "-" } else { "" };
    let total = total.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}

/// Parses `H:MM:SS`, `M:SS` or a bare number of seconds.
pub fn parse_duration(s: &str) -> Result<TimeDelta> {
    let s = s.trim();
    let parts: Vec<&str> = s.split(':').collect();
    let numbers = parts
        .iter()
        .map(|p| p.parse::<i64>())
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid duration: '{s}'. Use H:MM:SS"))?;
    if numbers.iter().any(|n| *n < 0) {
        bail!("Duration must not be negative: '{s}'");
    }
    let secs = match numbers.as_slice() {
        [secs] => Some(*secs),
        [m, sec] => m.checked_mul(60).and_then(|v| v.checked_add(*sec)),
        [h, m, sec] => h
            .checked_mul(3600)
            .and_then(|v| v.checked_add(m.checked_mul(60)?))
            .and_then(|v| v.checked_add(*sec)),
        _ => bail!("Invalid duration: '{s}'. Use H:MM:SS"),
    };
    secs.and_then(TimeDelta::try_seconds)
        .with_context(|| format!("Duration out of range: '{s}'"))
}

pub fn validate_workout_metrics(metrics: &WorkoutMetrics) -> Result<()> {
    if !metrics.distance.is_finite() || metrics.distance < 0.0 {
        bail!("Distance must be a non-negative number");
    }
    if metrics.distance > codec::MAX_DISTANCE_KM {
        bail!("Distance must not exceed {} km", codec::MAX_DISTANCE_KM);
    }
    for span in [metrics.duration, metrics.moving] {
        if span < TimeDelta::zero() {
            bail!("Durations must not be negative");
        }
        if span.num_seconds() > codec::MAX_SPAN_SECONDS {
            bail!(
                "Durations must not exceed {}",
                format_duration(TimeDelta::seconds(codec::MAX_SPAN_SECONDS))
            );
        }
    }
    for (name, value, max) in [
        ("Ascent", metrics.ascent, codec::MAX_ELEVATION_M),
        ("Descent", metrics.descent, codec::MAX_ELEVATION_M),
        ("Max speed", metrics.max_speed, codec::MAX_SPEED_KMH),
        ("Average speed", metrics.ave_speed, codec::MAX_SPEED_KMH),
    ] {
        if let Some(v) = value {
            if !v.is_finite() || v < 0.0 {
                bail!("{name} must be a non-negative number");
            }
            if v > max {
                bail!("{name} must not exceed {max}");
            }
        }
    }
    Ok(())
}

/// Serde adapter writing spans as `H:MM:SS` strings.
pub mod span {
    use super::{Deserialize, Deserializer, Serializer, TimeDelta, format_duration, parse_duration};

    #[allow(clippy::trivially_copy_pass_by_ref)]
    pub fn serialize<S: Serializer>(d: &TimeDelta, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*d))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<TimeDelta, D::Error> {
        let s = String::deserialize(deserializer)?;
        parse_duration(&s).map_err(serde::de::Error::custom)
    }
}
