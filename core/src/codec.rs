//! Fixed-point encoding shared by records and equipment totals.
//!
//! Every comparable value is stored as a scaled `i64` so that integer
//! ordering matches real-value ordering and repeated sums never drift:
//! speeds carry two decimals, distances and ascents three, durations are
//! whole seconds.

use chrono::TimeDelta;

use crate::models::{RecordType, RecordValue};

const SPEED_SCALE: f64 = 100.0;
const DISTANCE_SCALE: f64 = 1000.0;

// Per-workout ceilings. They keep every encoded value, and the sum of
// billions of them, well inside `i64`.
pub const MAX_DISTANCE_KM: f64 = 1_000_000.0;
pub const MAX_ELEVATION_M: f64 = 1_000_000.0;
pub const MAX_SPEED_KMH: f64 = 100_000.0;
/// 10 000 hours.
pub const MAX_SPAN_SECONDS: i64 = 36_000_000;

#[must_use]
pub fn encode(value: &RecordValue) -> i64 {
    match value {
        RecordValue::Speed(v) => scale(*v, SPEED_SCALE),
        RecordValue::Distance(v) | RecordValue::Ascent(v) => encode_distance(*v),
        RecordValue::Duration(d) => encode_span(*d),
    }
}

#[must_use]
pub fn decode(record_type: RecordType, raw: i64) -> RecordValue {
    match record_type {
        RecordType::AverageSpeed | RecordType::MaxSpeed => {
            RecordValue::Speed(unscale(raw, SPEED_SCALE))
        }
        RecordType::FarthestDistance => RecordValue::Distance(decode_distance(raw)),
        RecordType::HighestAscent => RecordValue::Ascent(decode_distance(raw)),
        RecordType::LongestDuration => RecordValue::Duration(TimeDelta::seconds(raw)),
    }
}

/// Encoded value of a workout's metric for one category.
#[must_use]
pub fn encoded_value_of(
    record_type: RecordType,
    metrics: &crate::models::WorkoutMetrics,
) -> Option<i64> {
    record_type.value_of(metrics).map(|v| encode(&v))
}

#[must_use]
pub fn encode_distance(km: f64) -> i64 {
    scale(km, DISTANCE_SCALE)
}

#[must_use]
pub fn decode_distance(raw: i64) -> f64 {
    unscale(raw, DISTANCE_SCALE)
}

#[must_use]
pub fn encode_span(d: TimeDelta) -> i64 {
    d.num_seconds()
}

fn scale(v: f64, factor: f64) -> i64 {
    (v * factor).round() as i64
}

#[allow(clippy::cast_precision_loss)]
fn unscale(raw: i64, factor: f64) -> f64 {
    raw as f64 / factor
}
