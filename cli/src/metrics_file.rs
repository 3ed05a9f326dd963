use std::path::Path;

use anyhow::{Context, Result};
use stride_core::models::{WorkoutMetrics, average_speed};
use stride_core::service::WorkoutMetricsSource;

/// Reads precomputed workout metrics from a JSON file:
///
/// ```json
/// { "distance": 42.2, "duration": "3:05:10", "moving": "3:01:44",
///   "ascent": 312.0, "max_speed": 18.4 }
/// ```
///
/// A missing average speed is derived from distance and moving time.
pub struct JsonMetricsFile;

impl WorkoutMetricsSource for JsonMetricsFile {
    fn compute(&self, source: &str) -> Result<WorkoutMetrics> {
        let path = Path::new(source);
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let mut metrics: WorkoutMetrics = serde_json::from_str(&raw)
            .with_context(|| format!("Invalid metrics file {}", path.display()))?;
        if metrics.ave_speed.is_none() {
            metrics.ave_speed = average_speed(metrics.distance, metrics.moving);
        }
        Ok(metrics)
    }
}
