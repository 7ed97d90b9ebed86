//! Pipeline diagnostics: timing and counts for each stage.
//!
//! These diagnostics are permanent instrumentation intended for
//! algorithm tuning and parameter experimentation; the core never
//! logs, so per-stage numbers returned alongside the result are the
//! only window into where time went. Durations are serialized as
//! fractional seconds (`f64`) for JSON compatibility, since
//! `std::time::Duration` does not implement serde traits.

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Metrics for a single pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageDiagnostics {
    /// Wall-clock time spent in the stage.
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Stage-specific item count; see the field docs on
    /// [`PipelineDiagnostics`] for what each stage counts.
    pub items: u64,
}

/// Diagnostics collected from a single pipeline run.
///
/// Stages that are conditionally skipped have `Option` fields that are
/// `None` when the stage was not executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineDiagnostics {
    /// Decoding and alpha compositing; counts decoded pixels.
    pub decode: StageDiagnostics,
    /// Downscale, blur, and contrast; counts working-resolution pixels.
    pub preprocess: StageDiagnostics,
    /// Color quantization; counts palette entries.
    pub quantize: StageDiagnostics,
    /// Edge detection; counts edge pixels. `None` when the edge stage
    /// is disabled.
    pub edge_detection: Option<StageDiagnostics>,
    /// Component labeling, filtering, and boundary tracing; counts
    /// surviving regions.
    pub region_extraction: StageDiagnostics,
    /// Simplification and curve fitting; counts emitted paths.
    pub path_fitting: StageDiagnostics,
}

impl PipelineDiagnostics {
    /// Total wall-clock time across all executed stages.
    #[must_use]
    pub fn total(&self) -> Duration {
        self.decode.duration
            + self.preprocess.duration
            + self.quantize.duration
            + self.edge_detection.map_or(Duration::ZERO, |s| s.duration)
            + self.region_extraction.duration
            + self.path_fitting.duration
    }
}

/// Running timer for one stage.
///
/// Construction starts the clock; [`finish`](Self::finish) stops it and
/// attaches the stage's item count.
#[derive(Debug)]
pub(crate) struct StageTimer(Instant);

impl StageTimer {
    pub(crate) fn start() -> Self {
        Self(Instant::now())
    }

    pub(crate) fn finish(self, items: u64) -> StageDiagnostics {
        StageDiagnostics {
            duration: self.0.elapsed(),
            items,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn stage(ms: u64, items: u64) -> StageDiagnostics {
        StageDiagnostics {
            duration: Duration::from_millis(ms),
            items,
        }
    }

    #[test]
    fn total_sums_all_stages() {
        let diagnostics = PipelineDiagnostics {
            decode: stage(5, 100),
            preprocess: stage(10, 100),
            quantize: stage(50, 32),
            edge_detection: Some(stage(20, 450)),
            region_extraction: stage(15, 12),
            path_fitting: stage(5, 11),
        };
        assert_eq!(diagnostics.total(), Duration::from_millis(105));
    }

    #[test]
    fn total_skips_absent_edge_stage() {
        let diagnostics = PipelineDiagnostics {
            decode: stage(5, 100),
            preprocess: stage(10, 100),
            quantize: stage(50, 32),
            edge_detection: None,
            region_extraction: stage(15, 12),
            path_fitting: stage(5, 11),
        };
        assert_eq!(diagnostics.total(), Duration::from_millis(85));
    }

    #[test]
    fn durations_serialize_as_fractional_seconds() {
        let s = stage(1500, 7);
        let json = serde_json::to_string(&s).unwrap();
        assert_eq!(json, r#"{"duration":1.5,"items":7}"#);
        let back: StageDiagnostics = serde_json::from_str(&json).unwrap();
        assert_eq!(back, s);
    }

    #[test]
    fn negative_duration_fails_to_deserialize() {
        let result: Result<StageDiagnostics, _> =
            serde_json::from_str(r#"{"duration":-1.0,"items":0}"#);
        assert!(result.is_err());
    }

    #[test]
    fn timer_measures_nonzero_time() {
        let timer = StageTimer::start();
        std::thread::sleep(Duration::from_millis(2));
        let s = timer.finish(3);
        assert!(s.duration >= Duration::from_millis(2));
        assert_eq!(s.items, 3);
    }
}
