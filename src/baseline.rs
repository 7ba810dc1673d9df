//! Personal baseline
//!
//! The baseline captures a user's resting physiology, established by an
//! external calibration subsystem over a multi-day window. The engine reads
//! it to turn absolute measurements into personal ratios; it never writes it.

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Daily calibration samples required before the baseline is trusted
pub const CALIBRATION_DAYS_REQUIRED: u32 = 14;

/// Calibration count at which score confidence saturates at 1.0
pub const CONFIDENCE_SATURATION_DAYS: u32 = 30;

/// Read-only personal reference values supplied by the calibration subsystem.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalBaseline {
    /// Resting heart rate (bpm)
    pub resting_hr_bpm: f64,
    /// Baseline RMSSD (ms), averaged across the calibration window
    pub baseline_rmssd_ms: f64,
    /// Optional per-hour-of-day RMSSD baselines. HRV swings with circadian
    /// phase, so a 3pm reading should be compared against a 3pm baseline
    /// when one is available.
    pub circadian_rmssd_ms: Option<[f64; 24]>,
    /// Number of daily calibration samples accumulated so far
    pub calibration_days: u32,
}

impl PersonalBaseline {
    /// Baseline with no calibration data; keeps the engine in `Calibrating`
    pub fn uncalibrated() -> Self {
        Self {
            resting_hr_bpm: 0.0,
            baseline_rmssd_ms: 0.0,
            circadian_rmssd_ms: None,
            calibration_days: 0,
        }
    }

    /// Whether enough calibration days have accumulated for classification
    pub fn is_calibrated(&self) -> bool {
        self.calibration_days >= CALIBRATION_DAYS_REQUIRED
    }

    /// Baseline RMSSD adjusted for the hour of day of `now`.
    ///
    /// Falls back to the flat baseline when no circadian table exists or the
    /// table entry is non-positive (hours with no calibration coverage).
    pub fn adjusted_rmssd_ms(&self, now: DateTime<Utc>) -> f64 {
        if let Some(table) = &self.circadian_rmssd_ms {
            let hourly = table[now.hour() as usize];
            if hourly > 0.0 {
                return hourly;
            }
        }
        self.baseline_rmssd_ms
    }

    /// Score confidence derived from calibration progress (0-1)
    pub fn confidence(&self) -> f64 {
        (self.calibration_days as f64 / CONFIDENCE_SATURATION_DAYS as f64).min(1.0)
    }

    /// Load a persisted baseline from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn calibrated(rmssd: f64, rhr: f64) -> PersonalBaseline {
        PersonalBaseline {
            resting_hr_bpm: rhr,
            baseline_rmssd_ms: rmssd,
            circadian_rmssd_ms: None,
            calibration_days: CALIBRATION_DAYS_REQUIRED,
        }
    }

    #[test]
    fn test_calibration_threshold() {
        let mut baseline = calibrated(60.0, 55.0);
        assert!(baseline.is_calibrated());
        baseline.calibration_days = CALIBRATION_DAYS_REQUIRED - 1;
        assert!(!baseline.is_calibrated());
    }

    #[test]
    fn test_confidence_saturation() {
        let mut baseline = calibrated(60.0, 55.0);
        baseline.calibration_days = 15;
        assert_eq!(baseline.confidence(), 0.5);
        baseline.calibration_days = 45;
        assert_eq!(baseline.confidence(), 1.0);
    }

    #[test]
    fn test_circadian_lookup() {
        let mut baseline = calibrated(60.0, 55.0);
        let mut table = [0.0; 24];
        table[15] = 48.0;
        baseline.circadian_rmssd_ms = Some(table);

        let at_3pm = Utc.with_ymd_and_hms(2024, 1, 15, 15, 30, 0).unwrap();
        assert_eq!(baseline.adjusted_rmssd_ms(at_3pm), 48.0);

        // Hour with no coverage falls back to the flat baseline
        let at_4am = Utc.with_ymd_and_hms(2024, 1, 15, 4, 0, 0).unwrap();
        assert_eq!(baseline.adjusted_rmssd_ms(at_4am), 60.0);
    }

    #[test]
    fn test_uncalibrated_defaults() {
        let baseline = PersonalBaseline::uncalibrated();
        assert!(!baseline.is_calibrated());
        assert_eq!(baseline.confidence(), 0.0);
        assert_eq!(baseline.adjusted_rmssd_ms(Utc::now()), 0.0);
    }

    #[test]
    fn test_json_round_trip() {
        let baseline = calibrated(62.5, 54.0);
        let json = serde_json::to_string(&baseline).unwrap();
        let loaded = PersonalBaseline::from_json(&json).unwrap();
        assert_eq!(loaded.baseline_rmssd_ms, 62.5);
        assert_eq!(loaded.resting_hr_bpm, 54.0);
    }
}
