//! Subscore calculators
//!
//! Four pure functions mapping physiological ratios and contextual values to
//! weighted point contributions:
//!
//! - HRV vs. circadian-adjusted baseline (max 40)
//! - Heart rate vs. resting baseline (max 30)
//! - Sleep recovery (max 20)
//! - Substance timing (max 10)
//!
//! All four are deterministic and defend against missing baselines by
//! returning fixed fallback constants instead of dividing by zero. The
//! maxima sum to exactly 100.

use crate::types::{Subscores, SUBSTANCE_CAFFEINE, SUBSTANCE_THEANINE};
use std::collections::HashMap;

/// HRV fallback when no baseline RMSSD is available
pub const HRV_FALLBACK: f64 = 20.0;

/// HR fallback when no resting heart rate is available
pub const HR_FALLBACK: f64 = 15.0;

/// Neutral sleep quality substituted by the caller when unknown
pub const NEUTRAL_SLEEP_QUALITY: f64 = 70.0;

/// HRV subscore (0-40) from the RMSSD-to-baseline ratio.
///
/// Moderate vagal withdrawal (ratio 0.7-0.9) is the canonical flow
/// signature and scores maximum; collapsed variability reads as stress,
/// elevated variability as relaxation rather than engagement.
pub fn hrv_subscore(current_rmssd_ms: f64, baseline_rmssd_ms: f64) -> f64 {
    if baseline_rmssd_ms <= 0.0 {
        return HRV_FALLBACK;
    }
    let r = current_rmssd_ms / baseline_rmssd_ms;

    if (0.7..=0.9).contains(&r) {
        40.0
    } else if r > 0.9 && r <= 1.1 {
        20.0 + 20.0 * (1.1 - r) / 0.2
    } else if (0.5..0.7).contains(&r) {
        40.0 * (r - 0.5) / 0.2
    } else if r > 1.1 && r <= 1.3 {
        20.0 - 10.0 * (r - 1.1) / 0.2
    } else {
        (10.0 - (r - 0.8).abs() * 20.0).max(0.0)
    }
}

/// Heart-rate subscore (0-30) from the HR-to-resting ratio.
///
/// Mild elevation (1.1-1.3x resting) scores maximum; higher arousal tapers
/// off, and sub-resting rates read as disengagement.
pub fn hr_subscore(current_hr_bpm: f64, resting_hr_bpm: f64) -> f64 {
    if resting_hr_bpm <= 0.0 {
        return HR_FALLBACK;
    }
    let r = current_hr_bpm / resting_hr_bpm;

    if (1.1..=1.3).contains(&r) {
        30.0
    } else if (1.0..1.1).contains(&r) {
        20.0 + 10.0 * (r - 1.0) / 0.1
    } else if r > 1.3 && r <= 1.5 {
        30.0 - 15.0 * (r - 1.3) / 0.2
    } else if r > 1.5 {
        (15.0 - (r - 1.5) * 30.0).max(0.0)
    } else {
        (10.0 + (r - 0.8) * 25.0).max(0.0)
    }
}

/// Sleep subscore (0-20): sleep quality on a 0-100 scale, weighted by 0.2.
///
/// Performs no substitution for missing data; when quality is unknown the
/// caller supplies [`NEUTRAL_SLEEP_QUALITY`].
pub fn sleep_subscore(sleep_quality: f64) -> f64 {
    sleep_quality.clamp(0.0, 100.0) * 0.2
}

/// Substance subscore (0-10) from active levels in mg.
///
/// Base 5, plus a caffeine dose band and a theanine-to-caffeine ratio band.
/// The 1.5-2.5 theanine:caffeine ratio is the synergy window.
pub fn substance_subscore(levels: &HashMap<String, f64>) -> f64 {
    let caffeine = levels.get(SUBSTANCE_CAFFEINE).copied().unwrap_or(0.0);
    let theanine = levels.get(SUBSTANCE_THEANINE).copied().unwrap_or(0.0);

    let mut score = 5.0;

    if (50.0..=200.0).contains(&caffeine) {
        score += 2.5;
    } else if caffeine > 200.0 && caffeine <= 300.0 {
        score += 1.5;
    }

    if theanine >= 100.0 && caffeine > 0.0 {
        let ratio = theanine / caffeine;
        if (1.5..=2.5).contains(&ratio) {
            score += 2.5;
        } else if (1.0..1.5).contains(&ratio) {
            score += 1.5;
        }
    }

    score
}

/// Total score: truncated sum of the four components, clamped to 0-100
pub fn total_score(subscores: &Subscores) -> u8 {
    (subscores.sum().trunc() as i64).clamp(0, 100) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn levels(caffeine: f64, theanine: f64) -> HashMap<String, f64> {
        let mut map = HashMap::new();
        if caffeine > 0.0 {
            map.insert(SUBSTANCE_CAFFEINE.to_string(), caffeine);
        }
        if theanine > 0.0 {
            map.insert(SUBSTANCE_THEANINE.to_string(), theanine);
        }
        map
    }

    #[test]
    fn test_hrv_flow_band_scores_max() {
        // ratio 0.8 is the canonical flow signature
        assert_eq!(hrv_subscore(48.0, 60.0), 40.0);
        assert_eq!(hrv_subscore(42.0, 60.0), 40.0); // 0.7 edge
        assert_eq!(hrv_subscore(54.0, 60.0), 40.0); // 0.9 edge
    }

    #[test]
    fn test_hrv_near_baseline_taper() {
        // ratio 1.0 -> 20 + 20*(0.1/0.2) = 30
        assert!((hrv_subscore(60.0, 60.0) - 30.0).abs() < 1e-9);
        // ratio 1.1 -> exactly 20
        assert!((hrv_subscore(66.0, 60.0) - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_hrv_low_ramp() {
        // ratio 0.6 -> 40*(0.1/0.2) = 20
        assert!((hrv_subscore(36.0, 60.0) - 20.0).abs() < 1e-9);
        // ratio 0.5 -> 0
        assert!(hrv_subscore(30.0, 60.0).abs() < 1e-9);
    }

    #[test]
    fn test_hrv_elevated_band() {
        // ratio 1.2 -> 20 - 10*(0.1/0.2) = 15
        assert!((hrv_subscore(72.0, 60.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_hrv_out_of_range_fallback() {
        // ratio 2.0 -> max(0, 10 - 1.2*20) = 0
        assert_eq!(hrv_subscore(120.0, 60.0), 0.0);
        // ratio 0.4 -> max(0, 10 - 0.4*20) = 2
        assert!((hrv_subscore(24.0, 60.0) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_hrv_zero_baseline_fallback() {
        assert_eq!(hrv_subscore(55.0, 0.0), HRV_FALLBACK);
    }

    #[test]
    fn test_hr_flow_band_scores_max() {
        // ratio 1.2
        assert_eq!(hr_subscore(66.0, 55.0), 30.0);
        assert_eq!(hr_subscore(60.5, 55.0), 30.0); // 1.1 edge
        assert_eq!(hr_subscore(71.5, 55.0), 30.0); // 1.3 edge
    }

    #[test]
    fn test_hr_warmup_ramp() {
        // ratio 1.0 -> 20, ratio 1.05 -> 25
        assert!((hr_subscore(55.0, 55.0) - 20.0).abs() < 1e-9);
        assert!((hr_subscore(57.75, 55.0) - 25.0).abs() < 1e-9);
    }

    #[test]
    fn test_hr_elevated_taper() {
        // ratio 1.4 -> 30 - 15*0.5 = 22.5
        assert!((hr_subscore(77.0, 55.0) - 22.5).abs() < 1e-9);
        // ratio 1.6 -> max(0, 15 - 3) = 12
        assert!((hr_subscore(88.0, 55.0) - 12.0).abs() < 1e-9);
        // ratio 2.5 -> 0
        assert_eq!(hr_subscore(137.5, 55.0), 0.0);
    }

    #[test]
    fn test_hr_below_resting() {
        // ratio 0.9 -> max(0, 10 + 2.5) = 12.5
        assert!((hr_subscore(49.5, 55.0) - 12.5).abs() < 1e-9);
        // ratio 0.3 -> max(0, 10 - 12.5) = 0
        assert_eq!(hr_subscore(16.5, 55.0), 0.0);
    }

    #[test]
    fn test_hr_zero_resting_fallback() {
        assert_eq!(hr_subscore(70.0, 0.0), HR_FALLBACK);
    }

    #[test]
    fn test_sleep_weighting() {
        assert_eq!(sleep_subscore(100.0), 20.0);
        assert_eq!(sleep_subscore(70.0), 14.0);
        assert_eq!(sleep_subscore(0.0), 0.0);
        // Out-of-range input is clamped, not propagated
        assert_eq!(sleep_subscore(140.0), 20.0);
    }

    #[test]
    fn test_substance_synergy_scores_max() {
        // caffeine 100, theanine 200 -> ratio 2.0 -> 5 + 2.5 + 2.5 = 10
        assert_eq!(substance_subscore(&levels(100.0, 200.0)), 10.0);
    }

    #[test]
    fn test_substance_caffeine_bands() {
        assert_eq!(substance_subscore(&levels(100.0, 0.0)), 7.5);
        assert_eq!(substance_subscore(&levels(250.0, 0.0)), 6.5);
        assert_eq!(substance_subscore(&levels(400.0, 0.0)), 5.0);
        assert_eq!(substance_subscore(&levels(20.0, 0.0)), 5.0);
    }

    #[test]
    fn test_substance_ratio_bands() {
        // ratio 1.2 -> +1.5
        assert_eq!(substance_subscore(&levels(100.0, 120.0)), 9.0);
        // ratio 3.0 -> no ratio bonus
        assert_eq!(substance_subscore(&levels(100.0, 300.0)), 7.5);
        // theanine below 100mg contributes nothing
        assert_eq!(substance_subscore(&levels(100.0, 80.0)), 7.5);
        // theanine without caffeine contributes nothing
        assert_eq!(substance_subscore(&levels(0.0, 200.0)), 5.0);
    }

    #[test]
    fn test_maxima_sum_to_exactly_100() {
        let max = Subscores {
            hrv: hrv_subscore(48.0, 60.0),
            hr: hr_subscore(66.0, 55.0),
            sleep: sleep_subscore(100.0),
            substance: substance_subscore(&levels(100.0, 200.0)),
        };
        assert_eq!(max.sum(), 100.0);
        assert_eq!(total_score(&max), 100);
    }

    #[test]
    fn test_total_truncates_and_clamps() {
        let s = Subscores {
            hrv: 30.7,
            hr: 20.9,
            sleep: 14.0,
            substance: 5.0,
        };
        // 70.6 truncates to 70
        assert_eq!(total_score(&s), 70);

        let zero = Subscores {
            hrv: 0.0,
            hr: 0.0,
            sleep: 0.0,
            substance: 0.0,
        };
        assert_eq!(total_score(&zero), 0);
    }
}
