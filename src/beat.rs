//! Beat interval processing
//!
//! This module turns raw heartbeat timestamps into validated inter-beat (RR)
//! intervals and derives a smoothed heart-rate-variability metric (RMSSD)
//! over a bounded rolling buffer.
//!
//! Sensor streams are noisy: missed beats produce oversized intervals,
//! doubled detections produce undersized or zero intervals, and duplicated
//! timestamps occur on reconnects. Everything outside the plausible RR range
//! is discarded before it can touch the buffer.

use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Minimum plausible RR interval (ms), equivalent to 200 bpm
pub const RR_MIN_MS: i64 = 300;

/// Maximum plausible RR interval (ms), equivalent to 30 bpm
pub const RR_MAX_MS: i64 = 2000;

/// A single validated inter-beat interval
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RrInterval {
    /// Interval duration (ms), always within [RR_MIN_MS, RR_MAX_MS]
    pub duration_ms: i64,
    /// Timestamp of the beat that closed the interval
    pub observed_at: DateTime<Utc>,
}

/// Processes a stream of heartbeat timestamps into RR intervals and RMSSD.
///
/// Owns the beat buffer exclusively. Malformed input is filtered, never
/// surfaced as an error; a buffer too small for RMSSD simply yields no
/// update.
#[derive(Debug, Clone)]
pub struct BeatIntervalProcessor {
    buffer: VecDeque<RrInterval>,
    last_beat_at: Option<DateTime<Utc>>,
    /// Most recent intervals considered for RMSSD
    rmssd_window: usize,
    /// Hard cap on buffered intervals
    buffer_cap: usize,
    /// Entries older than this are evicted
    retention_secs: i64,
}

impl BeatIntervalProcessor {
    pub fn new(rmssd_window: usize, buffer_cap: usize, retention_secs: i64) -> Self {
        Self {
            buffer: VecDeque::with_capacity(buffer_cap),
            last_beat_at: None,
            rmssd_window,
            buffer_cap,
            retention_secs,
        }
    }

    /// Feed one heartbeat timestamp.
    ///
    /// Returns `true` when the beat closed a valid interval (the buffer and
    /// the derived heart rate changed), `false` when it was the first beat
    /// or the interval was rejected. A rejected beat still becomes the
    /// anchor for the next interval, so a single artifact costs at most one
    /// interval.
    pub fn push_beat(&mut self, at: DateTime<Utc>) -> bool {
        let accepted = match self.last_beat_at {
            None => false,
            Some(prev) => {
                let duration_ms = (at - prev).num_milliseconds();
                if (RR_MIN_MS..=RR_MAX_MS).contains(&duration_ms) {
                    self.buffer.push_back(RrInterval {
                        duration_ms,
                        observed_at: at,
                    });
                    true
                } else {
                    log::debug!("rejected RR interval of {duration_ms}ms");
                    false
                }
            }
        };

        self.last_beat_at = Some(at);
        if accepted {
            self.prune(at);
        }
        accepted
    }

    /// Drop entries beyond the cap or older than the retention window
    fn prune(&mut self, now: DateTime<Utc>) {
        while self.buffer.len() > self.buffer_cap {
            self.buffer.pop_front();
        }
        let cutoff = now - chrono::Duration::seconds(self.retention_secs);
        while matches!(self.buffer.front(), Some(rr) if rr.observed_at < cutoff) {
            self.buffer.pop_front();
        }
    }

    /// RMSSD (ms) over the most recent window of valid intervals.
    ///
    /// Square root of the mean of squared differences between temporally
    /// adjacent intervals. Requires at least 2 intervals in the window;
    /// with fewer, `None` (callers retain their previous value).
    pub fn rmssd_ms(&self) -> Option<f64> {
        let start = self.buffer.len().saturating_sub(self.rmssd_window);
        let window: Vec<i64> = self.buffer.iter().skip(start).map(|rr| rr.duration_ms).collect();
        if window.len() < 2 {
            return None;
        }

        let sum_sq: f64 = window
            .windows(2)
            .map(|pair| {
                let diff = (pair[1] - pair[0]) as f64;
                diff * diff
            })
            .sum();
        Some((sum_sq / (window.len() - 1) as f64).sqrt())
    }

    /// Instantaneous heart rate (bpm) from the latest accepted interval
    pub fn current_hr_bpm(&self) -> Option<f64> {
        self.buffer
            .back()
            .map(|rr| 60_000.0 / rr.duration_ms as f64)
    }

    /// Number of buffered intervals
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Clear all buffered state for session reset
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_beat_at = None;
    }
}
