//! Hysteretic flow classification
//!
//! This module turns the noisy per-cycle score into a stable categorical
//! signal. Two mechanisms provide the anti-flapping guarantee:
//!
//! - decisions use a smoothed average of the last 5 totals, not the
//!   instantaneous score
//! - a minimum dwell time of 60 seconds must elapse in the current state
//!   before any transition is permitted
//!
//! Transitions are evaluated in a fixed priority order; overload always wins
//! when its arousal signature is present. Overload has no dedicated exit
//! rule: once ratios normalize it falls through the same priority list on a
//! later cycle.

use crate::types::{FlowState, HapticCue, StateChange};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;

/// Minimum seconds in a state before a transition is permitted
pub const MIN_DWELL_SECS: i64 = 60;

/// Number of recent totals averaged for transition decisions
pub const SCORE_HISTORY_LEN: usize = 5;

/// Session warmup window (minutes) during which pre-flow is reachable
pub const WARMUP_MINUTES: f64 = 3.0;

/// Inputs for one state evaluation
#[derive(Debug, Clone, Copy)]
pub struct StateInputs {
    /// Whether the personal baseline is calibrated
    pub calibrated: bool,
    /// Total score for this cycle (appended to the history)
    pub total: u8,
    /// currentRMSSD / adjusted baseline RMSSD
    pub hrv_ratio: f64,
    /// currentHR / resting HR
    pub hr_ratio: f64,
    /// Minutes elapsed in the session
    pub minutes_in_session: f64,
}

/// Hysteresis-stabilized classifier over the weighted flow score.
#[derive(Debug, Clone)]
pub struct FlowStateMachine {
    state: FlowState,
    entered_at: DateTime<Utc>,
    history: VecDeque<u8>,
    min_dwell_secs: i64,
    history_len: usize,
}

impl FlowStateMachine {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self::with_dwell(started_at, MIN_DWELL_SECS, SCORE_HISTORY_LEN)
    }

    pub fn with_dwell(started_at: DateTime<Utc>, min_dwell_secs: i64, history_len: usize) -> Self {
        Self {
            state: FlowState::Calibrating,
            entered_at: started_at,
            history: VecDeque::with_capacity(history_len),
            min_dwell_secs,
            history_len,
        }
    }

    pub fn state(&self) -> FlowState {
        self.state
    }

    /// Seconds spent in the current state as of `now`
    pub fn seconds_in_state(&self, now: DateTime<Utc>) -> i64 {
        (now - self.entered_at).num_seconds().max(0)
    }

    /// Smoothed average over the score history
    pub fn avg_score(&self) -> f64 {
        if self.history.is_empty() {
            return 0.0;
        }
        let sum: u32 = self.history.iter().map(|&s| s as u32).sum();
        sum as f64 / self.history.len() as f64
    }

    /// Run one evaluation cycle.
    ///
    /// Appends the cycle total to the history, then applies the calibration
    /// short-circuit, the dwell-time check, and the priority-ordered
    /// transition rules. Returns the committed transition, if any.
    pub fn evaluate(&mut self, inputs: StateInputs, now: DateTime<Utc>) -> Option<StateChange> {
        self.history.push_back(inputs.total);
        while self.history.len() > self.history_len {
            self.history.pop_front();
        }

        // Uncalibrated baselines force calibrating; no transition logic runs
        if !inputs.calibrated {
            return self.transition_to(FlowState::Calibrating, now);
        }

        // Hysteresis: inside the dwell window the state is frozen
        if self.seconds_in_state(now) < self.min_dwell_secs {
            return None;
        }

        let avg = self.avg_score();
        let next = if inputs.hr_ratio > 1.5 && inputs.hrv_ratio < 0.5 {
            // High arousal with collapsed variability overrides everything
            FlowState::Overload
        } else if avg >= 70.0 && self.state != FlowState::Flow {
            FlowState::Flow
        } else if avg < 60.0 && self.state == FlowState::Flow {
            FlowState::PostFlow
        } else if avg < 30.0 {
            FlowState::Disengaged
        } else if inputs.minutes_in_session < WARMUP_MINUTES
            && matches!(self.state, FlowState::Baseline | FlowState::Calibrating)
        {
            FlowState::PreFlow
        } else {
            self.state
        };

        self.transition_to(next, now)
    }

    /// Commit a transition if `next` differs from the current state
    fn transition_to(&mut self, next: FlowState, now: DateTime<Utc>) -> Option<StateChange> {
        if next == self.state {
            return None;
        }
        let change = StateChange {
            from: self.state,
            to: next,
            cue: HapticCue::for_state(next),
            at: now,
        };
        log::debug!(
            "flow state {} -> {} after {}s",
            change.from.as_str(),
            change.to.as_str(),
            self.seconds_in_state(now)
        );
        self.state = next;
        self.entered_at = now;
        Some(change)
    }

    /// Session end/reset: history cleared, state returns to baseline
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.history.clear();
        self.state = FlowState::Baseline;
        self.entered_at = now;
    }
}
