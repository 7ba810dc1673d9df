//! Core types for the Flowsense engine
//!
//! This module defines the data that flows through a session: instantaneous
//! samples, the per-cycle scoring result, the discrete flow classification,
//! and the events published to collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Substance name key for active caffeine (mg)
pub const SUBSTANCE_CAFFEINE: &str = "caffeine";

/// Substance name key for active L-theanine (mg)
pub const SUBSTANCE_THEANINE: &str = "theanine";

/// Discrete attentional/physiological classification.
///
/// Exactly one state is current per session. `Calibrating` is both the
/// initial state and the forced state whenever the personal baseline has not
/// accumulated enough calibration days.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowState {
    Calibrating,
    Baseline,
    PreFlow,
    Flow,
    PostFlow,
    Disengaged,
    Overload,
}

impl FlowState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowState::Calibrating => "calibrating",
            FlowState::Baseline => "baseline",
            FlowState::PreFlow => "pre_flow",
            FlowState::Flow => "flow",
            FlowState::PostFlow => "post_flow",
            FlowState::Disengaged => "disengaged",
            FlowState::Overload => "overload",
        }
    }
}

/// Haptic cue played by the feedback collaborator on a state change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HapticCue {
    Success,
    Failure,
    Notification,
    Click,
}

impl HapticCue {
    /// Cue for entering `state`. Flow entry is celebrated, overload warned,
    /// the two wind-down states get a soft notification, everything else a
    /// neutral click.
    pub fn for_state(state: FlowState) -> Self {
        match state {
            FlowState::Flow => HapticCue::Success,
            FlowState::Overload => HapticCue::Failure,
            FlowState::PostFlow | FlowState::Disengaged => HapticCue::Notification,
            _ => HapticCue::Click,
        }
    }
}

/// Instantaneous heart-rate sample from the sensing collaborator
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HrSample {
    /// Heart rate (bpm)
    pub bpm: f64,
    /// When the sample was observed
    pub observed_at: DateTime<Utc>,
}

/// The four weighted score components. Maxima are 40 + 30 + 20 + 10 = 100.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Subscores {
    /// HRV component (0-40)
    pub hrv: f64,
    /// Heart-rate component (0-30)
    pub hr: f64,
    /// Sleep-recovery component (0-20)
    pub sleep: f64,
    /// Substance-timing component (0-10)
    pub substance: f64,
}

impl Subscores {
    /// Sum of the four components, before truncation and clamping
    pub fn sum(&self) -> f64 {
        self.hrv + self.hr + self.sleep + self.substance
    }
}

/// Immutable per-cycle scoring result.
///
/// Produced once per recompute cycle and never mutated afterwards; the field
/// set is the stable contract for the cross-device sync channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlowScore {
    /// Owning session
    pub session_id: Uuid,
    /// Total score, truncated and clamped to 0-100
    pub total: u8,
    /// Component breakdown
    pub subscores: Subscores,
    /// Confidence in the score (0-1), driven by calibration progress
    pub confidence: f64,
    /// Classified state at the time of this cycle
    pub state: FlowState,
    /// When this cycle ran
    pub computed_at: DateTime<Utc>,
}

/// A committed state transition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateChange {
    pub from: FlowState,
    pub to: FlowState,
    /// Cue for the haptic collaborator
    pub cue: HapticCue,
    pub at: DateTime<Utc>,
}

/// Event published on the session's broadcast channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ScoreUpdated(FlowScore),
    StateChanged(StateChange),
}

/// Mutable per-session context assembled for each recompute cycle.
///
/// Created at session start, updated as samples arrive, discarded at session
/// end. Nothing in here outlives the session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionContext {
    /// Session identifier, minted at start
    pub session_id: Uuid,
    /// When the session started
    pub started_at: DateTime<Utc>,
    /// Most recent heart rate (bpm), from samples or derived from beats
    pub current_hr: Option<f64>,
    /// Most recent RMSSD (ms); retained across cycles that yield no update
    pub current_rmssd: Option<f64>,
    /// Sleep-quality score (0-100) from the sleep collaborator
    pub sleep_quality: Option<f64>,
    /// Active substance levels (mg) by substance name
    pub substance_levels: HashMap<String, f64>,
}

impl SessionContext {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            started_at,
            current_hr: None,
            current_rmssd: None,
            sleep_quality: None,
            substance_levels: HashMap::new(),
        }
    }

    /// Whole minutes elapsed since session start
    pub fn minutes_elapsed(&self, now: DateTime<Utc>) -> f64 {
        (now - self.started_at).num_seconds().max(0) as f64 / 60.0
    }
}

/// Session snapshot for display and sync collaborators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub active: bool,
    pub elapsed_seconds: i64,
    pub current_hr: Option<f64>,
    pub current_total: Option<u8>,
    pub current_state: FlowState,
}
