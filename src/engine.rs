//! Session recompute core
//!
//! `FlowEngine` is the synchronous heart of a session: it owns the beat
//! buffer, the session context, and the state machine, and runs the
//! per-cycle scoring algorithm. It is a session-scoped object constructed
//! with an injected baseline and configuration, so parallel sessions and
//! deterministic tests need no process-global reset logic.
//!
//! All timers and channel plumbing live one level up in [`crate::session`];
//! everything here is in-memory arithmetic over small bounded buffers and
//! never blocks.

use crate::baseline::PersonalBaseline;
use crate::beat::BeatIntervalProcessor;
use crate::scoring::{
    hr_subscore, hrv_subscore, sleep_subscore, substance_subscore, total_score, HRV_FALLBACK,
};
use crate::state_machine::{FlowStateMachine, StateInputs};
use crate::types::{
    FlowScore, FlowState, HrSample, SessionContext, SessionSummary, StateChange, Subscores,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Tunable engine parameters with the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Most recent intervals used for RMSSD (see DESIGN.md on 30 vs. 60)
    pub rmssd_window: usize,
    /// Beat buffer cap
    pub buffer_cap: usize,
    /// Beat buffer retention window (seconds)
    pub retention_secs: i64,
    /// Minimum dwell time per state (seconds)
    pub min_dwell_secs: i64,
    /// Rolling score history length
    pub history_len: usize,
    /// Periodic recompute tick (seconds)
    pub tick_secs: u64,
    /// Coalescing window for new-sample recomputes (seconds)
    pub debounce_secs: u64,
    /// Recomputes closer together than this return the cached result
    pub min_recompute_spacing_secs: i64,
    /// Sleep quality assumed when the sleep collaborator has not reported
    pub neutral_sleep_quality: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rmssd_window: 30,
            buffer_cap: 240,
            retention_secs: 120,
            min_dwell_secs: 60,
            history_len: 5,
            tick_secs: 60,
            debounce_secs: 5,
            min_recompute_spacing_secs: 1,
            neutral_sleep_quality: 70.0,
        }
    }
}

/// Result of one recompute cycle
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    /// The score for this cycle; `None` only when no heart data exists yet
    /// and no prior result is available
    pub score: Option<FlowScore>,
    /// Committed state transition, if the cycle caused one
    pub transition: Option<StateChange>,
}

/// Per-session scoring and classification engine.
pub struct FlowEngine {
    config: EngineConfig,
    baseline: PersonalBaseline,
    beats: BeatIntervalProcessor,
    context: SessionContext,
    machine: FlowStateMachine,
    last_score: Option<FlowScore>,
    last_computed_at: Option<DateTime<Utc>>,
}

impl FlowEngine {
    pub fn new(baseline: PersonalBaseline, config: EngineConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            beats: BeatIntervalProcessor::new(
                config.rmssd_window,
                config.buffer_cap,
                config.retention_secs,
            ),
            context: SessionContext::new(started_at),
            machine: FlowStateMachine::with_dwell(
                started_at,
                config.min_dwell_secs,
                config.history_len,
            ),
            config,
            baseline,
            last_score: None,
            last_computed_at: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.context
    }

    pub fn state(&self) -> FlowState {
        self.machine.state()
    }

    pub fn last_score(&self) -> Option<&FlowScore> {
        self.last_score.as_ref()
    }

    /// Feed a raw heartbeat timestamp.
    ///
    /// Returns `true` when the beat produced a valid interval, i.e. the
    /// derived heart rate and RMSSD changed and a debounced recompute is
    /// warranted.
    pub fn on_beat(&mut self, at: DateTime<Utc>) -> bool {
        let accepted = self.beats.push_beat(at);
        if accepted {
            self.context.current_hr = self.beats.current_hr_bpm();
            if let Some(rmssd) = self.beats.rmssd_ms() {
                self.context.current_rmssd = Some(rmssd);
            }
        }
        accepted
    }

    /// Feed an instantaneous heart-rate sample from the sensing subsystem.
    ///
    /// Returns `true` when the sample updated the context.
    pub fn on_hr_sample(&mut self, sample: HrSample) -> bool {
        if sample.bpm <= 0.0 {
            log::debug!("ignored non-positive HR sample {}", sample.bpm);
            return false;
        }
        self.context.current_hr = Some(sample.bpm);
        true
    }

    pub fn set_sleep_quality(&mut self, quality: f64) {
        self.context.sleep_quality = Some(quality.clamp(0.0, 100.0));
    }

    pub fn set_substance_levels(&mut self, levels: HashMap<String, f64>) {
        self.context.substance_levels = levels;
    }

    /// Run one recompute cycle as of `now`.
    ///
    /// Both scheduling sources (periodic tick, debounced sample reaction)
    /// funnel here. A monotonic spacing guard makes back-to-back invocations
    /// idempotent: a second call within the spacing window returns the
    /// cached score unchanged and touches no state.
    pub fn recompute(&mut self, now: DateTime<Utc>) -> CycleOutcome {
        if let (Some(prev), Some(score)) = (self.last_computed_at, &self.last_score) {
            let elapsed = (now - prev).num_seconds();
            if (0..self.config.min_recompute_spacing_secs).contains(&elapsed) {
                return CycleOutcome {
                    score: Some(score.clone()),
                    transition: None,
                };
            }
        }

        // Calibration guard: publish a calibrating score, skip scoring
        if !self.baseline.is_calibrated() {
            let score = FlowScore {
                session_id: self.context.session_id,
                total: 0,
                subscores: Subscores {
                    hrv: 0.0,
                    hr: 0.0,
                    sleep: 0.0,
                    substance: 0.0,
                },
                confidence: self.baseline.confidence(),
                state: FlowState::Calibrating,
                computed_at: now,
            };
            self.last_score = Some(score.clone());
            self.last_computed_at = Some(now);
            return CycleOutcome {
                score: Some(score),
                transition: None,
            };
        }

        // No heart data yet: preserve the prior result
        let Some(current_hr) = self.context.current_hr else {
            return CycleOutcome {
                score: self.last_score.clone(),
                transition: None,
            };
        };

        let adjusted_rmssd = self.baseline.adjusted_rmssd_ms(now);
        let resting_hr = self.baseline.resting_hr_bpm;

        let subscores = Subscores {
            hrv: match self.context.current_rmssd {
                Some(rmssd) => hrv_subscore(rmssd, adjusted_rmssd),
                None => HRV_FALLBACK,
            },
            hr: hr_subscore(current_hr, resting_hr),
            sleep: sleep_subscore(
                self.context
                    .sleep_quality
                    .unwrap_or(self.config.neutral_sleep_quality),
            ),
            substance: substance_subscore(&self.context.substance_levels),
        };
        let total = total_score(&subscores);

        let hrv_ratio = match (self.context.current_rmssd, adjusted_rmssd > 0.0) {
            (Some(rmssd), true) => rmssd / adjusted_rmssd,
            _ => 1.0,
        };
        let hr_ratio = if resting_hr > 0.0 {
            current_hr / resting_hr
        } else {
            1.0
        };

        let transition = self.machine.evaluate(
            StateInputs {
                calibrated: true,
                total,
                hrv_ratio,
                hr_ratio,
                minutes_in_session: self.context.minutes_elapsed(now),
            },
            now,
        );

        let score = FlowScore {
            session_id: self.context.session_id,
            total,
            subscores,
            confidence: self.baseline.confidence(),
            state: self.machine.state(),
            computed_at: now,
        };
        log::debug!(
            "cycle total={} state={} avg={:.1}",
            score.total,
            score.state.as_str(),
            self.machine.avg_score()
        );

        self.last_score = Some(score.clone());
        self.last_computed_at = Some(now);
        CycleOutcome {
            score: Some(score),
            transition,
        }
    }

    /// Session snapshot for display and sync
    pub fn summary(&self, now: DateTime<Utc>, active: bool) -> SessionSummary {
        SessionSummary {
            session_id: self.context.session_id,
            active,
            elapsed_seconds: (now - self.context.started_at).num_seconds().max(0),
            current_hr: self.context.current_hr,
            current_total: self.last_score.as_ref().map(|s| s.total),
            current_state: self.machine.state(),
        }
    }

    /// Clear all session-scoped state. The beat buffer, score history, and
    /// context are discarded together, so nothing from session N is visible
    /// to session N+1.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.beats.reset();
        self.machine.reset(now);
        self.context = SessionContext::new(now);
        self.last_score = None;
        self.last_computed_at = None;
    }
}
