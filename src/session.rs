//! Session runtime
//!
//! Wraps a [`FlowEngine`] in a single-consumer task that owns all mutable
//! session state. Producers (beat callbacks, sample callbacks, UI queries)
//! hand data over an mpsc channel and never touch shared state directly.
//!
//! Two scheduling sources feed the same recompute entry point: a periodic
//! tick and a debounced reaction to new heart data. The engine's spacing
//! guard makes overlap harmless. Stopping a session cancels both and drops
//! every piece of session state with the task.

use crate::engine::{CycleOutcome, EngineConfig, FlowEngine};
use crate::error::EngineError;
use crate::types::{EngineEvent, FlowScore, HrSample, SessionSummary};
use crate::baseline::PersonalBaseline;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

const COMMAND_QUEUE_DEPTH: usize = 256;
const EVENT_QUEUE_DEPTH: usize = 32;

/// Debounce sleep parked far in the future while no recompute is pending
const PARKED: Duration = Duration::from_secs(24 * 60 * 60);

enum Command {
    Beat(DateTime<Utc>),
    HrSample(HrSample),
    SleepQuality(f64),
    SubstanceLevels(HashMap<String, f64>),
    Summary(oneshot::Sender<SessionSummary>),
}

/// Handle to a running session.
///
/// Cloneable; dropping all clones does not stop the session, [`stop`](Self::stop)
/// does.
#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    cancel: CancellationToken,
    scores: watch::Receiver<Option<FlowScore>>,
    events: broadcast::Sender<EngineEvent>,
}

/// Running session: the handle plus the join side used by [`SessionHandle::stop`]
pub struct Session {
    handle: SessionHandle,
    join: JoinHandle<()>,
}

/// Spawn a session runtime on the current tokio runtime.
pub fn start_session(baseline: PersonalBaseline, config: EngineConfig) -> Session {
    let (commands_tx, commands_rx) = mpsc::channel(COMMAND_QUEUE_DEPTH);
    let (scores_tx, scores_rx) = watch::channel(None);
    let (events_tx, _) = broadcast::channel(EVENT_QUEUE_DEPTH);
    let cancel = CancellationToken::new();

    let wall_anchor = Utc::now();
    let engine = FlowEngine::new(baseline, config, wall_anchor);
    log::info!("session {} started", engine.context().session_id);

    let worker = SessionWorker {
        engine,
        commands: commands_rx,
        cancel: cancel.clone(),
        scores: scores_tx,
        events: events_tx.clone(),
        wall_anchor,
        mono_anchor: Instant::now(),
    };
    let join = tokio::spawn(worker.run());

    Session {
        handle: SessionHandle {
            commands: commands_tx,
            cancel,
            scores: scores_rx,
            events: events_tx,
        },
        join,
    }
}

impl Session {
    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    /// Stop the session: cancels the tick and any pending debounced work,
    /// then waits for the worker to drop all session state.
    pub async fn stop(self) -> Result<(), EngineError> {
        self.handle.cancel.cancel();
        self.join
            .await
            .map_err(|e| EngineError::RuntimeFailure(e.to_string()))
    }
}

impl SessionHandle {
    /// Hand a raw heartbeat timestamp to the session
    pub async fn push_beat(&self, at: DateTime<Utc>) -> Result<(), EngineError> {
        self.send(Command::Beat(at)).await
    }

    /// Hand an instantaneous heart-rate sample to the session
    pub async fn push_hr_sample(&self, sample: HrSample) -> Result<(), EngineError> {
        self.send(Command::HrSample(sample)).await
    }

    /// Update the sleep-quality score (0-100) from the sleep collaborator
    pub async fn set_sleep_quality(&self, quality: f64) -> Result<(), EngineError> {
        self.send(Command::SleepQuality(quality)).await
    }

    /// Update active substance levels (mg by substance name)
    pub async fn set_substance_levels(
        &self,
        levels: HashMap<String, f64>,
    ) -> Result<(), EngineError> {
        self.send(Command::SubstanceLevels(levels)).await
    }

    /// Snapshot of the session for display/sync
    pub async fn summary(&self) -> Result<SessionSummary, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Summary(tx)).await?;
        rx.await.map_err(|_| EngineError::SessionClosed)
    }

    /// Latest published score, if any cycle has run yet
    pub fn latest_score(&self) -> Option<FlowScore> {
        self.scores.borrow().clone()
    }

    /// Watch channel carrying the latest score
    pub fn score_watch(&self) -> watch::Receiver<Option<FlowScore>> {
        self.scores.clone()
    }

    /// Subscribe to score and state-change events (haptics, sync)
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    async fn send(&self, command: Command) -> Result<(), EngineError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| EngineError::SessionClosed)
    }
}

struct SessionWorker {
    engine: FlowEngine,
    commands: mpsc::Receiver<Command>,
    cancel: CancellationToken,
    scores: watch::Sender<Option<FlowScore>>,
    events: broadcast::Sender<EngineEvent>,
    wall_anchor: DateTime<Utc>,
    mono_anchor: Instant,
}

impl SessionWorker {
    /// Session clock: wall time at start plus monotonic elapsed time.
    /// Immune to wall-clock jumps mid-session.
    fn now(&self) -> DateTime<Utc> {
        self.wall_anchor + chrono::Duration::milliseconds(self.mono_anchor.elapsed().as_millis() as i64)
    }

    async fn run(mut self) {
        let mut ticker = tokio::time::interval(Duration::from_secs(self.engine.config().tick_secs));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let debounce_window = Duration::from_secs(self.engine.config().debounce_secs);

        let debounce = tokio::time::sleep(PARKED);
        tokio::pin!(debounce);
        let mut debounce_armed = false;

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    log::info!("session {} stopping", self.engine.context().session_id);
                    break;
                }
                _ = ticker.tick() => {
                    let outcome = self.engine.recompute(self.now());
                    self.publish(outcome);
                }
                () = &mut debounce, if debounce_armed => {
                    debounce_armed = false;
                    let outcome = self.engine.recompute(self.now());
                    self.publish(outcome);
                }
                command = self.commands.recv() => {
                    match command {
                        None => break,
                        Some(command) => {
                            if self.apply(command)
                                && !debounce_armed
                            {
                                // Coalesce a burst of samples into one recompute
                                debounce.as_mut().reset(Instant::now() + debounce_window);
                                debounce_armed = true;
                            }
                        }
                    }
                }
            }
        }
        // Dropping the worker drops the beat buffer, score history, and
        // context together; a following session starts from nothing.
    }

    /// Apply one command; returns whether a debounced recompute is warranted
    fn apply(&mut self, command: Command) -> bool {
        match command {
            Command::Beat(at) => self.engine.on_beat(at),
            Command::HrSample(sample) => self.engine.on_hr_sample(sample),
            Command::SleepQuality(quality) => {
                self.engine.set_sleep_quality(quality);
                false
            }
            Command::SubstanceLevels(levels) => {
                self.engine.set_substance_levels(levels);
                false
            }
            Command::Summary(reply) => {
                let _ = reply.send(self.engine.summary(self.now(), true));
                false
            }
        }
    }

    fn publish(&mut self, outcome: CycleOutcome) {
        if let Some(change) = outcome.transition {
            // Subscribers may come and go; a lagging haptic consumer is not
            // an engine failure
            let _ = self.events.send(EngineEvent::StateChanged(change));
        }
        if let Some(score) = outcome.score {
            let _ = self.events.send(EngineEvent::ScoreUpdated(score.clone()));
            self.scores.send_replace(Some(score));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FlowState;
    use pretty_assertions::assert_eq;

    fn calibrated_baseline() -> PersonalBaseline {
        PersonalBaseline {
            resting_hr_bpm: 55.0,
            baseline_rmssd_ms: 60.0,
            circadian_rmssd_ms: None,
            calibration_days: 30,
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            tick_secs: 60,
            debounce_secs: 5,
            ..EngineConfig::default()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_initial_tick_publishes_calibrating_score() {
        let session = start_session(PersonalBaseline::uncalibrated(), fast_config());
        let handle = session.handle();

        // First interval tick fires immediately; give the worker a turn
        tokio::time::sleep(Duration::from_millis(50)).await;

        let score = handle.latest_score().unwrap();
        assert_eq!(score.state, FlowState::Calibrating);
        assert_eq!(score.total, 0);

        session.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounced_recompute_after_sample() {
        let session = start_session(calibrated_baseline(), fast_config());
        let handle = session.handle();

        tokio::time::sleep(Duration::from_millis(50)).await;
        // The immediate tick ran with no heart data: nothing scored yet
        // beyond the empty no-op, so the watch still holds no real total
        handle
            .push_hr_sample(HrSample {
                bpm: 66.0,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();

        // Within the debounce window nothing new publishes
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(handle.latest_score().is_none());

        // After the window the coalesced recompute runs
        tokio::time::sleep(Duration::from_secs(4)).await;
        let score = handle.latest_score().unwrap();
        assert_eq!(score.subscores.hr, 30.0);

        session.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_beat_burst_coalesces_into_one_recompute() {
        let session = start_session(calibrated_baseline(), fast_config());
        let handle = session.handle();
        let mut events = handle.subscribe();
        tokio::time::sleep(Duration::from_millis(50)).await;

        let mut at = Utc::now();
        for _ in 0..10 {
            at += chrono::Duration::milliseconds(800);
            handle.push_beat(at).await.unwrap();
        }
        tokio::time::sleep(Duration::from_secs(10)).await;

        // One coalesced score event for the whole burst
        let mut score_events = 0;
        while let Ok(event) = events.try_recv() {
            if matches!(event, EngineEvent::ScoreUpdated(_)) {
                score_events += 1;
            }
        }
        assert_eq!(score_events, 1);

        session.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_summary_round_trip() {
        let session = start_session(calibrated_baseline(), fast_config());
        let handle = session.handle();
        tokio::time::sleep(Duration::from_millis(50)).await;

        handle
            .push_hr_sample(HrSample {
                bpm: 70.0,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let summary = handle.summary().await.unwrap();
        assert!(summary.active);
        assert_eq!(summary.current_hr, Some(70.0));
        assert!(summary.current_total.is_some());

        session.stop().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_the_session() {
        let session = start_session(calibrated_baseline(), fast_config());
        let handle = session.handle();
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.stop().await.unwrap();

        let result = handle
            .push_hr_sample(HrSample {
                bpm: 70.0,
                observed_at: Utc::now(),
            })
            .await;
        assert!(matches!(result, Err(EngineError::SessionClosed)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_state_change_event_carries_cue() {
        let session = start_session(calibrated_baseline(), fast_config());
        let handle = session.handle();
        let mut events = handle.subscribe();
        tokio::time::sleep(Duration::from_millis(50)).await;

        // Strong flow signature: hr ratio 1.2, full sleep, rmssd fallback
        handle.set_sleep_quality(100.0).await.unwrap();
        handle
            .push_hr_sample(HrSample {
                bpm: 66.0,
                observed_at: Utc::now(),
            })
            .await
            .unwrap();

        // Let the debounced cycle, the dwell window, and a periodic tick pass
        tokio::time::sleep(Duration::from_secs(130)).await;

        let mut saw_transition = false;
        while let Ok(event) = events.try_recv() {
            if let EngineEvent::StateChanged(change) = event {
                saw_transition = true;
                assert_eq!(change.cue, crate::types::HapticCue::for_state(change.to));
            }
        }
        assert!(saw_transition);

        session.stop().await.unwrap();
    }
}
