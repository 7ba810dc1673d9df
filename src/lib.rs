//! Flowsense - On-device flow-state estimation engine
//!
//! Flowsense turns streaming biometric signals into a stable, discrete flow
//! classification plus a 0-100 score through a deterministic per-cycle
//! pipeline: beat interval validation → RMSSD derivation → four weighted
//! subscores → hysteretic state classification.
//!
//! ## Modules
//!
//! - **beat**: validated RR intervals and rolling RMSSD over a bounded buffer
//! - **scoring**: the four pure subscore calculators (HRV, HR, sleep, substance)
//! - **state_machine**: dwell-time-stabilized classification over smoothed scores
//! - **engine**: the session-scoped recompute core
//! - **session**: async runtime owning a session's state behind channels

pub mod baseline;
pub mod beat;
pub mod engine;
pub mod error;
pub mod scoring;
pub mod session;
pub mod state_machine;
pub mod types;

pub use baseline::PersonalBaseline;
pub use engine::{CycleOutcome, EngineConfig, FlowEngine};
pub use error::EngineError;
pub use session::{start_session, Session, SessionHandle};
pub use state_machine::FlowStateMachine;
pub use types::{
    EngineEvent, FlowScore, FlowState, HapticCue, HrSample, SessionSummary, StateChange, Subscores,
};

/// Engine version embedded in replay output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for emitted payloads
pub const PRODUCER_NAME: &str = "flowsense";
