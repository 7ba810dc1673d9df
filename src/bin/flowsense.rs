//! Flowsense CLI - replay recorded biometric streams through the engine
//!
//! Commands:
//! - replay: drive a session deterministically from NDJSON events
//! - schema: print example input records

use clap::{Parser, Subcommand};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use flowsense::engine::{EngineConfig, FlowEngine};
use flowsense::error::EngineError;
use flowsense::types::StateChange;
use flowsense::{PersonalBaseline, ENGINE_VERSION};

/// Flowsense - flow-state estimation from streaming biometric signals
#[derive(Parser)]
#[command(name = "flowsense")]
#[command(version = ENGINE_VERSION)]
#[command(about = "Replay biometric streams through the flow engine", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay NDJSON session events and emit NDJSON flow scores
    Replay {
        /// Input file path (use - for stdin)
        #[arg(short, long)]
        input: PathBuf,

        /// Output file path (use - for stdout)
        #[arg(short, long)]
        output: PathBuf,

        /// Personal baseline JSON file; without one a synthetic calibrated
        /// baseline is built from --resting-hr and --rmssd
        #[arg(long)]
        baseline: Option<PathBuf>,

        /// Resting heart rate for the synthetic baseline (bpm)
        #[arg(long, default_value = "60.0")]
        resting_hr: f64,

        /// Baseline RMSSD for the synthetic baseline (ms)
        #[arg(long, default_value = "60.0")]
        rmssd: f64,

        /// Also emit state-change records
        #[arg(long)]
        transitions: bool,
    },

    /// Print example input records
    Schema,
}

/// One NDJSON input record for `replay`
#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ReplayEvent {
    /// Raw heartbeat timestamp
    Beat { at: DateTime<Utc> },
    /// Instantaneous heart-rate sample
    HrSample { at: DateTime<Utc>, bpm: f64 },
    /// Sleep-quality update (0-100)
    Sleep { quality: f64 },
    /// Active substance levels in mg by name
    Substances { levels: HashMap<String, f64> },
}

impl ReplayEvent {
    fn at(&self) -> Option<DateTime<Utc>> {
        match self {
            ReplayEvent::Beat { at } | ReplayEvent::HrSample { at, .. } => Some(*at),
            _ => None,
        }
    }
}

fn main() -> ExitCode {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Replay {
            input,
            output,
            baseline,
            resting_hr,
            rmssd,
            transitions,
        } => replay(input, output, baseline, resting_hr, rmssd, transitions),
        Commands::Schema => {
            print_schema();
            Ok(())
        }
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn replay(
    input: PathBuf,
    output: PathBuf,
    baseline_path: Option<PathBuf>,
    resting_hr: f64,
    rmssd: f64,
    transitions: bool,
) -> Result<(), EngineError> {
    let baseline = match baseline_path {
        Some(path) => {
            let json = fs::read_to_string(&path)
                .map_err(|e| EngineError::InvalidReplayEvent(format!("{}: {e}", path.display())))?;
            PersonalBaseline::from_json(&json)?
        }
        None => PersonalBaseline {
            resting_hr_bpm: resting_hr,
            baseline_rmssd_ms: rmssd,
            circadian_rmssd_ms: None,
            calibration_days: 30,
        },
    };

    let lines = read_lines(&input)?;
    let mut writer = open_output(&output)?;

    let mut engine: Option<FlowEngine> = None;
    let mut last_emitted_at: Option<DateTime<Utc>> = None;

    for (lineno, line) in lines.iter().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let event: ReplayEvent = serde_json::from_str(line).map_err(|e| {
            EngineError::InvalidReplayEvent(format!("line {}: {e}", lineno + 1))
        })?;

        // The session clock starts at the first timestamped event
        if engine.is_none() {
            let Some(at) = event.at() else {
                return Err(EngineError::InvalidReplayEvent(format!(
                    "line {}: context record before any timestamped event",
                    lineno + 1
                )));
            };
            engine = Some(FlowEngine::new(baseline.clone(), EngineConfig::default(), at));
        }
        let Some(engine) = engine.as_mut() else {
            continue;
        };

        let recompute_at = match event {
            ReplayEvent::Beat { at } => {
                engine.on_beat(at);
                Some(at)
            }
            ReplayEvent::HrSample { at, bpm } => {
                engine.on_hr_sample(flowsense::HrSample {
                    bpm,
                    observed_at: at,
                });
                Some(at)
            }
            ReplayEvent::Sleep { quality } => {
                engine.set_sleep_quality(quality);
                None
            }
            ReplayEvent::Substances { levels } => {
                engine.set_substance_levels(levels);
                None
            }
        };

        if let Some(at) = recompute_at {
            let outcome = engine.recompute(at);
            if transitions {
                if let Some(change) = outcome.transition {
                    write_record(&mut writer, &TransitionRecord::from(change))?;
                }
            }
            if let Some(score) = outcome.score {
                // The spacing guard returns cached scores; emit fresh ones only
                if last_emitted_at != Some(score.computed_at) {
                    last_emitted_at = Some(score.computed_at);
                    write_record(&mut writer, &score)?;
                }
            }
        }
    }

    writer.flush().map_err(io_err)?;
    Ok(())
}

#[derive(Serialize)]
struct TransitionRecord {
    record: &'static str,
    #[serde(flatten)]
    change: StateChange,
}

impl From<StateChange> for TransitionRecord {
    fn from(change: StateChange) -> Self {
        Self {
            record: "transition",
            change,
        }
    }
}

fn read_lines(input: &PathBuf) -> Result<Vec<String>, EngineError> {
    if input.to_string_lossy() == "-" {
        if atty::is(atty::Stream::Stdin) {
            eprintln!("reading NDJSON events from stdin (pipe input or Ctrl-D to end)");
        }
        io::stdin()
            .lock()
            .lines()
            .collect::<Result<_, _>>()
            .map_err(io_err)
    } else {
        let content = fs::read_to_string(input).map_err(io_err)?;
        Ok(content.lines().map(String::from).collect())
    }
}

fn open_output(output: &PathBuf) -> Result<Box<dyn Write>, EngineError> {
    if output.to_string_lossy() == "-" {
        Ok(Box::new(io::stdout().lock()))
    } else {
        Ok(Box::new(fs::File::create(output).map_err(io_err)?))
    }
}

fn write_record<T: Serialize>(writer: &mut Box<dyn Write>, record: &T) -> Result<(), EngineError> {
    let json = serde_json::to_string(record)?;
    writeln!(writer, "{json}").map_err(io_err)
}

fn io_err(e: io::Error) -> EngineError {
    EngineError::InvalidReplayEvent(e.to_string())
}

fn print_schema() {
    println!(
        "{}",
        [
            r#"{"type":"beat","at":"2024-01-15T10:00:00.000Z"}"#,
            r#"{"type":"hr_sample","at":"2024-01-15T10:00:05.000Z","bpm":66.0}"#,
            r#"{"type":"sleep","quality":85.0}"#,
            r#"{"type":"substances","levels":{"caffeine":100.0,"theanine":200.0}}"#,
        ]
        .join("\n")
    );
}
