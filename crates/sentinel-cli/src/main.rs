//! CLI for sentinel.
//!
//! Replays recorded tick telemetry through the bandit engine and inspects the
//! NDJSON tick log it produces. JSON goes to stdout, logs to stderr.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use sentinel_core::telemetry::{StartRequest, StepRequest, StepTelemetry};
use sentinel_core::{Difficulty, Policy};
use sentinel_feedback::stats::DEFAULT_RECENT_SIGNALS;
use sentinel_feedback::{
    read_records, FeedbackAnalyzer, TickLog, TrainingStats, WeightAdjustmentProposal,
};
use sentinel_session::{
    Engine, EngineConfig, GrokConfig, GrokHintGenerator, HintGenerator, OfflineHints,
    SessionStarted, StepOutcome,
};
use serde::Serialize;
use serde_json::Value;
use std::fs::File;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_TICK_LOG: &str = "data/rl_training_data.jsonl";
const BASIS_POLICY: &str = "linear-bandit";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive one session from a JSONL file of tick telemetry
    Simulate {
        /// Telemetry file, one tick per line
        #[arg(long)]
        input: PathBuf,

        #[arg(long, default_value = "local-candidate")]
        candidate: String,

        #[arg(long, default_value = "local-problem")]
        problem: String,

        #[arg(long, default_value = "python")]
        language: String,

        /// easy, medium or hard (anything else counts as medium)
        #[arg(long, default_value = "medium")]
        difficulty: String,

        /// Seed for the session's random source
        #[arg(long, env = "SENTINEL_SEED")]
        seed: Option<u64>,

        /// Engine config file (JSON)
        #[arg(long, env = "SENTINEL_CONFIG")]
        config: Option<PathBuf>,

        /// Append every tick to this NDJSON log
        #[arg(long, env = "SENTINEL_TICK_LOG")]
        tick_log: Option<PathBuf>,

        /// Never call the hint model
        #[arg(long)]
        offline: bool,

        /// Bandit snapshot to start from
        #[arg(long)]
        warm_start: Option<PathBuf>,

        /// Write the final bandit snapshot here
        #[arg(long)]
        snapshot_out: Option<PathBuf>,
    },
    /// Summarize a tick log
    Stats {
        #[arg(long, env = "SENTINEL_TICK_LOG", default_value = DEFAULT_TICK_LOG)]
        log: PathBuf,

        /// Number of trailing records to include
        #[arg(long, default_value_t = DEFAULT_RECENT_SIGNALS)]
        recent: usize,
    },
    /// Propose policy adjustments from a tick log
    Analyze {
        #[arg(long, env = "SENTINEL_TICK_LOG", default_value = DEFAULT_TICK_LOG)]
        log: PathBuf,

        /// Minimum number of ticks before anything is proposed
        #[arg(long, default_value_t = 10)]
        min_ticks: usize,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SimulationReport {
    session: SessionStarted,
    steps: Vec<StepOutcome>,
    reward_baseline: f64,
    snapshot: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnalysisReport {
    ticks_analyzed: usize,
    patterns: Vec<String>,
    proposal: Option<WeightAdjustmentProposal>,
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let mut out = io::stdout().lock();
    serde_json::to_writer_pretty(&mut out, value)?;
    writeln!(out)?;
    Ok(())
}

fn read_json(path: &Path) -> Result<Value> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    serde_json::to_writer_pretty(file, value)?;
    Ok(())
}

/// Reads tick telemetry, skipping blank lines.
fn read_telemetry(path: &Path) -> Result<Vec<StepTelemetry>> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut ticks = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let tick = serde_json::from_str(&line)
            .with_context(|| format!("Malformed telemetry on line {}", idx + 1))?;
        ticks.push(tick);
    }
    Ok(ticks)
}

fn hint_generator(offline: bool) -> Arc<dyn HintGenerator> {
    if offline {
        return Arc::new(OfflineHints);
    }
    match GrokHintGenerator::new(GrokConfig::from_env()) {
        Ok(generator) => Arc::new(generator),
        Err(e) => {
            warn!(error = %e, "hint model unavailable, using fallback hints");
            Arc::new(OfflineHints)
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn simulate(
    input: &Path,
    start: StartRequest,
    seed: Option<u64>,
    config: Option<&Path>,
    tick_log: Option<&Path>,
    offline: bool,
    warm_start: Option<&Path>,
    snapshot_out: Option<&Path>,
) -> Result<()> {
    let mut engine_config = match config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => EngineConfig::default(),
    };
    if seed.is_some() {
        engine_config.seed = seed;
    }

    let mut engine = Engine::new(engine_config, hint_generator(offline));
    if let Some(path) = tick_log {
        let log = TickLog::open(path)
            .with_context(|| format!("Failed to open tick log {}", path.display()))?;
        engine = engine.with_sink(Arc::new(log));
    }

    let ticks = read_telemetry(input)?;
    let session = engine.start_session(start);
    if let Some(path) = warm_start {
        engine
            .restore_weights(&session.session_id, read_json(path)?)
            .await
            .with_context(|| format!("Invalid warm-start snapshot {}", path.display()))?;
    }

    let mut steps = Vec::with_capacity(ticks.len());
    for telemetry in ticks {
        let outcome = engine
            .step(StepRequest {
                session_id: session.session_id.clone(),
                telemetry,
            })
            .await?;
        steps.push(outcome);
    }

    let state = engine.session(&session.session_id).await?;
    let snapshot = state.bandit.snapshot();
    if let Some(path) = snapshot_out {
        write_json(path, &snapshot)?;
    }
    info!(
        session_id = %session.session_id,
        ticks = steps.len(),
        baseline = state.reward_baseline(),
        "simulation finished"
    );

    print_json(&SimulationReport {
        session,
        steps,
        reward_baseline: state.reward_baseline(),
        snapshot,
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Simulate {
            input,
            candidate,
            problem,
            language,
            difficulty,
            seed,
            config,
            tick_log,
            offline,
            warm_start,
            snapshot_out,
        } => {
            let start = StartRequest {
                candidate_id: candidate,
                problem_id: problem,
                language,
                difficulty: Difficulty::from(difficulty.as_str()),
            };
            simulate(
                &input,
                start,
                seed,
                config.as_deref(),
                tick_log.as_deref(),
                offline,
                warm_start.as_deref(),
                snapshot_out.as_deref(),
            )
            .await
        }
        Commands::Stats { log, recent } => {
            let records = read_records(&log)
                .with_context(|| format!("Failed to read tick log {}", log.display()))?;
            print_json(&TrainingStats::from_records(&records, recent))
        }
        Commands::Analyze { log, min_ticks } => {
            let records = read_records(&log)
                .with_context(|| format!("Failed to read tick log {}", log.display()))?;
            let analyzer = FeedbackAnalyzer::new(min_ticks, 0.5);
            print_json(&AnalysisReport {
                ticks_analyzed: records.len(),
                patterns: analyzer.analyze_patterns(&records),
                proposal: analyzer.propose_adjustment(BASIS_POLICY, &records),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_simulate_flags() {
        let cli = Cli::try_parse_from([
            "sentinel",
            "simulate",
            "--input",
            "ticks.jsonl",
            "--seed",
            "3",
            "--offline",
            "--difficulty",
            "hard",
        ])
        .unwrap();
        match cli.command {
            Commands::Simulate {
                input,
                seed,
                offline,
                difficulty,
                ..
            } => {
                assert_eq!(input, PathBuf::from("ticks.jsonl"));
                assert_eq!(seed, Some(3));
                assert!(offline);
                assert_eq!(Difficulty::from(difficulty.as_str()), Difficulty::Hard);
            }
            _ => panic!("expected simulate"),
        }
    }

    #[test]
    fn telemetry_reader_skips_blank_lines_and_reports_bad_ones() {
        let dir = std::env::temp_dir().join(format!("sentinel_cli_reader_{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();

        let good = dir.join("good.jsonl");
        std::fs::write(&good, "{\"code\":\"x = 1\"}\n\n{\"pauseDuration\": 4}\n").unwrap();
        let ticks = read_telemetry(&good).unwrap();
        assert_eq!(ticks.len(), 2);
        assert!((ticks[1].pause_duration - 4.0).abs() < f64::EPSILON);

        let bad = dir.join("bad.jsonl");
        std::fs::write(&bad, "{}\nnot json\n").unwrap();
        let err = read_telemetry(&bad).unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }
}
