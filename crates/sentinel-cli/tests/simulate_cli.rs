//! End-to-end runs of the `sentinel` binary against the telemetry fixture.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

fn fixture() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../tests/fixtures/step/session.ok.jsonl")
}

fn scratch(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("sentinel_cli_{name}_{}", std::process::id()));
    let _ = fs::remove_dir_all(&dir);
    fs::create_dir_all(&dir).unwrap_or_else(|e| panic!("cannot create {dir:?}: {e}"));
    dir
}

fn sentinel() -> Command {
    let mut cmd = Command::cargo_bin("sentinel").unwrap_or_else(|e| panic!("binary missing: {e}"));
    cmd.env_remove("SENTINEL_TICK_LOG")
        .env_remove("SENTINEL_CONFIG")
        .env_remove("SENTINEL_SEED")
        .env_remove("RUST_LOG");
    cmd
}

fn simulate(dir: &Path, seed: &str) -> Value {
    let output = sentinel()
        .args(["simulate", "--offline", "--seed", seed, "--input"])
        .arg(fixture())
        .arg("--tick-log")
        .arg(dir.join("ticks.jsonl"))
        .output()
        .unwrap_or_else(|e| panic!("failed to run sentinel: {e}"));
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| panic!("stdout is not JSON: {e}"))
}

#[test]
fn simulate_replays_every_tick() {
    let dir = scratch("simulate");
    let report = simulate(&dir, "11");

    let steps = report["steps"].as_array().expect("steps array");
    assert_eq!(steps.len(), 3);
    assert!(steps[0]["rewardApplied"].as_f64().expect("reward").abs() < f64::EPSILON);
    for step in steps {
        assert!(step["action"].is_string());
        assert!(step["nextEvaluationMs"].as_u64().is_some());
        assert_eq!(step["sessionExpired"], false);
        assert_eq!(step["contextFeatures"]["featureVector"].as_array().map(Vec::len), Some(9));
    }
    assert!(report["session"]["sessionId"].is_string());
    assert_eq!(report["snapshot"]["weights"].as_object().map(|w| w.len()), Some(7));

    let log = fs::read_to_string(dir.join("ticks.jsonl")).expect("tick log written");
    assert_eq!(log.lines().count(), 3);
}

#[test]
fn same_seed_same_actions() {
    let first = simulate(&scratch("seed_a"), "5");
    let second = simulate(&scratch("seed_b"), "5");
    let actions = |report: &Value| -> Vec<Value> {
        report["steps"]
            .as_array()
            .expect("steps array")
            .iter()
            .map(|s| s["action"].clone())
            .collect()
    };
    assert_eq!(actions(&first), actions(&second));
}

#[test]
fn stats_and_analyze_read_the_tick_log() {
    let dir = scratch("stats");
    simulate(&dir, "1");
    simulate(&dir, "2");
    let log = dir.join("ticks.jsonl");

    sentinel()
        .args(["stats", "--recent", "2", "--log"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"totalAssessments\": 2"))
        .stdout(predicate::str::contains("\"trainingDataPoints\": 6"));

    sentinel()
        .args(["analyze", "--log"])
        .arg(&log)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"ticksAnalyzed\": 6"))
        .stdout(predicate::str::contains("\"proposal\": null"));
}

#[test]
fn snapshot_out_feeds_warm_start() {
    let dir = scratch("warm");
    let snapshot = dir.join("bandit.json");
    sentinel()
        .args(["simulate", "--offline", "--seed", "3", "--input"])
        .arg(fixture())
        .arg("--snapshot-out")
        .arg(&snapshot)
        .assert()
        .success();
    assert!(snapshot.exists());

    sentinel()
        .args(["simulate", "--offline", "--seed", "3", "--input"])
        .arg(fixture())
        .arg("--warm-start")
        .arg(&snapshot)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"steps\""));
}

#[test]
fn missing_input_fails_with_context() {
    sentinel()
        .args(["simulate", "--offline", "--input", "/definitely/not/here.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to open"));
}

#[test]
fn missing_log_fails() {
    sentinel()
        .args(["stats", "--log", "/definitely/not/here.jsonl"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read tick log"));
}
