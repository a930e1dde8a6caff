//! Raw per-tick telemetry as it arrives from the interview front end.
//!
//! Field names follow the front end's camelCase JSON. Execution attempts are
//! deserialized leniently: missing or oddly typed fields never reject a
//! request, they turn the attempt into a failing one.

use crate::Difficulty;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// One run of the candidate's code against the test cases.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExecutionAttempt {
    /// Truthiness of the reported `passed` field; absent counts as failed.
    #[serde(default, deserialize_with = "truthy")]
    pub passed: bool,
    /// Error text, if any was reported.
    #[serde(
        default,
        deserialize_with = "error_text",
        skip_serializing_if = "Option::is_none"
    )]
    pub error: Option<String>,
}

impl ExecutionAttempt {
    /// An attempt fails when it did not pass or reported an error.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        !self.passed || self.error.is_some()
    }
}

fn truthy<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => false,
        Value::Bool(b) => b,
        Value::Number(n) => n.as_f64().is_some_and(|x| x != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    })
}

fn error_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s),
        Value::Bool(false) => None,
        other => Some(other.to_string()),
    })
}

/// Editor progress counters reported with every tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressMetrics {
    pub lines_written: u64,
    pub code_complexity: f64,
    pub total_changes: u64,
    pub consecutive_failures: u32,
    pub hints_remaining: Option<u32>,
}

/// Editor or proctoring event observed between ticks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MonitoringEvent {
    /// Event kind, e.g. "paste", "tab_switch", "run".
    pub r#type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Value>,
    /// Remaining event fields, kept verbatim.
    #[serde(flatten)]
    pub data: BTreeMap<String, Value>,
}

/// Everything a tick carries apart from the session it belongs to.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepTelemetry {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub problem: String,
    #[serde(default)]
    pub language: String,
    /// Seconds since the last edit.
    #[serde(default)]
    pub pause_duration: f64,
    #[serde(default)]
    pub progress_metrics: ProgressMetrics,
    #[serde(default)]
    pub execution_attempts: Vec<ExecutionAttempt>,
    #[serde(default)]
    pub hints_used: u32,
    #[serde(default)]
    pub monitoring_events: Vec<MonitoringEvent>,
}

/// A tick addressed to an existing session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRequest {
    pub session_id: String,
    #[serde(flatten)]
    pub telemetry: StepTelemetry,
}

/// Parameters for opening a new interview session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRequest {
    pub candidate_id: String,
    pub problem_id: String,
    pub language: String,
    #[serde(default)]
    pub difficulty: Difficulty,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn attempt_missing_fields_is_a_failure() {
        let a: ExecutionAttempt = serde_json::from_value(json!({})).unwrap();
        assert!(!a.passed);
        assert!(a.error.is_none());
        assert!(a.is_failure());
    }

    #[test]
    fn attempt_passed_follows_truthiness() {
        let cases = [
            (json!({"passed": true}), true),
            (json!({"passed": 1}), true),
            (json!({"passed": "yes"}), true),
            (json!({"passed": 0}), false),
            (json!({"passed": ""}), false),
            (json!({"passed": null}), false),
            (json!({"passed": []}), false),
        ];
        for (raw, expected) in cases {
            let a: ExecutionAttempt = serde_json::from_value(raw.clone()).unwrap();
            assert_eq!(a.passed, expected, "{raw}");
        }
    }

    #[test]
    fn passing_attempt_with_error_still_fails() {
        let a: ExecutionAttempt =
            serde_json::from_value(json!({"passed": true, "error": "AssertionError"})).unwrap();
        assert!(a.is_failure());

        let a: ExecutionAttempt =
            serde_json::from_value(json!({"passed": true, "error": ""})).unwrap();
        assert!(!a.is_failure());
    }

    #[test]
    fn non_string_error_is_kept_as_json_text() {
        let a: ExecutionAttempt =
            serde_json::from_value(json!({"passed": false, "error": {"code": 3}})).unwrap();
        assert_eq!(a.error.as_deref(), Some(r#"{"code":3}"#));
    }

    #[test]
    fn step_request_flattens_telemetry() {
        let raw = json!({
            "sessionId": "s-1",
            "code": "def f(x): pass",
            "problem": "two-sum",
            "language": "python",
            "pauseDuration": 50,
            "progressMetrics": {"totalChanges": 4, "linesWritten": 1},
            "executionAttempts": [{"passed": false, "error": "TypeError: bad"}],
            "hintsUsed": 1,
            "monitoringEvents": [{"type": "paste", "chars": 120}]
        });
        let req: StepRequest = serde_json::from_value(raw).unwrap();
        assert_eq!(req.session_id, "s-1");
        assert_eq!(req.telemetry.progress_metrics.total_changes, 4);
        assert!((req.telemetry.pause_duration - 50.0).abs() < f64::EPSILON);
        assert_eq!(req.telemetry.monitoring_events[0].r#type, "paste");
        assert_eq!(
            req.telemetry.monitoring_events[0].data.get("chars"),
            Some(&json!(120))
        );
    }

    #[test]
    fn monitoring_event_roundtrip_keeps_type_name() {
        let event = MonitoringEvent {
            r#type: "tab_switch".into(),
            timestamp: Some(json!(1_700_000_000_000_u64)),
            data: BTreeMap::new(),
        };
        let serialized = serde_json::to_string(&event).unwrap();
        assert!(serialized.contains("\"type\":\"tab_switch\""));
        assert!(!serialized.contains("r#type"));
        let back: MonitoringEvent = serde_json::from_str(&serialized).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn start_request_defaults_difficulty() {
        let req: StartRequest = serde_json::from_value(json!({
            "candidateId": "c", "problemId": "p", "language": "python"
        }))
        .unwrap();
        assert_eq!(req.difficulty, Difficulty::Medium);
    }
}
