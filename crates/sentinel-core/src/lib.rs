//! Core types and traits shared by the sentinel crates.
//!
//! A tick of an interview session is reduced to a typed [`Context`], encoded
//! into a fixed-size [`FeatureVector`] and handed to a [`Policy`] that picks one
//! of the seven pedagogical [`Action`]s. Everything a tick produces is captured
//! in a [`TickRecord`] that can be forwarded to a [`TickSink`].

pub mod telemetry;

use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Number of slots in a [`FeatureVector`].
pub const FEATURE_DIM: usize = 9;

/// Feature names, positionally aligned with [`FeatureVector`].
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "pause_norm",
    "cleanliness",
    "fail_rate",
    "hints_norm",
    "difficulty_norm",
    "error_syntax",
    "error_runtime",
    "error_edge_case",
    "error_timeout",
];

/// Index of the first one-hot error slot.
pub const ERROR_SLOT_OFFSET: usize = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CoreError {
    #[error("Unknown action: {0}")]
    UnknownAction(String),
}

/// Closed set of pedagogical interventions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    NoHint,
    GentleHint,
    StrongHint,
    DebugFollowup,
    RefactorFollowup,
    OptimizationFollowup,
    EdgeCaseFollowup,
}

impl Action {
    /// All actions in selection order. Ties in scoring resolve to the earlier entry.
    pub const ALL: [Action; 7] = [
        Action::NoHint,
        Action::GentleHint,
        Action::StrongHint,
        Action::DebugFollowup,
        Action::RefactorFollowup,
        Action::OptimizationFollowup,
        Action::EdgeCaseFollowup,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Action::NoHint => "no_hint",
            Action::GentleHint => "gentle_hint",
            Action::StrongHint => "strong_hint",
            Action::DebugFollowup => "debug_followup",
            Action::RefactorFollowup => "refactor_followup",
            Action::OptimizationFollowup => "optimization_followup",
            Action::EdgeCaseFollowup => "edge_case_followup",
        }
    }

    /// Whether the action needs rendered hint or follow-up text.
    #[must_use]
    pub fn requires_content(self) -> bool {
        self != Action::NoHint
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .iter()
            .copied()
            .find(|a| a.as_str() == s)
            .ok_or_else(|| CoreError::UnknownAction(s.to_string()))
    }
}

/// Problem difficulty of a session.
///
/// Deserialization is lenient: labels other than `easy`/`medium`/`hard` fall
/// back to [`Difficulty::Medium`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    #[must_use]
    pub fn normalized(self) -> f64 {
        match self {
            Difficulty::Easy => 0.2,
            Difficulty::Medium => 0.5,
            Difficulty::Hard => 0.8,
        }
    }
}

impl From<&str> for Difficulty {
    fn from(label: &str) -> Self {
        match label.trim().to_ascii_lowercase().as_str() {
            "easy" => Difficulty::Easy,
            "hard" => Difficulty::Hard,
            _ => Difficulty::Medium,
        }
    }
}

impl From<String> for Difficulty {
    fn from(label: String) -> Self {
        Difficulty::from(label.as_str())
    }
}

/// Dominant error category of the latest failing execution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    #[default]
    None,
    Syntax,
    Runtime,
    EdgeCase,
    Timeout,
}

impl ErrorKind {
    /// Position of this category inside the one-hot block of a [`FeatureVector`].
    #[must_use]
    pub fn one_hot_slot(self) -> Option<usize> {
        match self {
            ErrorKind::None => None,
            ErrorKind::Syntax => Some(ERROR_SLOT_OFFSET),
            ErrorKind::Runtime => Some(ERROR_SLOT_OFFSET + 1),
            ErrorKind::EdgeCase => Some(ERROR_SLOT_OFFSET + 2),
            ErrorKind::Timeout => Some(ERROR_SLOT_OFFSET + 3),
        }
    }
}

/// Normalized snapshot of one tick's telemetry.
///
/// `cleanliness`, `fail_rate` and `pause_norm` are always within `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Context {
    /// Seconds since the candidate last typed.
    pub pause_length: f64,
    /// `pause_length / 60`, clamped to 1.0.
    pub pause_norm: f64,
    pub cleanliness: f64,
    pub fail_rate: f64,
    pub error_type: ErrorKind,
    pub difficulty: Difficulty,
    pub hints_used: u32,
    pub total_changes: u64,
}

/// Ordered feature values, aligned with [`FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureVector(pub [f64; FEATURE_DIM]);

impl FeatureVector {
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    /// Looks up a slot by its name in [`FEATURE_NAMES`].
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|idx| self.0[idx])
    }

    #[must_use]
    pub fn dot(&self, weights: &[f64]) -> f64 {
        self.0.iter().zip(weights).map(|(f, w)| f * w).sum()
    }
}

/// Interpretable policy facets, each kept within `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyMetrics {
    pub debugging: f64,
    pub refactor: f64,
    pub time_factor_optimization: f64,
    pub edge_case_resilience: f64,
}

impl Default for PolicyMetrics {
    fn default() -> Self {
        Self {
            debugging: 0.25,
            refactor: 0.25,
            time_factor_optimization: 0.25,
            edge_case_resilience: 0.25,
        }
    }
}

impl PolicyMetrics {
    pub fn facets_mut(&mut self) -> [&mut f64; 4] {
        [
            &mut self.debugging,
            &mut self.refactor,
            &mut self.time_factor_optimization,
            &mut self.edge_case_resilience,
        ]
    }

    #[must_use]
    pub fn facets(&self) -> [f64; 4] {
        [
            self.debugging,
            self.refactor,
            self.time_factor_optimization,
            self.edge_case_resilience,
        ]
    }
}

/// Outcome of a single [`Policy::decide`] call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub action: Action,
    /// Score of the chosen action (linear score plus heuristic bias).
    pub score: f64,
    /// Human-readable rationale for the pick.
    pub why: String,
    /// `true` when the action came from an ε-exploration draw.
    pub explored: bool,
    /// Scores of all actions, for observability.
    pub scores: BTreeMap<Action, f64>,
}

/// A decision policy over the fixed action space.
pub trait Policy {
    /// Picks an action for `ctx`. Randomness is drawn from `rng` only.
    fn decide(&mut self, ctx: &Context, metrics: &PolicyMetrics, rng: &mut dyn RngCore)
        -> Decision;
    /// Credits `reward` to `action`, observed under `features`.
    fn feedback(&mut self, action: Action, features: &FeatureVector, reward: f64);
    fn snapshot(&self) -> Value;
    fn load(&mut self, snapshot: Value);
}

/// Type tag of records produced by a bandit step.
pub const TICK_RECORD_TYPE: &str = "bandit_step";

/// One processed tick, as appended to session history and the training log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub r#type: String,
    pub session_id: String,
    pub candidate_id: String,
    pub problem_id: String,
    /// RFC 3339 timestamp of the tick.
    pub ts: String,
    pub context: Context,
    pub action: Action,
    #[serde(default)]
    pub explored: bool,
    pub reward: f64,
    pub policy_metrics: PolicyMetrics,
    pub feature_vector: FeatureVector,
    pub weight_vectors: BTreeMap<Action, Vec<f64>>,
}

/// Destination for tick records, e.g. an append-only log for offline analysis.
pub trait TickSink: Send + Sync {
    fn record(&self, record: &TickRecord) -> std::io::Result<()>;
}

/// Rounds `value` to `places` decimal places.
#[must_use]
pub fn round_to(value: f64, places: i32) -> f64 {
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_names_roundtrip_through_from_str() {
        for action in Action::ALL {
            assert_eq!(action.as_str().parse::<Action>(), Ok(action));
        }
        assert_eq!(
            "hint_strong".parse::<Action>(),
            Err(CoreError::UnknownAction("hint_strong".into()))
        );
    }

    #[test]
    fn no_action_name_starts_with_hint() {
        assert!(Action::ALL.iter().all(|a| !a.as_str().starts_with("hint")));
    }

    #[test]
    fn action_serializes_as_snake_case_map_key() {
        let mut scores = BTreeMap::new();
        scores.insert(Action::EdgeCaseFollowup, 0.5);
        let json = serde_json::to_string(&scores).unwrap();
        assert_eq!(json, r#"{"edge_case_followup":0.5}"#);
        let back: BTreeMap<Action, f64> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, scores);
    }

    #[test]
    fn difficulty_is_lenient() {
        let d: Difficulty = serde_json::from_str(r#""HARD""#).unwrap();
        assert_eq!(d, Difficulty::Hard);
        let d: Difficulty = serde_json::from_str(r#""expert""#).unwrap();
        assert_eq!(d, Difficulty::Medium);
        assert_eq!(serde_json::to_string(&Difficulty::Easy).unwrap(), r#""easy""#);
        #[allow(clippy::float_cmp)]
        {
            assert_eq!(Difficulty::Easy.normalized(), 0.2);
            assert_eq!(Difficulty::from("unknown").normalized(), 0.5);
        }
    }

    #[test]
    fn error_slots_cover_the_one_hot_block() {
        let slots: Vec<_> = [
            ErrorKind::Syntax,
            ErrorKind::Runtime,
            ErrorKind::EdgeCase,
            ErrorKind::Timeout,
        ]
        .iter()
        .filter_map(|k| k.one_hot_slot())
        .collect();
        assert_eq!(slots, vec![5, 6, 7, 8]);
        assert_eq!(ErrorKind::None.one_hot_slot(), None);
        assert_eq!(FEATURE_NAMES[8], "error_timeout");
    }

    #[test]
    fn feature_vector_lookup_and_dot() {
        let mut v = FeatureVector::default();
        v.0[1] = 0.5;
        v.0[6] = 1.0;
        assert_eq!(v.get("cleanliness"), Some(0.5));
        assert_eq!(v.get("missing"), None);
        let w = [2.0; FEATURE_DIM];
        assert!((v.dot(&w) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn round_to_keeps_requested_places() {
        assert!((round_to(0.833_333, 3) - 0.833).abs() < 1e-12);
        assert!((round_to(-0.123_456_78, 6) + 0.123_457).abs() < 1e-12);
    }
}
