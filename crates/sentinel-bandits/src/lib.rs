//! Contextual ε-greedy bandit over the pedagogical action space.
//!
//! [`LinearBandit`] keeps one linear weight vector per [`Action`]. An action's
//! score is the dot product of its weights with the tick's [`FeatureVector`]
//! plus a fixed heuristic bias (see [`action_bias`]). With probability
//! `epsilon` the bandit ignores all scores and draws uniformly. Feedback only
//! moves the weights of the action that was actually taken, centred on a
//! running reward baseline.

pub mod error;
pub mod features;
pub mod metrics;
pub mod reward;

pub use error::{BanditError, Result};

use rand::{Rng, RngCore};
use sentinel_core::{
    round_to, Action, Context, Decision, ErrorKind, FeatureVector, Policy, PolicyMetrics,
    FEATURE_DIM,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;

macro_rules! warn_log {
    ($($arg:tt)*) => {{
        #[cfg(feature = "telemetry")]
        tracing::warn!($($arg)*);
        #[cfg(not(feature = "telemetry"))]
        eprintln!($($arg)*);
    }};
}

/// Exploration probability.
pub const DEFAULT_EPSILON: f64 = 0.15;
/// Step size of the weight update.
pub const DEFAULT_LEARNING_RATE: f64 = 0.1;
/// Share of the old baseline kept on every update.
pub const BASELINE_DECAY: f64 = 0.9;

/// Prior weight of every slot of `action`'s vector.
#[must_use]
pub fn initial_weight(action: Action) -> f64 {
    match action {
        Action::NoHint => 0.05,
        Action::GentleHint | Action::StrongHint => 0.08,
        Action::DebugFollowup
        | Action::RefactorFollowup
        | Action::OptimizationFollowup
        | Action::EdgeCaseFollowup => 0.1,
    }
}

/// Fresh prior weight vectors for all actions.
#[must_use]
pub fn default_weights() -> BTreeMap<Action, [f64; FEATURE_DIM]> {
    Action::ALL
        .iter()
        .map(|a| (*a, [initial_weight(*a); FEATURE_DIM]))
        .collect()
}

struct BiasRule {
    label: &'static str,
    fires: fn(&Context, &PolicyMetrics) -> bool,
    targets: fn(Action) -> bool,
    delta: f64,
}

fn bias_rules() -> [BiasRule; 8] {
    [
        BiasRule {
            label: "pause > 20s",
            fires: |c, _| c.pause_length > 20.0,
            targets: |a| matches!(a, Action::GentleHint | Action::StrongHint),
            delta: 0.15,
        },
        BiasRule {
            label: "pause > 40s",
            fires: |c, _| c.pause_length > 40.0,
            targets: |a| a == Action::StrongHint,
            delta: 0.25,
        },
        BiasRule {
            label: "failure rate >= 0.5",
            fires: |c, _| c.fail_rate >= 0.5,
            targets: |a| matches!(a, Action::DebugFollowup | Action::StrongHint),
            delta: 0.20,
        },
        BiasRule {
            label: "cleanliness < 0.6",
            fires: |c, _| c.cleanliness < 0.6,
            targets: |a| matches!(a, Action::RefactorFollowup | Action::GentleHint),
            delta: 0.18,
        },
        BiasRule {
            label: "time factor > 0.35",
            fires: |_, m| m.time_factor_optimization > 0.35,
            targets: |a| a == Action::OptimizationFollowup,
            delta: 0.12,
        },
        BiasRule {
            label: "edge-case error",
            fires: |c, _| c.error_type == ErrorKind::EdgeCase,
            targets: |a| a == Action::EdgeCaseFollowup,
            delta: 0.22,
        },
        BiasRule {
            label: "hints used >= 2",
            fires: |c, _| c.hints_used >= 2,
            targets: |a| a == Action::NoHint,
            delta: 0.05,
        },
        // Over-hinting penalty keyed on a "hint" name prefix. No action name
        // starts with it, so this rule currently never applies.
        BiasRule {
            label: "over-hinting",
            fires: |c, _| c.hints_used >= 2,
            targets: |a| a.as_str().starts_with("hint"),
            delta: -0.05,
        },
    ]
}

/// Heuristic nudge added on top of `action`'s linear score.
#[must_use]
pub fn action_bias(action: Action, ctx: &Context, metrics: &PolicyMetrics) -> f64 {
    bias_rules()
        .iter()
        .filter(|r| (r.targets)(action) && (r.fires)(ctx, metrics))
        .map(|r| r.delta)
        .sum()
}

/// Labels of the bias rules that apply to `action` under `ctx`.
#[must_use]
pub fn fired_rules(action: Action, ctx: &Context, metrics: &PolicyMetrics) -> Vec<&'static str> {
    bias_rules()
        .iter()
        .filter(|r| (r.targets)(action) && (r.fires)(ctx, metrics))
        .map(|r| r.label)
        .collect()
}

/// Linear contextual bandit with ε-greedy exploration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearBandit {
    /// Exploration probability between 0.0 and 1.0.
    pub epsilon: f64,
    pub learning_rate: f64,
    weights: BTreeMap<Action, [f64; FEATURE_DIM]>,
    baseline: f64,
}

impl Default for LinearBandit {
    fn default() -> Self {
        Self {
            epsilon: DEFAULT_EPSILON,
            learning_rate: DEFAULT_LEARNING_RATE,
            weights: default_weights(),
            baseline: 0.0,
        }
    }
}

#[derive(Deserialize)]
struct SnapshotRepr {
    #[serde(default = "default_epsilon")]
    epsilon: f64,
    #[serde(default = "default_learning_rate")]
    learning_rate: f64,
    #[serde(default)]
    baseline: f64,
    #[serde(default)]
    weights: BTreeMap<String, Vec<f64>>,
}

fn default_epsilon() -> f64 {
    DEFAULT_EPSILON
}

fn default_learning_rate() -> f64 {
    DEFAULT_LEARNING_RATE
}

fn unit_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        fallback
    }
}

impl LinearBandit {
    #[must_use]
    pub fn new(epsilon: f64, learning_rate: f64) -> Self {
        Self {
            epsilon: unit_or(epsilon, DEFAULT_EPSILON),
            learning_rate: unit_or(learning_rate, DEFAULT_LEARNING_RATE),
            ..Self::default()
        }
    }

    /// Strict restore: unknown actions and wrong vector lengths are errors.
    /// Actions missing from the snapshot start from their priors.
    pub fn from_snapshot(snapshot: Value) -> Result<Self> {
        let repr: SnapshotRepr = serde_json::from_value(snapshot)?;
        let mut bandit = Self::new(repr.epsilon, repr.learning_rate);
        bandit.baseline = if repr.baseline.is_finite() {
            repr.baseline
        } else {
            0.0
        };
        for (name, vector) in repr.weights {
            let action: Action = name
                .parse()
                .map_err(|_| BanditError::InvalidAction(name.clone()))?;
            let found = vector.len();
            let weights: [f64; FEATURE_DIM] =
                vector
                    .try_into()
                    .map_err(|_| BanditError::DimensionMismatch {
                        action: name,
                        expected: FEATURE_DIM,
                        found,
                    })?;
            bandit.weights.insert(action, weights);
        }
        Ok(bandit)
    }

    #[must_use]
    pub fn weights(&self, action: Action) -> [f64; FEATURE_DIM] {
        self.weights
            .get(&action)
            .copied()
            .unwrap_or([initial_weight(action); FEATURE_DIM])
    }

    /// All weight vectors, keyed by action.
    #[must_use]
    pub fn weight_vectors(&self) -> BTreeMap<Action, Vec<f64>> {
        Action::ALL
            .iter()
            .map(|a| (*a, self.weights(*a).to_vec()))
            .collect()
    }

    /// Running reward baseline.
    #[must_use]
    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Linear score plus heuristic bias.
    #[must_use]
    pub fn score(
        &self,
        action: Action,
        ctx: &Context,
        features: &FeatureVector,
        metrics: &PolicyMetrics,
    ) -> f64 {
        features.dot(&self.weights(action)) + action_bias(action, ctx, metrics)
    }

    #[must_use]
    pub fn scores(
        &self,
        ctx: &Context,
        features: &FeatureVector,
        metrics: &PolicyMetrics,
    ) -> BTreeMap<Action, f64> {
        Action::ALL
            .iter()
            .map(|a| (*a, self.score(*a, ctx, features, metrics)))
            .collect()
    }

    /// ε-greedy pick. Greedy ties resolve to the earliest action in [`Action::ALL`].
    pub fn select<R: RngCore + ?Sized>(
        &self,
        ctx: &Context,
        metrics: &PolicyMetrics,
        rng: &mut R,
    ) -> Decision {
        let features = features::encode(ctx);
        let scores = self.scores(ctx, &features, metrics);
        let explore = rng.gen::<f64>() < self.epsilon;

        let action = if explore {
            Action::ALL[rng.gen_range(0..Action::ALL.len())]
        } else {
            let mut best = Action::ALL[0];
            let mut best_score = f64::NEG_INFINITY;
            for action in Action::ALL {
                let s = scores.get(&action).copied().unwrap_or(f64::NEG_INFINITY);
                if s > best_score {
                    best = action;
                    best_score = s;
                }
            }
            best
        };

        let score = scores.get(&action).copied().unwrap_or_default();
        let why = if explore {
            format!("explore ε={:.2}: uniform draw picked {action}", self.epsilon)
        } else {
            let rules = fired_rules(action, ctx, metrics);
            if rules.is_empty() {
                format!("exploit: {action} scored {score:.3}")
            } else {
                format!("exploit: {action} scored {score:.3} ({})", rules.join(", "))
            }
        };

        Decision {
            action,
            score,
            why,
            explored: explore,
            scores,
        }
    }

    /// Baseline-relative gradient step on `action`'s weights only, followed by
    /// the exponential drift of the baseline.
    pub fn update(&mut self, action: Action, reward: f64, features: &FeatureVector) {
        let advantage = reward - self.baseline;
        let step = self.learning_rate * advantage;
        let weights = self
            .weights
            .entry(action)
            .or_insert([initial_weight(action); FEATURE_DIM]);
        for (w, f) in weights.iter_mut().zip(features.as_slice()) {
            *w = round_to(*w + step * f, 6);
        }
        self.baseline = round_to(
            BASELINE_DECAY * self.baseline + (1.0 - BASELINE_DECAY) * reward,
            4,
        );
    }
}

impl Policy for LinearBandit {
    /// Scores all actions for `ctx` and picks one ε-greedily.
    fn decide(
        &mut self,
        ctx: &Context,
        metrics: &PolicyMetrics,
        rng: &mut dyn RngCore,
    ) -> Decision {
        self.select(ctx, metrics, rng)
    }

    fn feedback(&mut self, action: Action, features: &FeatureVector, reward: f64) {
        self.update(action, reward, features);
    }

    /// Persists epsilon, learning rate, baseline and all weights as JSON.
    fn snapshot(&self) -> Value {
        json!({
            "epsilon": self.epsilon,
            "learning_rate": self.learning_rate,
            "baseline": self.baseline,
            "weights": self.weight_vectors(),
        })
    }

    /// Lenient restore: out-of-range rates are clamped, malformed weight
    /// entries are skipped and keep their current values.
    fn load(&mut self, v: Value) {
        if let Some(e) = v.get("epsilon").and_then(Value::as_f64) {
            self.epsilon = unit_or(e, DEFAULT_EPSILON);
        }
        if let Some(lr) = v.get("learning_rate").and_then(Value::as_f64) {
            self.learning_rate = unit_or(lr, DEFAULT_LEARNING_RATE);
        }
        if let Some(b) = v.get("baseline").and_then(Value::as_f64) {
            if b.is_finite() {
                self.baseline = b;
            }
        }
        let Some(map) = v.get("weights").and_then(Value::as_object) else {
            return;
        };
        for (name, raw) in map {
            let Ok(action) = name.parse::<Action>() else {
                warn_log!("ignoring weights for unknown action {name}");
                continue;
            };
            let values: Vec<f64> = raw
                .as_array()
                .map(|a| a.iter().filter_map(Value::as_f64).collect())
                .unwrap_or_default();
            match <[f64; FEATURE_DIM]>::try_from(values) {
                Ok(weights) => {
                    self.weights.insert(action, weights);
                }
                Err(values) => {
                    warn_log!(
                        "ignoring weights for {action}: {} entries, expected {FEATURE_DIM}",
                        values.len()
                    );
                }
            }
        }
    }
}
