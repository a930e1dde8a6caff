#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Offline feedback on logged bandit ticks.
//!
//! Reads the NDJSON tick log, summarizes it and proposes policy adjustments.
//! Proposals are advisory: this crate never touches live session weights.

pub mod log;
pub mod stats;

pub use log::{parse_records, read_records, TickLog};
pub use stats::{ActionSummary, TrainingStats};

use sentinel_core::{round_to, Action, TickRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use time::{format_description::well_known::Rfc3339, OffsetDateTime};

// Confidence calculation constants
/// Sample size at which confidence plateaus
const CONFIDENCE_SAMPLE_SIZE_PLATEAU: f64 = 50.0;
/// Confidence level when 2+ patterns detected
const CONFIDENCE_HIGH_PATTERN: f64 = 0.7;
/// Confidence level when <2 patterns detected
const CONFIDENCE_LOW_PATTERN: f64 = 0.5;
const CONFIDENCE_SAMPLE_WEIGHT: f64 = 0.4;
const CONFIDENCE_PATTERN_WEIGHT: f64 = 0.6;

// Pattern detection thresholds
/// Minimum pulls of an action before its rewards are judged
const PATTERN_MIN_PULLS_PER_ACTION: usize = 5;
/// Regression share (60%) above which an action is flagged
const PATTERN_HIGH_REGRESSION_THRESHOLD: f64 = 0.6;
/// Overall regression share (50%) for policy-wide issues
const PATTERN_OVERALL_REGRESSION_THRESHOLD: f64 = 0.5;

// Adjustment deltas
/// Amount to reduce epsilon when most ticks regress
const ADJUSTMENT_EPSILON_DELTA: f64 = -0.05;
/// Bias applied to an action whose pulls mostly regress
const ADJUSTMENT_BIAS_DELTA: f64 = -0.05;

const PROPOSAL_VERSION: &str = "0.1.0";
const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Tick log I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed tick record on line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, FeedbackError>;

/// Evidence supporting a proposal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub ticks_analyzed: usize,
    pub regression_share: f64,
    pub mean_reward: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<String>,
}

/// Proposed policy adjustments derived from logged ticks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightAdjustmentProposal {
    pub version: String,
    /// Identifier of the policy the ticks were produced by
    pub basis_policy: String,
    pub ts: String,
    /// Keyed by `epsilon` or `bias.<action>`.
    pub deltas: BTreeMap<String, DeltaValue>,
    /// Confidence in the proposal (0.0 to 1.0)
    pub confidence: f64,
    pub evidence: Evidence,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reasoning: Vec<String>,
    #[serde(default)]
    pub status: ProposalStatus,
}

/// Value type for deltas with explicit kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum DeltaValue {
    #[serde(rename = "absolute")]
    Absolute { value: f64 },
    #[serde(rename = "relative")]
    Relative { value: f64, unit: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalStatus {
    #[default]
    Proposed,
    Accepted,
    Rejected,
    Superseded,
}

/// Reward outcomes of a group of ticks. Positive rewards count as
/// improvements, negative ones as regressions, zero as neither.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeStatistics {
    pub pulls: usize,
    pub improvements: usize,
    pub regressions: usize,
    pub total_reward: f64,
}

impl OutcomeStatistics {
    fn add(&mut self, reward: f64) {
        self.pulls += 1;
        if !reward.is_finite() {
            return;
        }
        if reward > 0.0 {
            self.improvements += 1;
        } else if reward < 0.0 {
            self.regressions += 1;
        }
        self.total_reward += reward;
    }

    /// Share of pulls that regressed (0.0 to 1.0).
    #[must_use]
    pub fn regression_share(&self) -> f64 {
        if self.pulls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.regressions as f64 / self.pulls as f64
        }
    }

    #[must_use]
    pub fn mean_reward(&self) -> f64 {
        if self.pulls == 0 {
            return 0.0;
        }
        #[allow(clippy::cast_precision_loss)]
        {
            self.total_reward / self.pulls as f64
        }
    }
}

/// Reward statistics per chosen action.
#[must_use]
pub fn aggregate_by_action(records: &[TickRecord]) -> BTreeMap<Action, OutcomeStatistics> {
    let mut stats: BTreeMap<Action, OutcomeStatistics> = BTreeMap::new();
    for record in records {
        stats.entry(record.action).or_default().add(record.reward);
    }
    stats
}

fn summarize(records: &[TickRecord]) -> OutcomeStatistics {
    let mut stats = OutcomeStatistics::default();
    for record in records {
        stats.add(record.reward);
    }
    stats
}

/// Flags regressing actions and proposes adjustments.
#[derive(Debug)]
pub struct FeedbackAnalyzer {
    /// Minimum number of ticks required before proposing adjustments
    min_ticks: usize,
    min_confidence: f64,
}

impl Default for FeedbackAnalyzer {
    fn default() -> Self {
        Self {
            min_ticks: 10,
            min_confidence: 0.5,
        }
    }
}

impl FeedbackAnalyzer {
    #[must_use]
    pub fn new(min_ticks: usize, min_confidence: f64) -> Self {
        Self {
            min_ticks,
            min_confidence: min_confidence.clamp(0.0, 1.0),
        }
    }

    /// Actions with enough pulls whose regression share is too high.
    #[must_use]
    pub fn flagged_actions(&self, records: &[TickRecord]) -> Vec<(Action, OutcomeStatistics)> {
        aggregate_by_action(records)
            .into_iter()
            .filter(|(_, s)| {
                s.pulls >= PATTERN_MIN_PULLS_PER_ACTION
                    && s.regression_share() > PATTERN_HIGH_REGRESSION_THRESHOLD
            })
            .collect()
    }

    /// Human-readable patterns found in `records`. Empty below `min_ticks`.
    #[must_use]
    pub fn analyze_patterns(&self, records: &[TickRecord]) -> Vec<String> {
        if records.len() < self.min_ticks {
            return Vec::new();
        }

        let mut patterns: Vec<String> = self
            .flagged_actions(records)
            .iter()
            .map(|(action, s)| {
                format!(
                    "High regression share ({:.1}%) for action '{action}'",
                    s.regression_share() * 100.0
                )
            })
            .collect();

        let overall = summarize(records);
        if overall.regression_share() > PATTERN_OVERALL_REGRESSION_THRESHOLD {
            patterns.push(format!(
                "Overall regression share is high ({:.1}%)",
                overall.regression_share() * 100.0
            ));
        }
        patterns
    }

    /// Returns `None` with too little data, no patterns or low confidence.
    #[must_use]
    pub fn propose_adjustment(
        &self,
        basis_policy: &str,
        records: &[TickRecord],
    ) -> Option<WeightAdjustmentProposal> {
        if records.len() < self.min_ticks {
            return None;
        }
        let patterns = self.analyze_patterns(records);
        if patterns.is_empty() {
            return None;
        }

        #[allow(clippy::cast_precision_loss)]
        let confidence = {
            let sample = (records.len() as f64 / CONFIDENCE_SAMPLE_SIZE_PLATEAU).min(1.0);
            let pattern = if patterns.len() >= 2 {
                CONFIDENCE_HIGH_PATTERN
            } else {
                CONFIDENCE_LOW_PATTERN
            };
            round_to(
                (sample * CONFIDENCE_SAMPLE_WEIGHT + pattern * CONFIDENCE_PATTERN_WEIGHT)
                    .clamp(0.0, 1.0),
                3,
            )
        };
        if confidence < self.min_confidence {
            return None;
        }

        let overall = summarize(records);
        let mut deltas = BTreeMap::new();
        let mut reasoning = Vec::new();

        if overall.regression_share() > PATTERN_OVERALL_REGRESSION_THRESHOLD {
            deltas.insert(
                "epsilon".to_string(),
                DeltaValue::Absolute {
                    value: ADJUSTMENT_EPSILON_DELTA,
                },
            );
            reasoning.push("Reduce exploration: most ticks regressed".to_string());
        }
        for (action, _) in self.flagged_actions(records) {
            deltas.insert(
                format!("bias.{action}"),
                DeltaValue::Absolute {
                    value: ADJUSTMENT_BIAS_DELTA,
                },
            );
            reasoning.push(format!("Down-weight '{action}': its pulls mostly regressed"));
        }

        Some(WeightAdjustmentProposal {
            version: PROPOSAL_VERSION.to_string(),
            basis_policy: basis_policy.to_string(),
            ts: iso8601_now(),
            deltas,
            confidence,
            evidence: Evidence {
                ticks_analyzed: records.len(),
                regression_share: round_to(overall.regression_share(), 4),
                mean_reward: round_to(overall.mean_reward(), 4),
                patterns,
            },
            reasoning,
            status: ProposalStatus::Proposed,
        })
    }
}

fn iso8601_now() -> String {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string())
}
