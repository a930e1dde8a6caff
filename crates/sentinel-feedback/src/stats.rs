//! Summary of collected training data.

use crate::aggregate_by_action;
use sentinel_core::{round_to, Action, TickRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Number of trailing records reported by default.
pub const DEFAULT_RECENT_SIGNALS: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSummary {
    pub pulls: usize,
    pub mean_reward: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingStats {
    /// Distinct sessions seen in the log.
    pub total_assessments: usize,
    pub training_data_points: usize,
    pub actions: BTreeMap<Action, ActionSummary>,
    /// The latest records, oldest first.
    pub recent_signals: Vec<TickRecord>,
}

impl TrainingStats {
    #[must_use]
    pub fn from_records(records: &[TickRecord], recent: usize) -> Self {
        let sessions: BTreeSet<&str> = records.iter().map(|r| r.session_id.as_str()).collect();
        let actions = aggregate_by_action(records)
            .into_iter()
            .map(|(action, stats)| {
                (
                    action,
                    ActionSummary {
                        pulls: stats.pulls,
                        mean_reward: round_to(stats.mean_reward(), 4),
                    },
                )
            })
            .collect();
        let skip = records.len().saturating_sub(recent);
        Self {
            total_assessments: sessions.len(),
            training_data_points: records.len(),
            actions,
            recent_signals: records[skip..].to_vec(),
        }
    }
}
