//! Per-interview bandit state.

use rand::rngs::StdRng;
use sentinel_bandits::LinearBandit;
use sentinel_core::telemetry::StartRequest;
use sentinel_core::{Action, Context, Difficulty, PolicyMetrics, TickRecord};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use time::{Duration, OffsetDateTime};

use crate::config::DEFAULT_SESSION_TTL_SECS;

/// State owned by one interview session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub candidate_id: String,
    pub problem_id: String,
    pub language: String,
    pub difficulty: Difficulty,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    /// Weight vectors and reward baseline.
    pub bandit: LinearBandit,
    pub policy_metrics: PolicyMetrics,
    /// Append-only tick history.
    pub history: Vec<TickRecord>,
    pub last_context: Option<Context>,
}

impl Session {
    #[must_use]
    pub fn new(
        id: String,
        request: StartRequest,
        bandit: LinearBandit,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Self {
        Self {
            id,
            candidate_id: request.candidate_id,
            problem_id: request.problem_id,
            language: request.language,
            difficulty: request.difficulty,
            created_at: now,
            expires_at: now
                .checked_add(ttl)
                .unwrap_or_else(|| now + Duration::seconds(DEFAULT_SESSION_TTL_SECS)),
            bandit,
            policy_metrics: PolicyMetrics::default(),
            history: Vec::new(),
            last_context: None,
        }
    }

    #[must_use]
    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        now > self.expires_at
    }

    #[must_use]
    pub fn reward_baseline(&self) -> f64 {
        self.bandit.baseline()
    }

    #[must_use]
    pub fn weight_vectors(&self) -> BTreeMap<Action, Vec<f64>> {
        self.bandit.weight_vectors()
    }
}

/// A session together with its private random source.
#[derive(Debug)]
pub struct SessionSlot {
    pub session: Session,
    pub rng: StdRng,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unrepresentable_expiry_falls_back_to_default_ttl() {
        let now = OffsetDateTime::UNIX_EPOCH;
        let request = StartRequest {
            candidate_id: "c".into(),
            problem_id: "p".into(),
            language: "rust".into(),
            difficulty: Difficulty::Easy,
        };
        let bandit = LinearBandit::default();
        let session = Session::new("s".into(), request, bandit, now, Duration::MAX);
        assert_eq!(session.expires_at - now, Duration::seconds(DEFAULT_SESSION_TTL_SECS));
    }
}
