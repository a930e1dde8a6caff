//! `start_session` / `step` entry points of the assessment bandit.
//!
//! A step extracts the tick context, lets the session's bandit pick an action,
//! renders content for it through the [`HintGenerator`] (bounded by a timeout,
//! with a fixed fallback), scores the transition from the previous tick,
//! credits the chosen action, drifts the policy facets and appends the tick to
//! the session history and the optional [`TickSink`].

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::error::{Result, SessionError};
use crate::hint::{fallback_hint, HintContent, HintGenerator, HintRequest, RECENT_EVENT_WINDOW};
use crate::schedule::next_evaluation_ms;
use crate::session::{Session, SessionSlot};
use crate::store::{InMemorySessionStore, SessionStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use sentinel_bandits::features::{extract, TickInput};
use sentinel_bandits::metrics::update_policy_metrics;
use sentinel_bandits::reward::compute_reward;
use sentinel_bandits::LinearBandit;
use sentinel_core::telemetry::{StartRequest, StepRequest};
use sentinel_core::{
    Action, Context, FeatureVector, Policy, PolicyMetrics, TickRecord, TickSink, TICK_RECORD_TYPE,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use uuid::Uuid;

const FALLBACK_TIMESTAMP: &str = "1970-01-01T00:00:00Z";

/// Reply to [`Engine::start_session`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStarted {
    pub session_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
    pub policy_metrics: PolicyMetrics,
    pub weight_vectors: BTreeMap<Action, Vec<f64>>,
}

/// Context of a tick together with its encoded features.
///
/// The context keeps the field names it has in the tick log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFeatures {
    pub context: Context,
    pub feature_vector: FeatureVector,
}

/// Reply to [`Engine::step`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepOutcome {
    pub action: Action,
    /// `None` for [`Action::NoHint`].
    pub hint_payload: Option<HintContent>,
    pub context_features: ContextFeatures,
    pub policy_metrics: PolicyMetrics,
    pub reward_applied: f64,
    pub scores: BTreeMap<Action, f64>,
    pub explored: bool,
    pub next_evaluation_ms: u64,
    pub rationale: String,
    pub session_expired: bool,
}

pub struct Engine {
    config: EngineConfig,
    store: Arc<dyn SessionStore>,
    hints: Arc<dyn HintGenerator>,
    clock: Arc<dyn Clock>,
    sink: Option<Arc<dyn TickSink>>,
    sessions_started: AtomicU64,
}

impl Engine {
    /// Engine with an in-memory store, the system clock and no tick sink.
    #[must_use]
    pub fn new(config: EngineConfig, hints: Arc<dyn HintGenerator>) -> Self {
        Self {
            config: config.validate(),
            store: Arc::new(InMemorySessionStore::new()),
            hints,
            clock: Arc::new(SystemClock),
            sink: None,
            sessions_started: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = store;
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn TickSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    /// Opens a session with fresh prior weights and default policy metrics.
    pub fn start_session(&self, request: StartRequest) -> SessionStarted {
        let ordinal = self.sessions_started.fetch_add(1, Ordering::Relaxed);
        let rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(ordinal)),
            None => StdRng::from_entropy(),
        };
        let bandit = LinearBandit::new(self.config.epsilon, self.config.learning_rate);
        let session = Session::new(
            Uuid::new_v4().to_string(),
            request,
            bandit,
            self.clock.now(),
            self.config.session_ttl(),
        );

        info!(
            session_id = %session.id,
            candidate_id = %session.candidate_id,
            problem_id = %session.problem_id,
            "session started"
        );

        let started = SessionStarted {
            session_id: session.id.clone(),
            expires_at: session.expires_at,
            policy_metrics: session.policy_metrics,
            weight_vectors: session.weight_vectors(),
        };
        self.store.put(SessionSlot { session, rng });
        started
    }

    /// Replaces a session's bandit state with a snapshot, e.g. from offline
    /// retraining. The snapshot is validated strictly.
    pub async fn restore_weights(&self, session_id: &str, snapshot: Value) -> Result<()> {
        let handle = self
            .store
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let bandit = LinearBandit::from_snapshot(snapshot)?;
        handle.lock().await.session.bandit = bandit;
        Ok(())
    }

    /// Copy of a session's current state.
    pub async fn session(&self, session_id: &str) -> Result<Session> {
        let handle = self
            .store
            .get(session_id)
            .ok_or_else(|| SessionError::NotFound(session_id.to_string()))?;
        let slot = handle.lock().await;
        Ok(slot.session.clone())
    }

    /// Processes one tick. Expired sessions are still processed; the outcome
    /// reports `session_expired` and leaves stopping to the caller.
    pub async fn step(&self, request: StepRequest) -> Result<StepOutcome> {
        let handle = self
            .store
            .get(&request.session_id)
            .ok_or_else(|| SessionError::NotFound(request.session_id.clone()))?;
        let mut guard = handle.lock().await;
        let SessionSlot { session, rng } = &mut *guard;

        let now = self.clock.now();
        let expired = session.is_expired(now);
        if expired {
            debug!(session_id = %session.id, "tick on expired session");
        }

        let telemetry = request.telemetry;
        let (ctx, features) = extract(&TickInput {
            code: &telemetry.code,
            attempts: &telemetry.execution_attempts,
            pause_duration: telemetry.pause_duration,
            hints_used: telemetry.hints_used,
            difficulty: session.difficulty,
            total_changes: telemetry.progress_metrics.total_changes,
        });

        let decision = session.bandit.decide(&ctx, &session.policy_metrics, rng);

        let hint_payload = if decision.action.requires_content() {
            let skip = telemetry
                .monitoring_events
                .len()
                .saturating_sub(RECENT_EVENT_WINDOW);
            let hint_request = HintRequest {
                action: decision.action,
                code: telemetry.code,
                problem: telemetry.problem,
                language: if telemetry.language.trim().is_empty() {
                    session.language.clone()
                } else {
                    telemetry.language
                },
                context: ctx.clone(),
                policy_metrics: session.policy_metrics,
                recent_events: telemetry.monitoring_events.into_iter().skip(skip).collect(),
            };
            Some(self.render_hint(&session.id, &hint_request).await)
        } else {
            None
        };

        let reward = compute_reward(&ctx, session.last_context.as_ref());
        session.bandit.feedback(decision.action, &features, reward);
        update_policy_metrics(&mut session.policy_metrics, &ctx, reward);

        let record = TickRecord {
            r#type: TICK_RECORD_TYPE.to_string(),
            session_id: session.id.clone(),
            candidate_id: session.candidate_id.clone(),
            problem_id: session.problem_id.clone(),
            ts: now
                .format(&Rfc3339)
                .unwrap_or_else(|_| FALLBACK_TIMESTAMP.to_string()),
            context: ctx.clone(),
            action: decision.action,
            explored: decision.explored,
            reward,
            policy_metrics: session.policy_metrics,
            feature_vector: features,
            weight_vectors: session.weight_vectors(),
        };
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.record(&record) {
                warn!(session_id = %session.id, error = %e, "failed to persist tick record");
            }
        }
        session.history.push(record);
        session.last_context = Some(ctx.clone());

        debug!(
            session_id = %session.id,
            action = %decision.action,
            explored = decision.explored,
            reward,
            baseline = session.reward_baseline(),
            "tick processed"
        );

        Ok(StepOutcome {
            action: decision.action,
            hint_payload,
            next_evaluation_ms: next_evaluation_ms(decision.action, &ctx),
            context_features: ContextFeatures {
                context: ctx,
                feature_vector: features,
            },
            policy_metrics: session.policy_metrics,
            reward_applied: reward,
            scores: decision.scores,
            explored: decision.explored,
            rationale: decision.why,
            session_expired: expired,
        })
    }

    async fn render_hint(&self, session_id: &str, request: &HintRequest) -> HintContent {
        let timeout = self.config.hint_timeout();
        match tokio::time::timeout(timeout, self.hints.generate(request)).await {
            Ok(Ok(mut content)) => {
                content.action = request.action;
                content.confidence = content.confidence.clamp(0.0, 1.0);
                content
            }
            Ok(Err(e)) => {
                warn!(
                    session_id,
                    action = %request.action,
                    error = %e,
                    "hint generation failed, using fallback"
                );
                fallback_hint(request.action)
            }
            Err(_) => {
                warn!(
                    session_id,
                    action = %request.action,
                    timeout_ms = self.config.hint_timeout_ms,
                    "hint generation timed out, using fallback"
                );
                fallback_hint(request.action)
            }
        }
    }

    /// Drops sessions whose expiry lies more than `grace` in the past.
    /// Returns the number of removed sessions. Never called implicitly.
    pub fn reap_expired(&self, grace: time::Duration) -> usize {
        let now = self.clock.now();
        let reaped = self
            .store
            .list()
            .into_iter()
            .filter(|entry| now > entry.expires_at + grace)
            .filter(|entry| self.store.remove(&entry.id))
            .count();
        if reaped > 0 {
            info!(reaped, remaining = self.store.len(), "reaped expired sessions");
        }
        reaped
    }
}
