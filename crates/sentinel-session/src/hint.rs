//! Hint and follow-up rendering through an external language model.
//!
//! The collaborator is unreliable by nature. The engine bounds every call with
//! a timeout and swaps any failure for [`fallback_hint`].

use crate::config::GrokConfig;
use crate::error::HintError;
use async_trait::async_trait;
use sentinel_core::telemetry::MonitoringEvent;
use sentinel_core::{Action, Context, PolicyMetrics};
use serde::{Deserialize, Serialize};
use tracing::debug;

pub const FALLBACK_HINT: &str = "Take a step back and think about the problem requirements.";
pub const FALLBACK_QUESTION: &str = "What's your strategy for solving this problem?";
pub const FALLBACK_CONFIDENCE: f64 = 0.5;

/// Number of trailing monitoring events forwarded to the model.
pub const RECENT_EVENT_WINDOW: usize = 5;

/// Where a hint payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HintSource {
    Model,
    Fallback,
}

/// Rendered hint or follow-up for the selected action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HintContent {
    pub action: Action,
    pub hint: String,
    pub follow_up_question: String,
    pub confidence: f64,
    pub source: HintSource,
}

/// Fixed payload used whenever the collaborator fails.
#[must_use]
pub fn fallback_hint(action: Action) -> HintContent {
    HintContent {
        action,
        hint: FALLBACK_HINT.to_string(),
        follow_up_question: FALLBACK_QUESTION.to_string(),
        confidence: FALLBACK_CONFIDENCE,
        source: HintSource::Fallback,
    }
}

/// Everything the collaborator may use to phrase its hint.
#[derive(Debug, Clone, Serialize)]
pub struct HintRequest {
    pub action: Action,
    pub code: String,
    pub problem: String,
    pub language: String,
    pub context: Context,
    pub policy_metrics: PolicyMetrics,
    pub recent_events: Vec<MonitoringEvent>,
}

#[async_trait]
pub trait HintGenerator: Send + Sync {
    async fn generate(&self, request: &HintRequest) -> Result<HintContent, HintError>;
}

/// Generator that always answers with the fallback payload, for offline runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineHints;

#[async_trait]
impl HintGenerator for OfflineHints {
    async fn generate(&self, request: &HintRequest) -> Result<HintContent, HintError> {
        Ok(fallback_hint(request.action))
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct HintReply {
    #[serde(default)]
    hint: String,
    #[serde(default, rename = "followUpQuestion", alias = "follow_up_question")]
    follow_up_question: Option<String>,
    #[serde(default)]
    confidence: Option<f64>,
}

/// Hint generator backed by the Grok chat-completions API.
pub struct GrokHintGenerator {
    config: GrokConfig,
    client: reqwest::Client,
}

impl GrokHintGenerator {
    pub fn new(config: GrokConfig) -> Result<Self, HintError> {
        if config.api_key.trim().is_empty() {
            return Err(HintError::MissingApiKey);
        }
        Ok(Self {
            config,
            client: reqwest::Client::new(),
        })
    }

    fn prompt(request: &HintRequest) -> String {
        let events = serde_json::to_string(&request.recent_events).unwrap_or_default();
        format!(
            r#"You are an interviewer guiding a candidate through a coding problem.

Problem:
{problem}

Current code ({language}):
```{language}
{code}
```

Intervention to deliver: {action}
Pause: {pause:.1}s, failure rate: {fail:.2}, dominant error: {error:?}, hints used: {hints}
Recent events: {events}

Do not reveal the solution. Respond ONLY with JSON:
{{"hint": "...", "followUpQuestion": "...", "confidence": 0.0-1.0}}"#,
            problem = request.problem,
            language = request.language,
            code = request.code,
            action = request.action,
            pause = request.context.pause_length,
            fail = request.context.fail_rate,
            error = request.context.error_type,
            hints = request.context.hints_used,
        )
    }
}

#[async_trait]
impl HintGenerator for GrokHintGenerator {
    async fn generate(&self, request: &HintRequest) -> Result<HintContent, HintError> {
        debug!(action = %request.action, "requesting hint content");
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: Self::prompt(request),
            }],
            temperature: self.config.temperature,
        };

        let response: ChatResponse = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| HintError::Unparseable("reply has no choices".to_string()))?;
        parse_hint_reply(request.action, &text)
    }
}

/// The span from the first `{` to the last `}`, if any.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (end > start).then(|| &text[start..=end])
}

/// Parses a model reply into hint content for `action`.
pub fn parse_hint_reply(action: Action, text: &str) -> Result<HintContent, HintError> {
    let json = extract_json_object(text)
        .ok_or_else(|| HintError::Unparseable("no JSON object in reply".to_string()))?;
    let reply: HintReply =
        serde_json::from_str(json).map_err(|e| HintError::Unparseable(e.to_string()))?;
    if reply.hint.trim().is_empty() {
        return Err(HintError::Unparseable("empty hint".to_string()));
    }
    let confidence = reply
        .confidence
        .filter(|c| c.is_finite())
        .map_or(FALLBACK_CONFIDENCE, |c| c.clamp(0.0, 1.0));
    Ok(HintContent {
        action,
        hint: reply.hint,
        follow_up_question: reply
            .follow_up_question
            .filter(|q| !q.trim().is_empty())
            .unwrap_or_else(|| FALLBACK_QUESTION.to_string()),
        confidence,
        source: HintSource::Model,
    })
}
