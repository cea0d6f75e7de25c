//! OpenAI-compatible chat-completions client.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{ContentTransform, ModelId, ModelRole, PipelineError, RetryPolicy, TransformRequest};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::LlmConfig;
use crate::error::{parse_retry_after, LlmError};

/// Upper bound for a single back-off sleep.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
struct Route {
    model: ModelId,
    temperature: f32,
}

/// A [`ContentTransform`] that sends each prompt as a single user message to
/// the model configured for its [`ModelRole`].
///
/// Transient failures (timeouts, `429`, `5xx`) are retried with exponential
/// back-off up to `max_attempts`; whatever remains is reported as
/// [`PipelineError::CollaboratorFailure`].
pub struct ChatCompletionsProvider {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    routes: HashMap<ModelRole, Route>,
    max_attempts: u32,
    base_delay: Duration,
}

impl fmt::Debug for ChatCompletionsProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatCompletionsProvider")
            .field("base_url", &self.base_url)
            .field("api_key", &"[redacted]")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl ChatCompletionsProvider {
    /// Builds a provider, reading the API key from the variable named by
    /// `config.api_key_env`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] if the key is unset or the
    /// configuration is invalid.
    pub fn from_config(config: &LlmConfig) -> Result<Self, PipelineError> {
        let api_key = std::env::var(&config.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| PipelineError::ConfigurationError {
                message: LlmError::MissingApiKey(config.api_key_env.clone()).to_string(),
            })?;
        Self::with_api_key(config, api_key)
    }

    /// Builds a provider with an explicit API key.
    pub fn with_api_key(config: &LlmConfig, api_key: impl Into<String>) -> Result<Self, PipelineError> {
        Self::build(config, api_key.into(), reqwest::Client::builder())
    }

    fn build(
        config: &LlmConfig,
        api_key: String,
        builder: reqwest::ClientBuilder,
    ) -> Result<Self, PipelineError> {
        config.validate()?;

        let mut routes = HashMap::new();
        for role in ModelRole::ALL {
            let entry = config.role(role);
            let model = entry.model_id().ok_or_else(|| PipelineError::ConfigurationError {
                message: format!("llm.{role}.model must not be empty"),
            })?;
            routes.insert(
                role,
                Route {
                    model,
                    temperature: entry.temperature,
                },
            );
        }

        let http = builder
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PipelineError::ConfigurationError {
                message: format!("cannot build HTTP client: {e}"),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.clone(),
            api_key,
            routes,
            max_attempts: config.max_attempts,
            base_delay: config.retry_base_delay(),
        })
    }

    /// The model `role` is routed to.
    pub fn model_for(&self, role: ModelRole) -> Option<&ModelId> {
        self.routes.get(&role).map(|route| &route.model)
    }

    /// Sends `prompt` to the model for `role`, retrying transient failures.
    ///
    /// # Errors
    ///
    /// The last [`LlmError`] once it is non-retryable or attempts run out.
    pub async fn complete(&self, role: ModelRole, prompt: &str) -> Result<String, LlmError> {
        let route = self
            .routes
            .get(&role)
            .ok_or_else(|| LlmError::Decode(format!("no model configured for role {role}")))?;
        let body = ChatRequest::user(route, prompt);

        let mut attempt = 1;
        loop {
            match self.send_once(&body).await {
                Ok(text) => {
                    debug!(%role, model = %route.model, attempt, chars = text.len(), "completion received");
                    return Ok(text);
                }
                Err(e) => match e.retry_policy() {
                    RetryPolicy::Retryable { after } if attempt < self.max_attempts => {
                        let delay = retry_delay(after, self.base_delay, attempt);
                        warn!(
                            %role,
                            attempt,
                            max_attempts = self.max_attempts,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "transient provider failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    _ => return Err(e),
                },
            }
        }
    }

    async fn send_once(&self, body: &ChatRequest<'_>) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.base_url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(LlmError::Transport)?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(parse_retry_after);
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::status(status.as_u16(), &text, retry_after));
        }

        let text = response.text().await.map_err(LlmError::Transport)?;
        parse_completion(&text)
    }
}

#[async_trait]
impl ContentTransform for ChatCompletionsProvider {
    async fn transform(&self, request: TransformRequest) -> Result<String, PipelineError> {
        self.complete(request.role, &request.prompt)
            .await
            .map_err(|e| PipelineError::collaborator(format!("llm:{}", request.role), e))
    }
}

/// `base * 2^(attempt - 1)`, capped at [`MAX_BACKOFF`].
fn backoff(base: Duration, attempt: u32) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}

/// The server's `Retry-After` when it sent one, else [`backoff`]; never more
/// than [`MAX_BACKOFF`] either way.
fn retry_delay(after: Option<Duration>, base: Duration, attempt: u32) -> Duration {
    after
        .unwrap_or_else(|| backoff(base, attempt))
        .min(MAX_BACKOFF)
}

// ---------------------------------------------------------------------------
// Wire format
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    stream: bool,
}

impl<'a> ChatRequest<'a> {
    fn user(route: &'a Route, prompt: &'a str) -> Self {
        Self {
            model: route.model.as_str(),
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: route.temperature,
            stream: false,
        }
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

fn parse_completion(body: &str) -> Result<String, LlmError> {
    let response: ChatResponse =
        serde_json::from_str(body).map_err(|e| LlmError::Decode(e.to_string()))?;
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| LlmError::Decode("response has no choices".into()))?;
    match choice.message.content {
        Some(content) if !content.trim().is_empty() => Ok(content),
        _ => Err(LlmError::EmptyCompletion),
    }
}
