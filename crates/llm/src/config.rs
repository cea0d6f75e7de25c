//! The `[llm]` configuration section.

use std::time::Duration;

use pipeline::{ModelId, ModelRole, PipelineError};
use serde::{Deserialize, Serialize};

/// Groq's OpenAI-compatible chat-completions endpoint.
pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1/chat/completions";

/// Environment variable holding the API key unless configured otherwise.
pub const DEFAULT_API_KEY_ENV: &str = "GROQ_API_KEY";

/// Model and sampling temperature for one [`ModelRole`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleModel {
    pub model: String,
    #[serde(default)]
    pub temperature: f32,
}

impl RoleModel {
    fn of(model: &str, temperature: f32) -> Self {
        Self {
            model: model.to_string(),
            temperature,
        }
    }

    /// The configured model as a provider identifier, `None` when blank.
    pub fn model_id(&self) -> Option<ModelId> {
        ModelId::new(self.model.trim())
    }
}

/// Connection, retry and per-role model settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LlmConfig {
    /// Full URL of the chat-completions endpoint.
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    /// Attempts per call, first attempt included.
    pub max_attempts: u32,
    /// First back-off delay; doubles per retry.
    pub retry_base_delay_ms: u64,
    pub planner: RoleModel,
    pub researcher: RoleModel,
    pub writer: RoleModel,
    pub structure_critic: RoleModel,
    pub engagement_critic: RoleModel,
    pub logic_critic: RoleModel,
    pub optimizer: RoleModel,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            request_timeout_secs: 90,
            max_attempts: 3,
            retry_base_delay_ms: 500,
            planner: RoleModel::of("openai/gpt-oss-120b", 0.2),
            researcher: RoleModel::of("openai/gpt-oss-20b", 0.0),
            writer: RoleModel::of("openai/gpt-oss-120b", 0.4),
            structure_critic: RoleModel::of("qwen/qwen3-32b", 0.2),
            engagement_critic: RoleModel::of("moonshotai/kimi-k2-instruct", 0.3),
            logic_critic: RoleModel::of("llama-3.3-70b-versatile", 0.1),
            optimizer: RoleModel::of("openai/gpt-oss-120b", 0.3),
        }
    }
}

impl LlmConfig {
    /// The model routed to `role`.
    pub fn role(&self, role: ModelRole) -> &RoleModel {
        match role {
            ModelRole::Planner => &self.planner,
            ModelRole::Researcher => &self.researcher,
            ModelRole::Writer => &self.writer,
            ModelRole::StructureCritic => &self.structure_critic,
            ModelRole::EngagementCritic => &self.engagement_critic,
            ModelRole::LogicCritic => &self.logic_critic,
            ModelRole::Optimizer => &self.optimizer,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }

    /// Rejects settings no request could succeed with.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] naming the first offending key.
    pub fn validate(&self) -> Result<(), PipelineError> {
        let invalid = |message: String| -> Result<(), PipelineError> {
            Err(PipelineError::ConfigurationError { message })
        };

        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return invalid(format!("llm.base_url must be an http(s) URL, got '{}'", self.base_url));
        }
        if self.api_key_env.trim().is_empty() {
            return invalid("llm.api_key_env must not be empty".into());
        }
        if self.request_timeout_secs == 0 {
            return invalid("llm.request_timeout_secs must be at least 1".into());
        }
        if self.max_attempts == 0 {
            return invalid("llm.max_attempts must be at least 1".into());
        }
        for role in ModelRole::ALL {
            let entry = self.role(role);
            if entry.model_id().is_none() {
                return invalid(format!("llm.{role}.model must not be empty"));
            }
            if !(0.0..=2.0).contains(&entry.temperature) {
                return invalid(format!(
                    "llm.{role}.temperature must be within 0.0..=2.0, got {}",
                    entry.temperature
                ));
            }
        }
        Ok(())
    }
}
