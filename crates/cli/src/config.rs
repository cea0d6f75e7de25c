//! `.copydesk/config.toml` loading.
//!
//! Every key is optional; a missing default file means all defaults. An
//! explicit `--config` path must exist.

use std::path::{Path, PathBuf};
use std::time::Duration;

use llm::LlmConfig;
use pipeline::{ArtifactScore, PipelineError, PipelinePolicy, RefinementPolicy};
use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = ".copydesk/config.toml";
pub const DEFAULT_CHECKPOINT_DIR: &str = ".copydesk/checkpoints";

fn config_error(message: impl Into<String>) -> PipelineError {
    PipelineError::ConfigurationError {
        message: message.into(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub llm: LlmConfig,
    pub pipeline: PipelineSection,
    pub research: ResearchSection,
    pub checkpoint: CheckpointSection,
}

/// `[pipeline]`: orchestration tunables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineSection {
    pub draft_name: String,
    pub stage_timeout_secs: u64,
    pub concurrent_fan_out: bool,
    pub humanizer_threshold: u8,
    pub humanizer_max_iterations: u32,
}

impl Default for PipelineSection {
    fn default() -> Self {
        let policy = PipelinePolicy::default();
        Self {
            draft_name: policy.draft_name,
            stage_timeout_secs: policy.stage_timeout.as_secs(),
            concurrent_fan_out: policy.concurrent_fan_out,
            humanizer_threshold: policy.refinement.threshold,
            humanizer_max_iterations: policy.refinement.max_iterations,
        }
    }
}

impl PipelineSection {
    /// The executor policy these settings describe.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] naming the first offending key.
    pub fn policy(&self) -> Result<PipelinePolicy, PipelineError> {
        let draft_name = self.draft_name.trim();
        if draft_name.is_empty() {
            return Err(config_error("pipeline.draft_name must not be empty"));
        }
        if self.stage_timeout_secs == 0 {
            return Err(config_error("pipeline.stage_timeout_secs must be at least 1"));
        }
        if ArtifactScore::new(self.humanizer_threshold).is_none() {
            return Err(config_error(format!(
                "pipeline.humanizer_threshold must be within 0..={}, got {}",
                ArtifactScore::MAX,
                self.humanizer_threshold
            )));
        }
        if self.humanizer_max_iterations == 0 {
            return Err(config_error("pipeline.humanizer_max_iterations must be at least 1"));
        }
        Ok(PipelinePolicy {
            draft_name: draft_name.to_string(),
            stage_timeout: Duration::from_secs(self.stage_timeout_secs),
            concurrent_fan_out: self.concurrent_fan_out,
            refinement: RefinementPolicy {
                threshold: self.humanizer_threshold,
                max_iterations: self.humanizer_max_iterations,
            },
        })
    }
}

/// `[research]`: page fetching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResearchSection {
    pub scrape_timeout_secs: u64,
}

impl Default for ResearchSection {
    fn default() -> Self {
        Self {
            scrape_timeout_secs: 20,
        }
    }
}

impl ResearchSection {
    pub fn scrape_timeout(&self) -> Duration {
        Duration::from_secs(self.scrape_timeout_secs.max(1))
    }
}

/// `[checkpoint]`: where run states are kept.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckpointSection {
    pub dir: PathBuf,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_CHECKPOINT_DIR),
        }
    }
}

impl Config {
    /// Loads `path`, or [`DEFAULT_CONFIG_PATH`] when `None`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::ConfigurationError`] if an explicit path is missing,
    /// the file cannot be read or parsed, or a value is out of range.
    pub fn load(path: Option<&Path>) -> Result<Self, PipelineError> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
        };
        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default())
            }
            Err(e) => return Err(config_error(format!("cannot read {}: {e}", path.display()))),
        };
        Self::parse(&text).map_err(|e| match e {
            PipelineError::ConfigurationError { message } => {
                config_error(format!("{}: {message}", path.display()))
            }
            other => other,
        })
    }

    /// Parses and validates TOML text.
    pub fn parse(text: &str) -> Result<Self, PipelineError> {
        let config: Self = toml::from_str(text).map_err(|e| config_error(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), PipelineError> {
        self.llm.validate()?;
        self.pipeline.policy()?;
        Ok(())
    }
}
