//! Job submission and status types.

use serde::{Deserialize, Serialize};

use crate::{PipelineError, RunInputs, WordCount, DEFAULT_LANGUAGE, DEFAULT_WORD_COUNT};

/// A request to produce one article.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    /// What the article is about.
    pub topic: String,
    /// Target length; must be greater than zero.
    #[serde(default = "default_word_count")]
    pub word_count: u32,
    /// Article language.
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_word_count() -> u32 {
    DEFAULT_WORD_COUNT
}

fn default_language() -> String {
    DEFAULT_LANGUAGE.to_string()
}

impl JobRequest {
    /// Creates a request with the default length and language.
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            word_count: DEFAULT_WORD_COUNT,
            language: DEFAULT_LANGUAGE.to_string(),
        }
    }

    /// Validates the request and converts it to run inputs.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] for an empty topic or a zero word count.
    pub fn validate(self) -> Result<RunInputs, PipelineError> {
        let topic = self.topic.trim().to_string();
        if topic.is_empty() {
            return Err(PipelineError::InvalidRequest {
                message: "topic must not be empty".into(),
            });
        }
        let word_count = WordCount::new(self.word_count).ok_or_else(|| {
            PipelineError::InvalidRequest {
                message: "word_count must be greater than zero".into(),
            }
        })?;
        let language = match self.language.trim() {
            "" => DEFAULT_LANGUAGE.to_string(),
            other => other.to_string(),
        };
        Ok(RunInputs {
            topic,
            word_count,
            language,
        })
    }
}

/// Lifecycle of a job as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Accepted, not started.
    Pending,
    /// Executing.
    Running,
    /// Finished; the result holds the article.
    Completed,
    /// Stopped by a fatal error; the result holds the message verbatim.
    Failed,
}

impl JobStatus {
    /// Returns `true` for `Completed` and `Failed`.
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusReport {
    /// Current status.
    pub status: JobStatus,
    /// Article text when completed, error message when failed.
    pub result: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_word_count_is_rejected() {
        let mut request = JobRequest::new("tea");
        request.word_count = 0;
        assert!(matches!(
            request.validate(),
            Err(PipelineError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn blank_topic_is_rejected() {
        assert!(JobRequest::new("   ").validate().is_err());
    }

    #[test]
    fn defaults_fill_missing_fields() {
        let request: JobRequest = serde_json::from_str(r#"{"topic": "tea"}"#).unwrap();
        let inputs = request.validate().unwrap();
        assert_eq!(inputs.word_count.as_u32(), 1500);
        assert_eq!(inputs.language, "English");
    }
}
