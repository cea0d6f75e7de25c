//! Top-level error and retry-policy types for the Copydesk pipeline domain.
//!
//! [`PipelineError`] is the single taxonomy shared by every layer. Only two of
//! its variants are ever allowed to reach the executor: a checkpoint store that
//! cannot record state, and job-service lookups. Everything a stage collaborator
//! produces ([`PipelineError::CollaboratorFailure`],
//! [`PipelineError::ValidationFailure`]) is absorbed at the stage boundary and
//! replaced by that stage's declared fallback.
//!
//! [`RetryPolicy`] is a cross-cutting concern for infrastructure adapters: the
//! orchestration core never retries, but a collaborator (e.g. the LLM client)
//! may consult it before giving up.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// What an adapter may do after a failed call to an external service.
///
/// Rate limits, 5xx responses and timeouts come back as `Retryable`; bad
/// credentials, rejected requests and unreadable bodies as `NonRetryable`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RetryPolicy {
    /// Try again, waiting at least `after` when the service named a delay
    /// (`Retry-After`). `None` leaves the wait to the adapter's backoff.
    Retryable { after: Option<Duration> },
    NonRetryable,
}

/// Errors produced anywhere in the content pipeline.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
pub enum PipelineError {
    /// A document-store read named a document that has never been written.
    ///
    /// This is an expected condition: callers check `exists` first or treat it
    /// as "absent, use default".
    #[error("Document not found: {name}")]
    NotFound {
        /// The document name that was requested.
        name: String,
    },

    /// A stage collaborator failed, including by exceeding its timeout.
    #[error("Stage '{stage}' failed: {message}")]
    CollaboratorFailure {
        /// Name of the stage whose collaborator failed.
        stage: String,
        /// Description of the failure.
        message: String,
    },

    /// A collaborator returned content that could not be turned into the
    /// structured value the stage expected.
    #[error("Stage '{stage}' returned malformed output: {message}")]
    ValidationFailure {
        /// Name of the stage whose output was malformed.
        stage: String,
        /// Description of the validation problem.
        message: String,
    },

    /// The checkpoint store could not durably record or load run state.
    ///
    /// This is the only condition that fails a job; the message is preserved
    /// verbatim for operators.
    #[error("Checkpoint store unavailable: {message}")]
    CheckpointUnavailable {
        /// Description reported by the checkpoint store.
        message: String,
    },

    /// A job identifier is not known to the job service or checkpoint store.
    #[error("Job not found: {job_id}")]
    JobNotFound {
        /// The job identifier that was looked up.
        job_id: String,
    },

    /// A job submission was rejected before any work started.
    #[error("Invalid job request: {message}")]
    InvalidRequest {
        /// Description of the rejected field.
        message: String,
    },

    /// Runtime configuration is invalid.
    ///
    /// Produced at load time; no job starts with an invalid config.
    #[error("Configuration error: {message}")]
    ConfigurationError {
        /// Description of the configuration problem.
        message: String,
    },
}

impl PipelineError {
    /// Builds a [`PipelineError::CollaboratorFailure`] for `stage`.
    pub fn collaborator(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::CollaboratorFailure {
            stage: stage.into(),
            message: message.to_string(),
        }
    }

    /// Builds a [`PipelineError::ValidationFailure`] for `stage`.
    pub fn validation(stage: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::ValidationFailure {
            stage: stage.into(),
            message: message.to_string(),
        }
    }
}
