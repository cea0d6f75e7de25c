//! Provider failures and their retry classification.

use std::time::Duration;

use pipeline::RetryPolicy;
use thiserror::Error;

/// Longest response body excerpt kept in a [`LlmError::Status`] message.
const BODY_EXCERPT_CHARS: usize = 300;

#[derive(Debug, Error)]
pub enum LlmError {
    /// The API key variable named in configuration is not set.
    #[error("API key not found in environment variable '{0}'")]
    MissingApiKey(String),

    /// The request never produced an HTTP response.
    #[error("request failed: {0}")]
    Transport(#[source] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned HTTP {status}: {body}")]
    Status {
        status: u16,
        body: String,
        retry_after: Option<Duration>,
    },

    /// The response body was not a chat completion.
    #[error("could not decode provider response: {0}")]
    Decode(String),

    /// A completion arrived without any text.
    #[error("provider returned an empty completion")]
    EmptyCompletion,
}

impl LlmError {
    pub(crate) fn status(status: u16, body: &str, retry_after: Option<Duration>) -> Self {
        let mut excerpt: String = body.trim().chars().take(BODY_EXCERPT_CHARS).collect();
        if body.trim().chars().count() > BODY_EXCERPT_CHARS {
            excerpt.push_str("...");
        }
        LlmError::Status {
            status,
            body: excerpt,
            retry_after,
        }
    }

    /// Whether the call that produced this error may be re-issued.
    ///
    /// Timeouts, connection failures, `429` and `5xx` are transient; a
    /// `Retry-After` header, when present, sets the minimum delay.
    pub fn retry_policy(&self) -> RetryPolicy {
        match self {
            LlmError::Transport(e) if e.is_timeout() || e.is_connect() || e.is_request() => {
                RetryPolicy::Retryable { after: None }
            }
            LlmError::Status {
                status,
                retry_after,
                ..
            } if *status == 429 || *status >= 500 => RetryPolicy::Retryable {
                after: *retry_after,
            },
            LlmError::EmptyCompletion => RetryPolicy::Retryable { after: None },
            _ => RetryPolicy::NonRetryable,
        }
    }
}

/// Parses a `Retry-After` header given in whole seconds.
pub(crate) fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
