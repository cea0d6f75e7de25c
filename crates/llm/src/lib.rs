//! Copydesk language-model and web adapters.
//!
//! Implements [`pipeline::ContentTransform`] against any OpenAI-compatible
//! chat-completions endpoint (Groq by default), and [`pipeline::PageScraper`]
//! over plain HTTP. Each [`pipeline::ModelRole`] is routed to its own model id
//! and temperature.
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** All HTTP transport, request formatting, response parsing
//! and back-off live here. The [`pipeline`] crate sees only the port traits,
//! and every failure reaches it as
//! [`pipeline::PipelineError::CollaboratorFailure`]. Retrying is owned by this
//! crate: the orchestration core never retries.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`config`] | `[llm]` configuration section and per-role model table |
//! | [`error`] | [`LlmError`] and its [`pipeline::RetryPolicy`] mapping |
//! | [`client`] | [`ChatCompletionsProvider`] |
//! | [`scrape`] | [`HttpPageScraper`] |

pub mod client;
pub mod config;
pub mod error;
pub mod scrape;

pub use client::ChatCompletionsProvider;
pub use config::{LlmConfig, RoleModel};
pub use error::LlmError;
pub use scrape::HttpPageScraper;
