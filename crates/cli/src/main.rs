//! Copydesk CLI entry point.
//!
//! This binary is the composition root for the entire system. Responsibilities:
//!
//! 1. **Parse configuration**: load `.copydesk/config.toml` (or `--config`)
//!    and validate it before any job starts.
//! 2. **Wire observability**: install a `tracing-subscriber` stack with a
//!    compact or JSON layer and, when configured, an OpenTelemetry OTLP
//!    exporter. Every span and event emitted in the workspace flows through it.
//! 3. **Construct infrastructure**: build the chat-completions provider, the
//!    HTTP page scraper and the file checkpoint store, and inject them into a
//!    [`nodes::PipelineExecutor`].
//! 4. **Dispatch the command**: `run`, `resume` or `status`.

mod commands;
mod config;
mod observability;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use pipeline::{JobId, DEFAULT_LANGUAGE, DEFAULT_WORD_COUNT};

use crate::config::Config;

/// Multi-stage article pipeline: plan, research, write, critique, humanize
/// and SEO-annotate an article about a topic.
#[derive(Debug, Parser)]
#[command(name = "copydesk", version)]
struct Cli {
    /// Path to the configuration file [default: .copydesk/config.toml]
    #[arg(long, global = true, env = "COPYDESK_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start a new job and wait for the article
    Run {
        /// What the article is about
        topic: String,

        /// Target length in words
        #[arg(long, default_value_t = DEFAULT_WORD_COUNT)]
        word_count: u32,

        /// Article language
        #[arg(long, default_value = DEFAULT_LANGUAGE)]
        language: String,

        /// Write the article here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Continue a checkpointed job from where it stopped
    Resume {
        job_id: JobId,

        /// Write the article here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },

    /// Show the checkpointed progress of a job
    Status {
        job_id: JobId,

        /// Number of recent log lines to show
        #[arg(long, default_value_t = 10)]
        lines: usize,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let telemetry = match observability::init(cli.log_json) {
        Ok(telemetry) => telemetry,
        Err(e) => {
            eprintln!("error: {e:#}");
            return ExitCode::FAILURE;
        }
    };

    let outcome = dispatch(cli).await;
    telemetry.shutdown();

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(cli.config.as_deref())?;
    match cli.command {
        Command::Run {
            topic,
            word_count,
            language,
            output,
        } => commands::run(&config, topic, word_count, language, output).await,
        Command::Resume { job_id, output } => commands::resume(&config, job_id, output).await,
        Command::Status { job_id, lines } => commands::status(&config, job_id, lines).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_defaults_match_job_defaults() {
        let cli = Cli::try_parse_from(["copydesk", "run", "green tea"]).unwrap();

        let Command::Run {
            topic,
            word_count,
            language,
            output,
        } = cli.command
        else {
            panic!("expected run");
        };
        assert_eq!(topic, "green tea");
        assert_eq!(word_count, DEFAULT_WORD_COUNT);
        assert_eq!(language, DEFAULT_LANGUAGE);
        assert!(output.is_none());
    }

    #[test]
    fn status_requires_a_uuid() {
        assert!(Cli::try_parse_from(["copydesk", "status", "not-a-uuid"]).is_err());

        let id = JobId::new_random();
        let cli = Cli::try_parse_from(["copydesk", "--log-json", "status", &id.to_string()]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Command::Status { job_id, lines: 10 } if job_id == id));
    }
}
