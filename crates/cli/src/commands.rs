//! Command implementations.

use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use checkpoint::FileCheckpointStore;
use llm::{ChatCompletionsProvider, HttpPageScraper};
use nodes::{JobService, OfflineSearchProvider, PipelineExecutor, StageSet};
use pipeline::{
    CheckpointStore, ContentTransform, JobId, JobRequest, JobStatus, JobStatusReport,
    PipelineError, RunState,
};
use tracing::info;

use crate::config::Config;

const POLL_INTERVAL: Duration = Duration::from_millis(500);

fn job_service(config: &Config) -> Result<JobService, PipelineError> {
    let policy = config.pipeline.policy()?;
    let transform: Arc<dyn ContentTransform> =
        Arc::new(ChatCompletionsProvider::from_config(&config.llm)?);
    let scraper = Arc::new(HttpPageScraper::new(config.research.scrape_timeout())?);
    let stages = StageSet::standard(transform, Arc::new(OfflineSearchProvider), scraper, &policy);
    let checkpoints = Arc::new(FileCheckpointStore::new(&config.checkpoint.dir));
    Ok(JobService::new(Arc::new(PipelineExecutor::new(
        stages,
        checkpoints,
        policy,
    ))))
}

pub async fn run(
    config: &Config,
    topic: String,
    word_count: u32,
    language: String,
    output: Option<PathBuf>,
) -> Result<()> {
    let service = job_service(config)?;
    let request = JobRequest {
        topic,
        word_count,
        language,
    };
    let job_id = service.submit(request).await?;
    info!(%job_id, checkpoints = %config.checkpoint.dir.display(), "job started");

    let report = service.wait(job_id, POLL_INTERVAL).await?;
    deliver(job_id, report, output)
}

pub async fn resume(config: &Config, job_id: JobId, output: Option<PathBuf>) -> Result<()> {
    let service = job_service(config)?;
    service.resume(job_id).await?;

    let report = service.wait(job_id, POLL_INTERVAL).await?;
    deliver(job_id, report, output)
}

pub async fn status(config: &Config, job_id: JobId, lines: usize) -> Result<()> {
    let store = FileCheckpointStore::new(&config.checkpoint.dir);
    let state = store
        .load(job_id)
        .await?
        .ok_or_else(|| PipelineError::JobNotFound {
            job_id: job_id.to_string(),
        })?;
    print!("{}", render_status(job_id, &state, lines));
    Ok(())
}

fn deliver(job_id: JobId, report: JobStatusReport, output: Option<PathBuf>) -> Result<()> {
    let text = report.result.unwrap_or_default();
    if report.status == JobStatus::Failed {
        bail!("job {job_id} failed: {text}");
    }
    match output {
        Some(path) => {
            std::fs::write(&path, &text)
                .with_context(|| format!("failed to write article to {}", path.display()))?;
            info!(%job_id, path = %path.display(), "article written");
        }
        None => println!("{text}"),
    }
    Ok(())
}

/// Human-readable progress summary of a checkpointed run.
pub(crate) fn render_status(job_id: JobId, state: &RunState, lines: usize) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "job:       {job_id}");
    let _ = writeln!(out, "topic:     {}", state.inputs().topic);
    let _ = writeln!(out, "phase:     {}", state.phase());
    let _ = writeln!(out, "tasks:     {}/{}", state.cursor(), state.plan().len());
    if let Some(refinement) = state.refinement() {
        let _ = writeln!(
            out,
            "humanizer: iteration {} ({:?})",
            refinement.iteration_count, refinement.stage
        );
    }
    let _ = writeln!(out, "documents: {}", state.store().len());

    let logs = state.logs();
    let recent = &logs[logs.len().saturating_sub(lines)..];
    if !recent.is_empty() {
        let _ = writeln!(out, "recent log:");
        for line in recent {
            let _ = writeln!(out, "  {line}");
        }
    }
    out
}
