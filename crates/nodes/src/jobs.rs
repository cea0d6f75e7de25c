//! Job service: submission, status and resumption.
//!
//! Each job runs on its own tokio task. The service keeps a status record
//! per job in memory; the run state itself lives in the checkpoint store.
//! A job id is owned by at most one run at a time: starting a job that is
//! still pending or running is refused.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    names, JobId, JobRequest, JobStatus, JobStatusReport, PipelineError, RunState,
};
use tokio::sync::RwLock;
use tokio::task::JoinError;
use tracing::{error, info};

use crate::executor::PipelineExecutor;

#[derive(Debug, Clone)]
struct JobRecord {
    status: JobStatus,
    result: Option<String>,
}

impl JobRecord {
    fn pending() -> Self {
        Self {
            status: JobStatus::Pending,
            result: None,
        }
    }

    fn report(&self) -> JobStatusReport {
        JobStatusReport {
            status: self.status,
            result: self.result.clone(),
        }
    }
}

/// The article a finished run produced: the final article, else the draft.
pub fn job_result(state: &RunState, draft_name: &str) -> Option<String> {
    let store = state.store();
    store
        .read(names::FINAL_ARTICLE)
        .or_else(|_| store.read(draft_name))
        .ok()
        .map(str::to_string)
}

/// Submits, tracks and resumes jobs on top of one [`PipelineExecutor`].
#[derive(Clone)]
pub struct JobService {
    executor: Arc<PipelineExecutor>,
    jobs: Arc<RwLock<HashMap<JobId, JobRecord>>>,
}

impl JobService {
    pub fn new(executor: Arc<PipelineExecutor>) -> Self {
        Self {
            executor,
            jobs: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Validates `request`, records a pending job and starts it.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] if the request fails validation.
    pub async fn submit(&self, request: JobRequest) -> Result<JobId, PipelineError> {
        let inputs = request.validate()?;
        let job_id = JobId::new_random();
        info!(%job_id, topic = %inputs.topic, "job submitted");
        self.start(job_id, RunState::new(inputs)).await?;
        Ok(job_id)
    }

    /// Reloads a checkpointed job and continues it from its recorded position.
    ///
    /// # Errors
    ///
    /// [`PipelineError::InvalidRequest`] if the job is still pending or
    /// running here; [`PipelineError::JobNotFound`] if no checkpoint exists
    /// for `job_id`; [`PipelineError::CheckpointUnavailable`] if it cannot be
    /// read.
    pub async fn resume(&self, job_id: JobId) -> Result<(), PipelineError> {
        if let Some(record) = self.jobs.read().await.get(&job_id) {
            ensure_idle(job_id, record)?;
        }
        let state = self
            .executor
            .checkpoints()
            .load(job_id)
            .await?
            .ok_or_else(|| PipelineError::JobNotFound {
                job_id: job_id.to_string(),
            })?;
        info!(%job_id, phase = %state.phase(), cursor = state.cursor(), "job resumed");
        self.start(job_id, state).await
    }

    /// Current status of `job_id`.
    ///
    /// # Errors
    ///
    /// [`PipelineError::JobNotFound`] for an id this service never saw.
    pub async fn status(&self, job_id: JobId) -> Result<JobStatusReport, PipelineError> {
        self.jobs
            .read()
            .await
            .get(&job_id)
            .map(JobRecord::report)
            .ok_or_else(|| PipelineError::JobNotFound {
                job_id: job_id.to_string(),
            })
    }

    /// Polls until `job_id` reaches a terminal status.
    pub async fn wait(&self, job_id: JobId, poll: Duration) -> Result<JobStatusReport, PipelineError> {
        loop {
            let report = self.status(job_id).await?;
            if report.status.is_terminal() {
                return Ok(report);
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn start(&self, job_id: JobId, state: RunState) -> Result<(), PipelineError> {
        {
            let mut jobs = self.jobs.write().await;
            if let Some(record) = jobs.get(&job_id) {
                ensure_idle(job_id, record)?;
            }
            jobs.insert(job_id, JobRecord::pending());
        }

        let executor = Arc::clone(&self.executor);
        let jobs = Arc::clone(&self.jobs);
        tokio::spawn(async move {
            set_status(&jobs, job_id, JobStatus::Running, None).await;
            let draft_name = executor.policy().draft_name.clone();
            let run = tokio::spawn(async move { executor.run(job_id, state).await });
            match run.await {
                Ok(Ok(finished)) => {
                    let result = job_result(&finished, &draft_name);
                    info!(%job_id, "job completed");
                    set_status(&jobs, job_id, JobStatus::Completed, result).await;
                }
                Ok(Err(e)) => {
                    error!(%job_id, error = %e, "job failed");
                    set_status(&jobs, job_id, JobStatus::Failed, Some(e.to_string())).await;
                }
                Err(e) => {
                    let message = abort_message(e);
                    error!(%job_id, error = %message, "job aborted");
                    set_status(&jobs, job_id, JobStatus::Failed, Some(message)).await;
                }
            }
        });
        Ok(())
    }
}

fn ensure_idle(job_id: JobId, record: &JobRecord) -> Result<(), PipelineError> {
    if record.status.is_terminal() {
        Ok(())
    } else {
        Err(PipelineError::InvalidRequest {
            message: format!("job {job_id} is already {}", record.status),
        })
    }
}

/// The panic payload of a run that did not return, when it is text.
fn abort_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "job panicked".to_string()),
        Err(err) => err.to_string(),
    }
}

async fn set_status(
    jobs: &RwLock<HashMap<JobId, JobRecord>>,
    job_id: JobId,
    status: JobStatus,
    result: Option<String>,
) {
    if let Some(record) = jobs.write().await.get_mut(&job_id) {
        record.status = status;
        record.result = result;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StageSet;
    use crate::stages::research::{OfflineScraper, OfflineSearchProvider};
    use crate::testing::ScriptedTransform;
    use async_trait::async_trait;
    use checkpoint::InMemoryCheckpointStore;
    use pipeline::{CheckpointStore, ContentTransform, ModelRole, PipelinePolicy, TransformRequest};
    use tokio::sync::Semaphore;

    fn service_with(
        transform: Arc<dyn ContentTransform>,
        checkpoints: Arc<dyn CheckpointStore>,
    ) -> JobService {
        let policy = PipelinePolicy {
            stage_timeout: Duration::from_secs(5),
            ..PipelinePolicy::default()
        };
        let stages = StageSet::standard(
            transform,
            Arc::new(OfflineSearchProvider),
            Arc::new(OfflineScraper),
            &policy,
        );
        JobService::new(Arc::new(PipelineExecutor::new(stages, checkpoints, policy)))
    }

    fn happy_transform() -> ScriptedTransform {
        ScriptedTransform::new()
            .respond(
                ModelRole::Planner,
                r#"[{"type": "research", "description": "tea facts"}, {"type": "write", "description": "Intro"}]"#,
            )
            .respond(ModelRole::Researcher, "Tea is brewed from leaves.")
            .respond(ModelRole::Writer, "## Tea\nTea is brewed from leaves.")
            .respond(ModelRole::StructureCritic, "fine")
            .respond(ModelRole::EngagementCritic, "fine")
            .respond(ModelRole::LogicCritic, "fine")
            .respond(ModelRole::Optimizer, "## Tea\nOptimized.")
            .respond(ModelRole::Optimizer, r#"{"ai_artifact_score": 2}"#)
            .respond(ModelRole::Optimizer, "## Tea\nHuman.")
    }

    const POLL: Duration = Duration::from_millis(10);

    #[tokio::test]
    async fn submitted_job_completes_with_article() {
        let service = service_with(Arc::new(happy_transform()), Arc::new(InMemoryCheckpointStore::new()));

        let job = service.submit(JobRequest::new("green tea")).await.unwrap();
        let report = service.wait(job, POLL).await.unwrap();

        assert_eq!(report.status, JobStatus::Completed);
        let article = report.result.unwrap();
        assert!(article.starts_with("---\ntitle: \"green tea\""));
        assert!(article.contains("## Tea\nHuman."));
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_a_job_exists() {
        let service = service_with(Arc::new(happy_transform()), Arc::new(InMemoryCheckpointStore::new()));
        let mut request = JobRequest::new("tea");
        request.word_count = 0;

        assert!(matches!(
            service.submit(request).await,
            Err(PipelineError::InvalidRequest { .. })
        ));
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let service = service_with(Arc::new(happy_transform()), Arc::new(InMemoryCheckpointStore::new()));
        let job = JobId::new_random();

        assert!(matches!(service.status(job).await, Err(PipelineError::JobNotFound { .. })));
        assert!(matches!(service.resume(job).await, Err(PipelineError::JobNotFound { .. })));
    }

    struct BrokenCheckpoints;

    #[async_trait]
    impl CheckpointStore for BrokenCheckpoints {
        async fn save(&self, _: JobId, _: &RunState) -> Result<(), PipelineError> {
            Err(PipelineError::CheckpointUnavailable {
                message: "read-only volume".into(),
            })
        }

        async fn load(&self, _: JobId) -> Result<Option<RunState>, PipelineError> {
            Ok(None)
        }

        async fn purge(&self, _: JobId) -> Result<bool, PipelineError> {
            Ok(false)
        }
    }

    #[tokio::test]
    async fn checkpoint_failure_marks_job_failed_with_message() {
        let service = service_with(Arc::new(happy_transform()), Arc::new(BrokenCheckpoints));

        let job = service.submit(JobRequest::new("green tea")).await.unwrap();
        let report = service.wait(job, POLL).await.unwrap();

        assert_eq!(report.status, JobStatus::Failed);
        assert!(report.result.unwrap().contains("read-only volume"));
    }

    #[tokio::test]
    async fn resume_finishes_a_checkpointed_job() {
        let checkpoints = Arc::new(InMemoryCheckpointStore::new());
        let job = JobId::new_random();
        let inputs = JobRequest::new("green tea").validate().unwrap();
        checkpoints.save(job, &RunState::new(inputs)).await.unwrap();
        let service = service_with(Arc::new(happy_transform()), checkpoints.clone());

        service.resume(job).await.unwrap();
        let report = service.wait(job, POLL).await.unwrap();

        assert_eq!(report.status, JobStatus::Completed);
        let saved = checkpoints.load(job).await.unwrap().unwrap();
        assert_eq!(saved.cursor(), 2);
    }

    /// Holds writer calls until the gate has permits, or panics on them.
    struct GatedWriter {
        inner: ScriptedTransform,
        gate: Arc<Semaphore>,
        panic: bool,
    }

    impl GatedWriter {
        fn new(gate: Arc<Semaphore>) -> Self {
            Self {
                inner: happy_transform(),
                gate,
                panic: false,
            }
        }

        fn panicking() -> Self {
            Self {
                panic: true,
                ..Self::new(Arc::new(Semaphore::new(0)))
            }
        }
    }

    #[async_trait]
    impl ContentTransform for GatedWriter {
        async fn transform(&self, request: TransformRequest) -> Result<String, PipelineError> {
            if request.role == ModelRole::Writer {
                if self.panic {
                    panic!("writer blew up");
                }
                let _permit = self.gate.acquire().await;
            }
            self.inner.transform(request).await
        }
    }

    async fn writer_calls_for_one_run() -> usize {
        let writer = Arc::new(GatedWriter::new(Arc::new(Semaphore::new(64))));
        let service = service_with(writer.clone(), Arc::new(InMemoryCheckpointStore::new()));
        let job = service.submit(JobRequest::new("green tea")).await.unwrap();
        service.wait(job, POLL).await.unwrap();
        writer.inner.prompts(ModelRole::Writer).len()
    }

    #[tokio::test]
    async fn resuming_an_active_job_is_refused() {
        let expected_calls = writer_calls_for_one_run().await;
        let gate = Arc::new(Semaphore::new(0));
        let writer = Arc::new(GatedWriter::new(gate.clone()));
        let service = service_with(writer.clone(), Arc::new(InMemoryCheckpointStore::new()));

        let job = service.submit(JobRequest::new("green tea")).await.unwrap();
        let refused = service.resume(job).await;
        gate.add_permits(64);
        let report = service.wait(job, POLL).await.unwrap();

        assert!(matches!(refused, Err(PipelineError::InvalidRequest { .. })));
        assert_eq!(report.status, JobStatus::Completed);
        assert_eq!(writer.inner.prompts(ModelRole::Writer).len(), expected_calls);

        // Once finished the job may be resumed again; nothing reruns.
        service.resume(job).await.unwrap();
        let again = service.wait(job, POLL).await.unwrap();
        assert_eq!(again.status, JobStatus::Completed);
        assert_eq!(writer.inner.prompts(ModelRole::Writer).len(), expected_calls);
    }

    #[tokio::test]
    async fn panicking_stage_fails_the_job_with_its_message() {
        let service = service_with(
            Arc::new(GatedWriter::panicking()),
            Arc::new(InMemoryCheckpointStore::new()),
        );

        let job = service.submit(JobRequest::new("green tea")).await.unwrap();
        let report = tokio::time::timeout(Duration::from_secs(5), service.wait(job, POLL))
            .await
            .expect("job reached a terminal status")
            .unwrap();

        assert_eq!(report.status, JobStatus::Failed);
        assert_eq!(report.result.as_deref(), Some("writer blew up"));
    }
}
