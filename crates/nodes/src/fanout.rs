//! Fan-out/fan-in coordinator.
//!
//! Every branch receives its own copy of the same store snapshot, runs under
//! a per-branch timeout, and hands back the documents it changed. A branch
//! that fails, times out or panics is replaced by its declared fallback.
//! Deltas are merged in declared branch order regardless of which branch
//! finished first, so the merged store is the same on every run.
//!
//! Branches run on spawned tokio tasks when concurrency is enabled and a
//! runtime is available; otherwise they run one after another in declared
//! order. Both paths produce the same merged result.

use std::sync::Arc;
use std::time::Duration;

use pipeline::{
    merge_in_order, BranchDelta, DocumentStore, MergeReport, PipelineError, PipelinePolicy, Stage,
    StageContext, StageOutcome,
};
use tokio::runtime::Handle;
use tokio::task::JoinSet;
use tracing::{debug, warn, Instrument};

/// A fan-out branch: any stage producing `T`.
pub type Branch<T> = Arc<dyn Stage<Output = T>>;

/// One branch's contribution after fan-in.
#[derive(Debug, Clone, PartialEq)]
pub struct BranchOutput<T> {
    /// Branch (stage) name.
    pub branch: String,
    /// The branch output, or its fallback.
    pub output: T,
    /// `true` if the fallback was used.
    pub degraded: bool,
}

/// Result of one fan-out/fan-in round.
#[derive(Debug, Clone, PartialEq)]
pub struct FanOutResult<T> {
    /// Outputs in declared branch order.
    pub outputs: Vec<BranchOutput<T>>,
    /// What the merge applied and which names collided.
    pub merge: MergeReport,
}

/// Runs `stage` against a private copy of `snapshot` and returns its delta,
/// substituting the stage's fallback on failure.
///
/// With `limit` set, the invocation is abandoned once it elapses.
pub async fn invoke_stage<S>(
    stage: &S,
    snapshot: &DocumentStore,
    ctx: &StageContext,
    limit: Option<Duration>,
) -> (StageOutcome<S::Output>, bool)
where
    S: Stage + ?Sized,
{
    let mut work = snapshot.clone();
    let result = run_bounded(stage, &mut work, ctx, limit).await;
    settle(stage, snapshot, ctx, result.map(|output| (output, work)))
}

async fn run_bounded<S>(
    stage: &S,
    work: &mut DocumentStore,
    ctx: &StageContext,
    limit: Option<Duration>,
) -> Result<S::Output, PipelineError>
where
    S: Stage + ?Sized,
{
    match limit {
        Some(limit) => match tokio::time::timeout(limit, stage.run(work, ctx)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::collaborator(
                stage.name(),
                format!("timed out after {}s", limit.as_secs_f64()),
            )),
        },
        None => stage.run(work, ctx).await,
    }
}

/// Turns a branch result into an outcome, falling back on error.
fn settle<S>(
    stage: &S,
    snapshot: &DocumentStore,
    ctx: &StageContext,
    result: Result<(S::Output, DocumentStore), PipelineError>,
) -> (StageOutcome<S::Output>, bool)
where
    S: Stage + ?Sized,
{
    match result {
        Ok((output, work)) => {
            let delta = work.diff(snapshot);
            debug!(stage = stage.name(), documents = delta.len(), "stage finished");
            (StageOutcome { delta, output }, false)
        }
        Err(e) => {
            warn!(stage = stage.name(), error = %e, "stage failed, using fallback");
            (stage.fallback(snapshot, ctx), true)
        }
    }
}

/// Runs a set of independent stages against one snapshot and merges them back.
#[derive(Debug, Clone)]
pub struct FanOutCoordinator {
    timeout: Duration,
    concurrent: bool,
}

impl FanOutCoordinator {
    /// `timeout` bounds each branch; `concurrent: false` runs branches one
    /// after another in declared order.
    pub fn new(timeout: Duration, concurrent: bool) -> Self {
        Self {
            timeout,
            concurrent,
        }
    }

    /// Takes the branch timeout and concurrency switch from `policy`.
    pub fn from_policy(policy: &PipelinePolicy) -> Self {
        Self::new(policy.stage_timeout, policy.concurrent_fan_out)
    }

    /// Fans `branches` out over a snapshot of `store`, then merges every
    /// branch delta into `store` in declared order.
    ///
    /// Never fails: each branch either contributes its own result or its
    /// fallback. An empty branch list is a no-op.
    pub async fn run<T: Send + 'static>(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
        branches: &[Branch<T>],
    ) -> FanOutResult<T> {
        let snapshot = store.clone();
        let runtime = Handle::try_current().is_ok();

        let outcomes = if self.concurrent && runtime {
            self.run_concurrent(&snapshot, ctx, branches).await
        } else {
            if self.concurrent {
                warn!("no async runtime available, running branches sequentially");
            }
            let limit = runtime.then_some(self.timeout);
            let mut outcomes = Vec::with_capacity(branches.len());
            for stage in branches {
                outcomes.push(invoke_stage(stage.as_ref(), &snapshot, ctx, limit).await);
            }
            outcomes
        };

        let mut outputs = Vec::with_capacity(outcomes.len());
        let mut deltas = Vec::with_capacity(outcomes.len());
        for (stage, (outcome, degraded)) in branches.iter().zip(outcomes) {
            let branch = stage.name().to_string();
            deltas.push(BranchDelta {
                branch: branch.clone(),
                delta: outcome.delta,
            });
            outputs.push(BranchOutput {
                branch,
                output: outcome.output,
                degraded,
            });
        }

        let merge = merge_in_order(store, deltas);
        for collision in &merge.collisions {
            warn!(
                document = %collision.name,
                branches = ?collision.branches,
                "document written by several branches; last branch wins"
            );
        }
        FanOutResult { outputs, merge }
    }

    async fn run_concurrent<T: Send + 'static>(
        &self,
        snapshot: &DocumentStore,
        ctx: &StageContext,
        branches: &[Branch<T>],
    ) -> Vec<(StageOutcome<T>, bool)> {
        let shared_ctx = Arc::new(ctx.clone());
        let mut set = JoinSet::new();
        for (index, stage) in branches.iter().enumerate() {
            let stage = Arc::clone(stage);
            let ctx = Arc::clone(&shared_ctx);
            let mut work = snapshot.clone();
            let limit = self.timeout;
            let span = tracing::info_span!("branch", stage = stage.name());
            set.spawn(
                async move {
                    let result = run_bounded(stage.as_ref(), &mut work, &ctx, Some(limit)).await;
                    (index, result.map(|output| (output, work)))
                }
                .instrument(span),
            );
        }

        let mut slots: Vec<Option<Result<(T, DocumentStore), PipelineError>>> =
            branches.iter().map(|_| None).collect();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((index, result)) => slots[index] = Some(result),
                Err(e) => warn!(error = %e, "branch task aborted"),
            }
        }

        branches
            .iter()
            .zip(slots)
            .map(|(stage, slot)| {
                let result = slot.unwrap_or_else(|| {
                    Err(PipelineError::collaborator(stage.name(), "branch task aborted"))
                });
                settle(stage.as_ref(), snapshot, ctx, result)
            })
            .collect()
    }
}
