//! Fakes shared by this crate's unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use pipeline::{
    ArtifactScore, ContentTransform, DocumentStore, HumanizerCritic, HumanizerCritique,
    HumanizerRefiner, ModelRole, PipelineError, Stage, StageContext, StageOutcome,
    TransformRequest,
};

/// A content transform that answers from per-role scripts.
///
/// Responses for a role are consumed in order; the last one repeats. A role
/// with no script fails.
#[derive(Default)]
pub struct ScriptedTransform {
    scripts: Mutex<HashMap<ModelRole, VecDeque<Result<String, String>>>>,
    seen: Mutex<Vec<TransformRequest>>,
}

impl ScriptedTransform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, role: ModelRole, text: impl Into<String>) -> Self {
        self.push(role, Ok(text.into()))
    }

    pub fn fail(self, role: ModelRole, message: impl Into<String>) -> Self {
        self.push(role, Err(message.into()))
    }

    fn push(self, role: ModelRole, entry: Result<String, String>) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(entry);
        self
    }

    /// Total number of transform calls.
    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    /// Prompts sent for `role`, in call order.
    pub fn prompts(&self, role: ModelRole) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.role == role)
            .map(|r| r.prompt.clone())
            .collect()
    }
}

#[async_trait]
impl ContentTransform for ScriptedTransform {
    async fn transform(&self, request: TransformRequest) -> Result<String, PipelineError> {
        let role = request.role;
        self.seen.lock().unwrap().push(request);
        let mut scripts = self.scripts.lock().unwrap();
        let queue = scripts.get_mut(&role);
        let entry = match queue {
            Some(queue) if queue.len() > 1 => queue.pop_front(),
            Some(queue) => queue.front().cloned(),
            None => None,
        };
        match entry {
            Some(Ok(text)) => Ok(text),
            Some(Err(message)) => Err(PipelineError::collaborator(role.to_string(), message)),
            None => Err(PipelineError::collaborator(role.to_string(), "no scripted response")),
        }
    }
}

/// A stage that records the names it saw, then writes one document.
pub struct WritingStage {
    name: String,
    target: String,
    content: String,
    delay: Option<Duration>,
    fail: bool,
    panic: bool,
}

impl WritingStage {
    pub fn new(name: &str, target: &str, content: &str) -> Self {
        Self {
            name: name.to_string(),
            target: target.to_string(),
            content: content.to_string(),
            delay: None,
            fail: false,
            panic: false,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn panicking(mut self) -> Self {
        self.panic = true;
        self
    }
}

#[async_trait]
impl Stage for WritingStage {
    type Output = Vec<String>;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        store: &mut DocumentStore,
        _ctx: &StageContext,
    ) -> Result<Vec<String>, PipelineError> {
        let seen = store.list().into_iter().map(String::from).collect();
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.panic {
            panic!("stage {} exploded", self.name);
        }
        store.write(self.target.clone(), self.content.clone());
        if self.fail {
            return Err(PipelineError::collaborator(&self.name, "scripted failure"));
        }
        Ok(seen)
    }

    fn fallback(&self, _snapshot: &DocumentStore, _ctx: &StageContext) -> StageOutcome<Vec<String>> {
        StageOutcome::without_writes(vec!["fallback".to_string()])
    }
}

/// A critic that returns scores from a list (last one repeats) and counts calls.
pub struct ScoreCritic {
    scores: Vec<Option<u8>>,
    pub calls: AtomicUsize,
}

impl ScoreCritic {
    /// `None` entries make that call fail.
    pub fn new(scores: Vec<Option<u8>>) -> Self {
        Self {
            scores,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HumanizerCritic for ScoreCritic {
    async fn critique(&self, _draft: &str) -> Result<HumanizerCritique, PipelineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        let score = self
            .scores
            .get(call)
            .or_else(|| self.scores.last())
            .copied()
            .flatten();
        match score.and_then(ArtifactScore::new) {
            Some(score) => Ok(HumanizerCritique::synthetic(score, "scripted")),
            None => Err(PipelineError::collaborator("humanizer_critic", "scripted failure")),
        }
    }
}

/// A refiner that appends a marker and counts calls; optionally fails.
pub struct CountingRefiner {
    fail: bool,
    pub calls: AtomicUsize,
}

impl CountingRefiner {
    pub fn new() -> Self {
        Self {
            fail: false,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HumanizerRefiner for CountingRefiner {
    async fn refine(
        &self,
        draft: &str,
        _critique: &HumanizerCritique,
    ) -> Result<String, PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(PipelineError::collaborator("humanizer_refiner", "scripted failure"));
        }
        Ok(format!("{draft} [refined]"))
    }
}
