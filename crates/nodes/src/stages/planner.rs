//! Plan generation.
//!
//! The planner asks the model for a JSON array of `{id, type, description}`
//! objects. Ids in the answer are ignored; the caller assigns `1..n` in
//! array order. Items with a kind other than `research` or `write`, or with
//! fields we do not know, are dropped before ids are assigned.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    parse_json, ContentTransform, ModelRole, PipelineError, Planner, RunInputs, TaskDraft,
    TaskKind, TransformRequest,
};
use serde::Deserialize;
use tracing::{debug, warn};

const STAGE: &str = "planner";

/// One task as the model proposes it.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ProposedTask {
    #[serde(default)]
    #[allow(dead_code)]
    id: Option<serde_json::Value>,
    #[serde(rename = "type", default = "default_kind")]
    kind: String,
    #[serde(default = "default_description")]
    description: String,
    #[serde(default)]
    params: BTreeMap<String, serde_json::Value>,
}

fn default_kind() -> String {
    "research".to_string()
}

fn default_description() -> String {
    "Do work".to_string()
}

/// Four-task plan used when the model cannot produce one.
pub fn default_plan(inputs: &RunInputs) -> Vec<TaskDraft> {
    vec![
        TaskDraft::new(
            TaskKind::Research,
            format!("Research key facts about {}", inputs.topic),
        ),
        TaskDraft::new(TaskKind::Write, "Write the Introduction"),
        TaskDraft::new(TaskKind::Write, "Write the Main Body"),
        TaskDraft::new(TaskKind::Write, "Write the Conclusion"),
    ]
}

/// [`Planner`] backed by a content transform.
pub struct LlmPlanner {
    transform: Arc<dyn ContentTransform>,
}

impl LlmPlanner {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }

    fn prompt(inputs: &RunInputs) -> String {
        format!(
            "You are an expert content strategist. Create a JSON execution plan for an article.\n\
             \n\
             The plan uses exactly two task types:\n\
             1. \"research\": investigating keywords, competitors, or specific subtopics.\n\
             2. \"write\": drafting one section of the article.\n\
             \n\
             Rules:\n\
             - Start with broad research.\n\
             - Break the writing into sections (introduction, body points, conclusion).\n\
             - Keep a logical flow.\n\
             - The finished article should be about {word_count} words.\n\
             \n\
             Return ONLY a JSON array, no prose, in this shape:\n\
             [{{\"id\": 1, \"type\": \"research\", \"description\": \"Research the main topic...\"}},\n \
             {{\"id\": 2, \"type\": \"write\", \"description\": \"Write the introduction...\"}}]\n\
             \n\
             Topic: {topic}\n\
             Language: {language}",
            word_count = inputs.word_count,
            topic = inputs.topic,
            language = inputs.language,
        )
    }
}

/// Converts proposed items into drafts, dropping anything unusable.
fn drafts_from(items: Vec<serde_json::Value>) -> Vec<TaskDraft> {
    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<ProposedTask>(item) {
            Ok(task) => Some(task),
            Err(e) => {
                debug!(error = %e, "dropping malformed plan item");
                None
            }
        })
        .filter_map(|task| {
            let Some(kind) = TaskKind::from_label(&task.kind) else {
                warn!(kind = %task.kind, "dropping plan item with unknown task kind");
                return None;
            };
            Some(TaskDraft {
                kind,
                description: task.description,
                params: task.params,
            })
        })
        .collect()
}

#[async_trait]
impl Planner for LlmPlanner {
    async fn plan(&self, inputs: &RunInputs) -> Result<Vec<TaskDraft>, PipelineError> {
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Planner, Self::prompt(inputs)))
            .await?;
        let items: Vec<serde_json::Value> = parse_json(STAGE, &answer)?;
        let drafts = drafts_from(items);
        if drafts.is_empty() {
            return Err(PipelineError::validation(STAGE, "plan contains no usable tasks"));
        }
        Ok(drafts)
    }

    fn fallback(&self, inputs: &RunInputs) -> Vec<TaskDraft> {
        default_plan(inputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::{JobRequest, Plan};

    fn inputs() -> RunInputs {
        JobRequest::new("green tea").validate().unwrap()
    }

    #[tokio::test]
    async fn parses_fenced_plan_and_drops_unknown_kinds() {
        let transform = ScriptedTransform::new().respond(
            ModelRole::Planner,
            "Here you go:\n```json\n[\n  {\"id\": 7, \"type\": \"research\", \"description\": \"Find sources\"},\n  {\"id\": 8, \"type\": \"publish\", \"description\": \"Ship it\"},\n  {\"id\": 9, \"type\": \"Write\", \"description\": \"Intro\"}\n]\n```",
        );
        let planner = LlmPlanner::new(Arc::new(transform));

        let drafts = planner.plan(&inputs()).await.unwrap();
        let plan = Plan::from_drafts(drafts);

        assert_eq!(plan.len(), 2);
        assert_eq!(plan.get(0).unwrap().kind, TaskKind::Research);
        assert_eq!(plan.get(1).unwrap().kind, TaskKind::Write);
        assert_eq!(plan.get(1).unwrap().id.as_u64(), 2);
    }

    #[tokio::test]
    async fn missing_fields_take_defaults() {
        let transform =
            ScriptedTransform::new().respond(ModelRole::Planner, r#"[{"id": 1}]"#);
        let planner = LlmPlanner::new(Arc::new(transform));

        let drafts = planner.plan(&inputs()).await.unwrap();

        assert_eq!(drafts.len(), 1);
        assert_eq!(drafts[0].kind, TaskKind::Research);
        assert_eq!(drafts[0].description, "Do work");
    }

    #[tokio::test]
    async fn plan_with_only_unknown_kinds_is_an_error() {
        let transform = ScriptedTransform::new()
            .respond(ModelRole::Planner, r#"[{"type": "publish", "description": "x"}]"#);
        let planner = LlmPlanner::new(Arc::new(transform));

        assert!(matches!(
            planner.plan(&inputs()).await,
            Err(PipelineError::ValidationFailure { .. })
        ));
    }

    #[test]
    fn fallback_is_research_then_three_writes() {
        let planner = LlmPlanner::new(Arc::new(ScriptedTransform::new()));
        let drafts = planner.fallback(&inputs());

        let kinds: Vec<TaskKind> = drafts.iter().map(|d| d.kind).collect();
        assert_eq!(
            kinds,
            vec![TaskKind::Research, TaskKind::Write, TaskKind::Write, TaskKind::Write]
        );
        assert_eq!(drafts[0].description, "Research key facts about green tea");
    }
}
