//! Model-backed humanizer critic and refiner.
//!
//! The critic scores how mechanical a draft reads and lists the artifacts it
//! found; the refiner rewrites the draft against that critique. Sequencing
//! and the exit rule live in [`crate::refine_loop`].

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    parse_json, strip_preamble, ContentTransform, HumanizerCritic, HumanizerCritique,
    HumanizerRefiner, ModelRole, PipelineError, TransformRequest,
};
use tracing::debug;

use super::head;

const DRAFT_EXCERPT_CHARS: usize = 10_000;

pub struct LlmHumanizerCritic {
    transform: Arc<dyn ContentTransform>,
}

impl LlmHumanizerCritic {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl HumanizerCritic for LlmHumanizerCritic {
    async fn critique(&self, draft: &str) -> Result<HumanizerCritique, PipelineError> {
        let prompt = format!(
            "Analyze the input draft solely for AI artifacts. Do not check factual accuracy.\n\n\
             Draft:\n{excerpt}\n\n\
             Identify:\n\
             1. Hedging: 'potential', 'arguably', 'it is important to note'.\n\
             2. Connector overuse: 'Moreover', 'Furthermore', 'In conclusion'.\n\
             3. Nominalization: actions turned into nouns ('made a decision' instead of 'decided').\n\
             4. Sensory vacuum: sections that are purely abstract with no concrete detail.\n\
             5. Burstiness score: sentence length variety from 1 (uniform) to 10 (jagged, human).\n\
             6. AI artifact score: overall from 1 (very human) to 10 (very robotic).\n\n\
             Return ONLY valid JSON in this shape:\n\
             {{\"hedging_issues\": [\"...\"], \"connector_issues\": [\"...\"], \
             \"nominalization_issues\": [\"...\"], \"sensory_vacuum_issues\": [\"...\"], \
             \"burstiness_score\": 5, \"ai_artifact_score\": 8, \"general_feedback\": \"...\"}}",
            excerpt = head(draft, DRAFT_EXCERPT_CHARS),
        );
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Optimizer, prompt))
            .await?;
        let critique: HumanizerCritique = parse_json("humanizer_critic", &answer)?;
        debug!(score = %critique.ai_artifact_score, "draft critiqued");
        Ok(critique)
    }
}

pub struct LlmHumanizerRefiner {
    transform: Arc<dyn ContentTransform>,
}

impl LlmHumanizerRefiner {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl HumanizerRefiner for LlmHumanizerRefiner {
    async fn refine(
        &self,
        draft: &str,
        critique: &HumanizerCritique,
    ) -> Result<String, PipelineError> {
        let critique_json = serde_json::to_string_pretty(critique)
            .map_err(|e| PipelineError::validation("humanizer_refiner", e))?;
        let prompt = format!(
            "You are a refiner. Your goal is to remove the machine voice from this article.\n\n\
             Input draft:\n{draft}\n\n\
             Critique of AI artifacts:\n{critique_json}\n\n\
             Directives:\n\
             1. Drop the hedges. Be direct.\n\
             2. Remove most transition words such as 'Moreover', 'Additionally' and 'However'.\n\
             3. Replace stock words like 'delve', 'tapestry' or 'game-changer' with specific vocabulary.\n\
             4. Add concrete visual or tactile detail to the examples.\n\
             5. Vary sentence length: mix fragments with long compound sentences.\n\
             6. Turn nominalizations back into active verbs.\n\n\
             Output the completely rewritten article and nothing else. Keep the Markdown formatting."
        );
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Optimizer, prompt))
            .await?;
        let rewritten = strip_preamble(&answer);
        if rewritten.is_empty() {
            return Err(PipelineError::validation("humanizer_refiner", "rewrite is empty"));
        }
        Ok(rewritten.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::ArtifactScore;

    #[tokio::test]
    async fn critic_parses_fenced_critique() {
        let transform = ScriptedTransform::new().respond(
            ModelRole::Optimizer,
            "```json\n{\"hedging_issues\": [\"arguably\"], \"connector_issues\": [], \
             \"nominalization_issues\": [], \"sensory_vacuum_issues\": [], \
             \"burstiness_score\": 4, \"ai_artifact_score\": 7, \"general_feedback\": \"stiff\"}\n```",
        );
        let critic = LlmHumanizerCritic::new(Arc::new(transform));

        let critique = critic.critique("Arguably, tea is good.").await.unwrap();

        assert_eq!(critique.ai_artifact_score, ArtifactScore::new(7).unwrap());
        assert_eq!(critique.hedging_issues, vec!["arguably".to_string()]);
        assert_eq!(critique.burstiness_score, Some(4));
    }

    #[tokio::test]
    async fn critic_rejects_unknown_fields() {
        let transform = ScriptedTransform::new().respond(
            ModelRole::Optimizer,
            r#"{"ai_artifact_score": 5, "mood": "grumpy"}"#,
        );
        let critic = LlmHumanizerCritic::new(Arc::new(transform));

        assert!(matches!(
            critic.critique("text").await,
            Err(PipelineError::ValidationFailure { .. })
        ));
    }

    #[tokio::test]
    async fn refiner_strips_preamble() {
        let transform = ScriptedTransform::new()
            .respond(ModelRole::Optimizer, "Here is the rewritten article:\nTea wakes you up.");
        let refiner = LlmHumanizerRefiner::new(Arc::new(transform));
        let critique = HumanizerCritique::synthetic(ArtifactScore::new(6).unwrap(), "flat");

        let rewritten = refiner.refine("Tea is good.", &critique).await.unwrap();

        assert_eq!(rewritten, "Tea wakes you up.");
    }
}
