//! Evaluate stage: three independent critics, then one optimizing rewrite.
//!
//! The critics are fan-out branches; each returns its critique text as the
//! branch output and writes nothing. The optimizer runs after the fan-in
//! with the critiques joined in lens order.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    strip_preamble, ContentTransform, DocumentStore, ModelRole, PipelineError, Stage,
    StageContext, StageOutcome, TransformRequest,
};
use tracing::debug;

use super::head;

const DRAFT_EXCERPT_CHARS: usize = 8_000;

/// What a critic looks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CriticLens {
    StructureAndSeo,
    EngagementAndTone,
    LogicAndAccuracy,
}

impl CriticLens {
    /// Lenses in the order their critiques are joined.
    pub const ALL: [CriticLens; 3] = [
        CriticLens::StructureAndSeo,
        CriticLens::EngagementAndTone,
        CriticLens::LogicAndAccuracy,
    ];

    pub fn label(self) -> &'static str {
        match self {
            CriticLens::StructureAndSeo => "Structure",
            CriticLens::EngagementAndTone => "Engagement",
            CriticLens::LogicAndAccuracy => "Logic",
        }
    }

    fn stage_name(self) -> &'static str {
        match self {
            CriticLens::StructureAndSeo => "critic_structure",
            CriticLens::EngagementAndTone => "critic_engagement",
            CriticLens::LogicAndAccuracy => "critic_logic",
        }
    }

    fn role(self) -> ModelRole {
        match self {
            CriticLens::StructureAndSeo => ModelRole::StructureCritic,
            CriticLens::EngagementAndTone => ModelRole::EngagementCritic,
            CriticLens::LogicAndAccuracy => ModelRole::LogicCritic,
        }
    }

    fn brief(self) -> &'static str {
        match self {
            CriticLens::StructureAndSeo => {
                "You are an expert SEO and content structure critic.\n\
                 Focus on:\n\
                 1. Heading structure (H1, H2, H3)\n\
                 2. Keyword usage and placement\n\
                 3. Internal and external linking opportunities\n\
                 4. Formatting (bullet points, readability)"
            }
            CriticLens::EngagementAndTone => {
                "You are an expert content editor focusing on reader engagement.\n\
                 Focus on:\n\
                 1. Tone and voice (is it human, engaging, appropriate?)\n\
                 2. Flow and transitions between sections\n\
                 3. Storytelling elements\n\
                 4. Strength of the hook and the conclusion"
            }
            CriticLens::LogicAndAccuracy => {
                "You are an expert fact-checker and logician.\n\
                 Focus on:\n\
                 1. Logical consistency of arguments\n\
                 2. Clarity of explanations\n\
                 3. Potential factual inaccuracies\n\
                 4. Depth of coverage"
            }
        }
    }
}

/// One critic branch.
pub struct DraftCritic {
    lens: CriticLens,
    transform: Arc<dyn ContentTransform>,
}

impl DraftCritic {
    pub fn new(lens: CriticLens, transform: Arc<dyn ContentTransform>) -> Self {
        Self { lens, transform }
    }

    /// One critic per lens, in join order.
    pub fn panel(transform: Arc<dyn ContentTransform>) -> Vec<Self> {
        CriticLens::ALL
            .into_iter()
            .map(|lens| Self::new(lens, Arc::clone(&transform)))
            .collect()
    }
}

#[async_trait]
impl Stage for DraftCritic {
    type Output = String;

    fn name(&self) -> &str {
        self.lens.stage_name()
    }

    async fn run(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
    ) -> Result<String, PipelineError> {
        let label = self.lens.label();
        let draft = store.read_or_empty(&ctx.draft_name);
        if draft.trim().is_empty() {
            return Ok(format!("{label}: No draft to critique."));
        }
        let prompt = format!(
            "{brief}\n\nAnalyze the following blog post draft.\n\nDraft:\n{excerpt}\n\n\
             Provide a structured critique and concrete suggestions for improvement.\n\
             Label your response \"CRITIC: {upper}\".",
            brief = self.lens.brief(),
            excerpt = head(draft, DRAFT_EXCERPT_CHARS),
            upper = label.to_uppercase(),
        );
        match self
            .transform
            .transform(TransformRequest::new(self.lens.role(), prompt))
            .await
        {
            Ok(critique) => Ok(critique),
            Err(e) => Ok(format!("{label} error: {e}")),
        }
    }

    fn fallback(&self, _snapshot: &DocumentStore, _ctx: &StageContext) -> StageOutcome<String> {
        StageOutcome::without_writes(format!("{} error: critique unavailable", self.lens.label()))
    }
}

/// Rewrites the whole draft against the panel's critiques.
pub struct DraftOptimizer {
    transform: Arc<dyn ContentTransform>,
}

impl DraftOptimizer {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }

    /// Replaces the draft with the optimized rewrite.
    ///
    /// Returns `Ok(false)` without calling the model when there is no draft.
    pub async fn optimize(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
        critiques: &[String],
    ) -> Result<bool, PipelineError> {
        let draft = store.read_or_empty(&ctx.draft_name);
        if draft.trim().is_empty() {
            return Ok(false);
        }
        let prompt = format!(
            "You are a master editor. Rewrite and optimize the following blog post based on \
             the critiques provided by three expert reviewers.\n\n\
             Original draft:\n{draft}\n\n\
             Critiques:\n{critiques}\n\n\
             Instructions:\n\
             1. Read the critiques carefully.\n\
             2. Synthesize the feedback.\n\
             3. Rewrite the article to address the issues raised.\n\
             4. Keep the Markdown format.\n\
             5. Output the complete, polished article.\n\
             6. Do not include the critiques in the output.",
            critiques = critiques.join("\n\n"),
        );
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Optimizer, prompt))
            .await?;
        let rewritten = strip_preamble(&answer);
        if rewritten.is_empty() {
            return Err(PipelineError::validation("optimizer", "rewrite is empty"));
        }
        debug!(bytes = rewritten.len(), "draft optimized");
        store.write(ctx.draft_name.clone(), rewritten);
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::{names, JobRequest};

    fn ctx() -> StageContext {
        StageContext::new(JobRequest::new("tea").validate().unwrap(), names::DRAFT)
    }

    #[tokio::test]
    async fn empty_draft_yields_labelled_notice() {
        let critic = DraftCritic::new(CriticLens::LogicAndAccuracy, Arc::new(ScriptedTransform::new()));
        let critique = critic.run(&mut DocumentStore::new(), &ctx()).await.unwrap();
        assert_eq!(critique, "Logic: No draft to critique.");
    }

    #[tokio::test]
    async fn model_failure_becomes_error_critique() {
        let transform = ScriptedTransform::new().fail(ModelRole::StructureCritic, "boom");
        let critic = DraftCritic::new(CriticLens::StructureAndSeo, Arc::new(transform));
        let mut store = DocumentStore::new();
        store.write(names::DRAFT, "Some text.");

        let critique = critic.run(&mut store, &ctx()).await.unwrap();

        assert!(critique.starts_with("Structure error:"));
        assert!(critique.contains("boom"));
    }

    #[tokio::test]
    async fn optimizer_replaces_draft_with_rewrite() {
        let transform = Arc::new(
            ScriptedTransform::new().respond(ModelRole::Optimizer, "Sure! Here it is\nBetter text."),
        );
        let optimizer = DraftOptimizer::new(transform.clone());
        let mut store = DocumentStore::new();
        store.write(names::DRAFT, "Plain text.");

        let changed = optimizer
            .optimize(&mut store, &ctx(), &["a".to_string(), "b".to_string()])
            .await
            .unwrap();

        assert!(changed);
        assert_eq!(store.read(names::DRAFT).unwrap(), "Better text.");
        assert!(transform.prompts(ModelRole::Optimizer)[0].contains("a\n\nb"));
    }

    #[tokio::test]
    async fn optimizer_skips_missing_draft() {
        let transform = Arc::new(ScriptedTransform::new());
        let optimizer = DraftOptimizer::new(transform.clone());
        let mut store = DocumentStore::new();

        assert!(!optimizer.optimize(&mut store, &ctx(), &[]).await.unwrap());
        assert_eq!(transform.calls(), 0);
    }
}
