//! Write stage: drafts one section and appends it to the working draft.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    names, strip_preamble, ContentTransform, DocumentStore, ModelRole, PipelineError, Stage,
    StageContext, StageOutcome, TransformRequest,
};
use tracing::debug;

use super::tail;

const STAGE: &str = "write";
const DRAFT_TAIL_CHARS: usize = 2_000;

/// Concatenates every research summary into a prompt context block.
pub(crate) fn research_context(store: &DocumentStore) -> String {
    let context: String = store
        .with_prefix(names::RESEARCH_PREFIX)
        .map(|doc| {
            let url = doc.metadata.get("url").map(String::as_str).unwrap_or("unknown");
            format!("\n--- Source: {url} ---\n{}\n", doc.content)
        })
        .collect();
    if context.is_empty() {
        "No research available.".to_string()
    } else {
        context
    }
}

/// Writes the current task's section and appends it to the draft.
pub struct WriteStage {
    transform: Arc<dyn ContentTransform>,
}

impl WriteStage {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl Stage for WriteStage {
    type Output = ();

    fn name(&self) -> &str {
        STAGE
    }

    async fn run(&self, store: &mut DocumentStore, ctx: &StageContext) -> Result<(), PipelineError> {
        let section = ctx
            .task
            .as_ref()
            .map(|task| task.description.as_str())
            .unwrap_or("Write the next section");
        let draft = store.read_or_empty(&ctx.draft_name).to_string();
        let draft_tail = if draft.is_empty() {
            "(Start of Article)"
        } else {
            tail(&draft, DRAFT_TAIL_CHARS)
        };

        let prompt = format!(
            "You are an expert SEO article writer writing in {language}.\n\n\
             Task: {section}\n\n\
             Research context:\n{context}\n\n\
             Current draft (end):\n{draft_tail}\n\n\
             Instructions:\n\
             - Write ONLY the article content for this section.\n\
             - Do not chat (\"Sure, here is the text...\"). Just write the text.\n\
             - Use Markdown formatting (H2, H3, bold, bullet points).\n\
             - If this is the introduction, include the primary keywords naturally.\n\
             - Do not repeat what has already been written.\n\
             - Add internal link placeholders like [Internal Link: Anchor Text -> Topic] where relevant.",
            language = ctx.inputs.language,
            context = research_context(store),
        );

        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Writer, prompt))
            .await?;
        let section_text = strip_preamble(&answer);
        debug!(section, bytes = section_text.len(), "section drafted");

        store.write(ctx.draft_name.clone(), format!("{draft}\n\n{section_text}"));
        Ok(())
    }

    fn fallback(&self, _snapshot: &DocumentStore, _ctx: &StageContext) -> StageOutcome<()> {
        StageOutcome::without_writes(())
    }
}
