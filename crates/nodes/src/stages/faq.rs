//! FAQ branch of SEO analysis.

use std::sync::Arc;

use async_trait::async_trait;
use pipeline::{
    names, parse_json, ContentTransform, DocumentStore, FaqItem, ModelRole, PipelineError, Stage,
    StageContext, StageOutcome, TransformRequest,
};
use tracing::info;

use super::{head, value_text, SeoFinding};

const STAGE: &str = "seo_faq";
const RESEARCH_EXCERPT_CHARS: usize = 4_000;
const DRAFT_EXCERPT_CHARS: usize = 3_000;

/// Generic questions used when generation fails.
pub fn fallback_faqs() -> Vec<FaqItem> {
    vec![
        FaqItem::new(
            "What are the main benefits?",
            "The main benefits include improved efficiency, better outcomes, and time savings.",
        ),
        FaqItem::new(
            "How do I get started?",
            "Start by understanding the basics, then gradually put the key ideas from this article into practice.",
        ),
        FaqItem::new(
            "Is this suitable for beginners?",
            "Yes. The concepts covered are accessible to beginners while still useful to experienced practitioners.",
        ),
    ]
}

/// Renders the FAQ section appended to the final article.
pub fn format_faq_section(faqs: &[FaqItem]) -> String {
    let mut section = String::from("\n\n---\n\n## Frequently Asked Questions\n\n");
    for faq in faqs {
        section.push_str(&format!("### {}\n\n{}\n\n", faq.question, faq.answer));
    }
    section
}

/// Keeps only objects that carry both a question and an answer.
fn validate(items: Vec<serde_json::Value>) -> Vec<FaqItem> {
    items
        .iter()
        .filter_map(|item| {
            let question = item.get("question")?;
            let answer = item.get("answer")?;
            Some(FaqItem::new(value_text(question), value_text(answer)))
        })
        .collect()
}

fn write_section(store: &mut DocumentStore, faqs: &[FaqItem]) {
    if !faqs.is_empty() {
        store.write(names::FAQ_SECTION, format_faq_section(faqs));
    }
}

pub struct FaqStage {
    transform: Arc<dyn ContentTransform>,
}

impl FaqStage {
    pub fn new(transform: Arc<dyn ContentTransform>) -> Self {
        Self { transform }
    }
}

#[async_trait]
impl Stage for FaqStage {
    type Output = SeoFinding;

    fn name(&self) -> &str {
        STAGE
    }

    async fn run(
        &self,
        store: &mut DocumentStore,
        ctx: &StageContext,
    ) -> Result<SeoFinding, PipelineError> {
        let research: Vec<&str> = store
            .with_prefix(names::RESEARCH_PREFIX)
            .take(3)
            .map(|doc| doc.content.as_str())
            .collect();
        let research = research.join("\n");
        let prompt = format!(
            "You are an FAQ generator. Analyze the research and article below, then generate \
             5-7 frequently asked questions with concise answers in {language}.\n\n\
             RESEARCH SUMMARIES:\n{research}\n\n\
             ARTICLE DRAFT (excerpt):\n{draft}\n\n\
             RULES:\n\
             1. Questions should be what real users would search for.\n\
             2. Answers should be 2-3 sentences, factual and helpful.\n\
             3. Cover different aspects of the topic.\n\
             4. Include how, what, why and when questions.\n\
             5. Make answers conversational.\n\n\
             Return ONLY a JSON array: [{{\"question\": \"What is X?\", \"answer\": \"X is...\"}}]",
            language = ctx.inputs.language,
            research = head(&research, RESEARCH_EXCERPT_CHARS),
            draft = head(store.read_or_empty(&ctx.draft_name), DRAFT_EXCERPT_CHARS),
        );
        let answer = self
            .transform
            .transform(TransformRequest::new(ModelRole::Writer, prompt))
            .await?;
        let items: Vec<serde_json::Value> = parse_json(STAGE, &answer)?;
        let faqs = validate(items);
        info!(count = faqs.len(), "FAQ items generated");
        write_section(store, &faqs);
        Ok(SeoFinding::Faq(faqs))
    }

    fn fallback(&self, snapshot: &DocumentStore, _ctx: &StageContext) -> StageOutcome<SeoFinding> {
        let faqs = fallback_faqs();
        let mut work = snapshot.clone();
        write_section(&mut work, &faqs);
        StageOutcome {
            delta: work.diff(snapshot),
            output: SeoFinding::Faq(faqs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTransform;
    use pipeline::JobRequest;

    fn ctx() -> StageContext {
        StageContext::new(JobRequest::new("tea").validate().unwrap(), names::DRAFT)
    }

    #[tokio::test]
    async fn keeps_only_complete_items() {
        let transform = ScriptedTransform::new().respond(
            ModelRole::Writer,
            r#"[{"question": "What is tea?", "answer": "A drink."}, {"question": "Orphan?"}, {"question": "Year?", "answer": 1610}]"#,
        );
        let stage = FaqStage::new(Arc::new(transform));
        let mut store = DocumentStore::new();

        let finding = stage.run(&mut store, &ctx()).await.unwrap();

        let SeoFinding::Faq(faqs) = finding else {
            panic!("expected FAQ finding");
        };
        assert_eq!(
            faqs,
            vec![FaqItem::new("What is tea?", "A drink."), FaqItem::new("Year?", "1610")]
        );
        let section = store.read(names::FAQ_SECTION).unwrap();
        assert!(section.starts_with("\n\n---\n\n## Frequently Asked Questions\n\n"));
        assert!(section.contains("### What is tea?\n\nA drink.\n\n"));
    }

    #[tokio::test]
    async fn empty_list_writes_no_section() {
        let transform = ScriptedTransform::new().respond(ModelRole::Writer, "[]");
        let stage = FaqStage::new(Arc::new(transform));
        let mut store = DocumentStore::new();

        let finding = stage.run(&mut store, &ctx()).await.unwrap();

        assert_eq!(finding, SeoFinding::Faq(Vec::new()));
        assert!(!store.exists(names::FAQ_SECTION));
    }

    #[test]
    fn fallback_writes_generic_section() {
        let stage = FaqStage::new(Arc::new(ScriptedTransform::new()));
        let snapshot = DocumentStore::new();

        let outcome = stage.fallback(&snapshot, &ctx());

        assert_eq!(outcome.output, SeoFinding::Faq(fallback_faqs()));
        assert_eq!(outcome.delta.names().collect::<Vec<_>>(), vec![names::FAQ_SECTION]);
    }
}
