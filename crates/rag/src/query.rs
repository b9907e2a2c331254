use std::collections::BTreeSet;

use milky_llm::GenerateResponse;
use tracing::info;

use crate::backend::GenerationService;
use crate::error::{PipelineError, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You are Milky, an AI assistant that answers questions from the documents in the attached file search store.

Guidelines:
1. Treat the retrieved documents as the primary source and explain them as accurately as you can.
2. Keep what the documents say clearly apart from your own inference.
3. If the documents do not cover the question, say plainly that it could not be confirmed within the documents instead of guessing.
4. Be friendly and a little playful in tone, but never at the expense of accuracy.

When an answer touches on legal or regulatory interpretation, add one short line noting that the final decision should be confirmed with the responsible team or an expert.
";

pub const CITATION_HEADER: &str = "**📚 Referenced documents**";

pub struct QueryPipeline<G> {
    generator: G,
    system_prompt: String,
}

impl<G: GenerationService> QueryPipeline<G> {
    pub fn new(generator: G) -> Self {
        Self {
            generator,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Answers `question` from the indexed store and appends the documents
    /// the answer was grounded on.
    pub async fn ask(&self, question: &str) -> Result<String> {
        let question = question.trim();
        if question.is_empty() {
            return Err(PipelineError::InvalidInput(
                "question must not be empty".to_string(),
            ));
        }
        let response = self
            .generator
            .generate(question, &self.system_prompt)
            .await
            .map_err(PipelineError::GenerationFailed)?;
        let answer = response.text().unwrap_or_default();
        let citations = collect_citations(&response);
        info!(
            question_chars = question.chars().count(),
            citations = citations.len(),
            "question answered"
        );
        Ok(render_answer(&answer, &citations))
    }
}

/// Titles (or document names when untitled) of every retrieved context
/// across all candidates, deduplicated and sorted.
pub fn collect_citations(response: &GenerateResponse) -> BTreeSet<String> {
    response
        .candidates
        .iter()
        .filter_map(|candidate| candidate.grounding_metadata.as_ref())
        .flat_map(|metadata| metadata.grounding_chunks.iter())
        .filter_map(|chunk| chunk.retrieved_context.as_ref())
        .filter_map(|context| {
            non_empty(context.title.as_deref()).or_else(|| non_empty(context.document_name.as_deref()))
        })
        .map(str::to_string)
        .collect()
}

pub fn render_answer(answer: &str, citations: &BTreeSet<String>) -> String {
    if citations.is_empty() {
        return answer.trim().to_string();
    }
    let mut rendered = answer.trim().to_string();
    rendered.push_str("\n\n");
    rendered.push_str(CITATION_HEADER);
    rendered.push('\n');
    for name in citations {
        rendered.push_str("- ");
        rendered.push_str(name);
        rendered.push('\n');
    }
    rendered.trim().to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn response(value: serde_json::Value) -> GenerateResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn citations_are_deduplicated_across_candidates_and_sorted() {
        let resp = response(json!({
            "candidates": [
                {
                    "groundingMetadata": { "groundingChunks": [
                        { "retrievedContext": { "title": "휴가 규정.pdf" } },
                        { "retrievedContext": { "title": "benefits.pdf" } },
                        { "retrievedContext": { "title": "benefits.pdf" } }
                    ]}
                },
                {
                    "groundingMetadata": { "groundingChunks": [
                        { "retrievedContext": { "title": "benefits.pdf" } },
                        { "retrievedContext": { "documentName": "fileSearchStores/s/documents/x" } }
                    ]}
                }
            ]
        }));
        let citations: Vec<_> = collect_citations(&resp).into_iter().collect();
        assert_eq!(
            citations,
            vec!["benefits.pdf", "fileSearchStores/s/documents/x", "휴가 규정.pdf"]
        );
    }

    #[test]
    fn empty_title_falls_back_to_document_name() {
        let resp = response(json!({
            "candidates": [{ "groundingMetadata": { "groundingChunks": [
                { "retrievedContext": { "title": "", "documentName": "doc-7" } },
                { "retrievedContext": { "title": "", "documentName": "" } },
                { "web": { "uri": "https://example.com" } }
            ]}}]
        }));
        let citations: Vec<_> = collect_citations(&resp).into_iter().collect();
        assert_eq!(citations, vec!["doc-7"]);
    }

    #[test]
    fn render_without_citations_only_trims() {
        assert_eq!(render_answer("  Hello.\n", &BTreeSet::new()), "Hello.");
    }

    #[test]
    fn render_appends_block_once() {
        let citations: BTreeSet<String> =
            ["b.pdf", "a.pdf"].iter().map(|s| s.to_string()).collect();
        let rendered = render_answer("Answer.  ", &citations);
        assert_eq!(
            rendered,
            "Answer.\n\n**📚 Referenced documents**\n- a.pdf\n- b.pdf"
        );
        assert_eq!(rendered.matches(CITATION_HEADER).count(), 1);
    }
}
