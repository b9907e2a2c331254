use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::GeminiClient;

#[derive(Debug, Clone, Default)]
pub struct GenerateRequest {
    pub prompt: String,
    pub system_instruction: Option<String>,
    /// Stores bound through the `fileSearch` tool. Empty means no retrieval.
    pub file_search_stores: Vec<String>,
}

impl GenerateRequest {
    fn to_payload(&self) -> Value {
        let mut payload = json!({
            "contents": [
                {
                    "role": "user",
                    "parts": [ { "text": self.prompt } ]
                }
            ]
        });
        if let Some(system) = &self.system_instruction {
            payload["systemInstruction"] = json!({ "parts": [ { "text": system } ] });
        }
        if !self.file_search_stores.is_empty() {
            payload["tools"] = json!([
                { "fileSearch": { "fileSearchStoreNames": self.file_search_stores } }
            ]);
        }
        payload
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

impl GenerateResponse {
    /// Concatenated text parts of the first candidate, skipping thought
    /// summaries. `None` when the candidate carries no text at all.
    pub fn text(&self) -> Option<String> {
        let parts = &self.candidates.first()?.content.as_ref()?.parts;
        let mut text = String::new();
        let mut found = false;
        for part in parts.iter().filter(|part| !part.thought.unwrap_or(false)) {
            if let Some(chunk) = &part.text {
                text.push_str(chunk);
                found = true;
            }
        }
        found.then_some(text)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
    #[serde(default)]
    pub grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub thought: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingMetadata {
    #[serde(default)]
    pub grounding_chunks: Vec<GroundingChunk>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroundingChunk {
    #[serde(default)]
    pub retrieved_context: Option<RetrievedContext>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetrievedContext {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub document_name: Option<String>,
}

impl GeminiClient {
    pub async fn generate_content(
        &self,
        model: &str,
        request: &GenerateRequest,
    ) -> Result<GenerateResponse> {
        let model = model.trim_start_matches("models/");
        let http_request = self
            .http
            .post(self.api_url(&format!("models/{model}:generateContent")))
            .json(&request.to_payload());
        self.execute_json(http_request, "generate content").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_binds_store_and_system_instruction() {
        let request = GenerateRequest {
            prompt: "연차 규정 알려줘".to_string(),
            system_instruction: Some("be brief".to_string()),
            file_search_stores: vec!["fileSearchStores/s1".to_string()],
        };
        let payload = request.to_payload();
        assert_eq!(payload["contents"][0]["parts"][0]["text"], "연차 규정 알려줘");
        assert_eq!(payload["systemInstruction"]["parts"][0]["text"], "be brief");
        assert_eq!(
            payload["tools"][0]["fileSearch"]["fileSearchStoreNames"][0],
            "fileSearchStores/s1"
        );
    }

    #[test]
    fn payload_without_store_has_no_tools() {
        let request = GenerateRequest {
            prompt: "hi".to_string(),
            ..Default::default()
        };
        let payload = request.to_payload();
        assert!(payload.get("tools").is_none());
        assert!(payload.get("systemInstruction").is_none());
    }

    #[test]
    fn text_joins_parts_and_skips_thoughts() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": {
                    "role": "model",
                    "parts": [
                        { "text": "thinking...", "thought": true },
                        { "text": "Hello, " },
                        { "text": "world." }
                    ]
                }
            }]
        }))
        .unwrap();
        assert_eq!(response.text().as_deref(), Some("Hello, world."));
    }

    #[test]
    fn text_is_none_without_candidates() {
        let response: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert_eq!(response.text(), None);
    }

    #[test]
    fn grounding_chunks_deserialize() {
        let response: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{
                "content": { "parts": [ { "text": "ok" } ] },
                "groundingMetadata": {
                    "groundingChunks": [
                        { "retrievedContext": { "title": "manual.pdf", "text": "..." } },
                        { "web": { "uri": "https://example.com" } }
                    ]
                }
            }]
        }))
        .unwrap();
        let chunks = &response.candidates[0]
            .grounding_metadata
            .as_ref()
            .unwrap()
            .grounding_chunks;
        assert_eq!(chunks.len(), 2);
        assert_eq!(
            chunks[0].retrieved_context.as_ref().unwrap().title.as_deref(),
            Some("manual.pdf")
        );
        assert!(chunks[1].retrieved_context.is_none());
    }
}
