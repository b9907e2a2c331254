use std::path::Path;

use anyhow::Result;
use async_trait::async_trait;
use milky_llm::{GeminiClient, GenerateRequest, GenerateResponse, Operation, RemoteDocument};

use crate::backend::{GenerationService, IndexingService};

/// Both remote services backed by one Gemini file search store.
#[derive(Clone)]
pub struct GeminiFileSearch {
    client: GeminiClient,
    store_name: String,
    model: String,
}

impl GeminiFileSearch {
    pub fn new(client: GeminiClient, store_name: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client,
            store_name: store_name.into(),
            model: model.into(),
        }
    }

    pub fn store_name(&self) -> &str {
        &self.store_name
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl IndexingService for GeminiFileSearch {
    async fn upload_document(&self, path: &Path, display_name: &str) -> Result<Operation> {
        self.client
            .upload_to_store(&self.store_name, path, display_name)
            .await
    }

    async fn poll_operation(&self, operation: &Operation) -> Result<Operation> {
        self.client.get_operation(&operation.name).await
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        self.client.list_documents(&self.store_name).await
    }

    async fn delete_document(&self, name: &str) -> Result<()> {
        self.client.delete_document(name, true).await
    }
}

#[async_trait]
impl GenerationService for GeminiFileSearch {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<GenerateResponse> {
        let request = GenerateRequest {
            prompt: prompt.to_string(),
            system_instruction: Some(system_instruction.to_string()),
            file_search_stores: vec![self.store_name.clone()],
        };
        self.client.generate_content(&self.model, &request).await
    }
}
