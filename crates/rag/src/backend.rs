use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use milky_llm::{GenerateResponse, Operation, RemoteDocument};

/// Remote side of the document lifecycle: submit, poll, list, delete.
#[async_trait]
pub trait IndexingService: Send + Sync {
    /// Submit a local file for indexing under `display_name`.
    async fn upload_document(&self, path: &Path, display_name: &str) -> Result<Operation>;

    /// Refresh an operation returned by `upload_document`.
    async fn poll_operation(&self, operation: &Operation) -> Result<Operation>;

    /// Every document currently in the store.
    async fn list_documents(&self) -> Result<Vec<RemoteDocument>>;

    /// Force-delete a document and its indexed chunks.
    async fn delete_document(&self, name: &str) -> Result<()>;
}

/// Answer generation grounded on the indexed store.
#[async_trait]
pub trait GenerationService: Send + Sync {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<GenerateResponse>;
}

#[async_trait]
impl<T: IndexingService + ?Sized> IndexingService for Arc<T> {
    async fn upload_document(&self, path: &Path, display_name: &str) -> Result<Operation> {
        (**self).upload_document(path, display_name).await
    }

    async fn poll_operation(&self, operation: &Operation) -> Result<Operation> {
        (**self).poll_operation(operation).await
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        (**self).list_documents().await
    }

    async fn delete_document(&self, name: &str) -> Result<()> {
        (**self).delete_document(name).await
    }
}

#[async_trait]
impl<T: GenerationService + ?Sized> GenerationService for Arc<T> {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<GenerateResponse> {
        (**self).generate(prompt, system_instruction).await
    }
}
