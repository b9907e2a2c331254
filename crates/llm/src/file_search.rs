use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::GeminiClient;

const DOCUMENTS_PAGE_SIZE: &str = "20";

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileSearchStore {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// Long-running operation returned by `uploadToFileSearchStore`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub response: Option<OperationResponse>,
    #[serde(default)]
    pub error: Option<OperationError>,
}

impl Operation {
    /// Name of the indexed document, once the operation has completed.
    pub fn document_name(&self) -> Option<&str> {
        self.response
            .as_ref()
            .and_then(|response| response.document_name.as_deref())
            .filter(|name| !name.is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationResponse {
    #[serde(default)]
    pub document_name: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OperationError {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentPage {
    #[serde(default)]
    documents: Vec<RemoteDocument>,
    #[serde(default)]
    next_page_token: Option<String>,
}

impl GeminiClient {
    pub async fn create_store(&self, display_name: &str) -> Result<FileSearchStore> {
        let request = self
            .http
            .post(self.api_url("fileSearchStores"))
            .json(&json!({ "displayName": display_name }));
        self.execute_json(request, "create file search store").await
    }

    /// Uploads `path` into `store` through the resumable upload protocol and
    /// returns the indexing operation. The caller polls it with
    /// [`GeminiClient::get_operation`].
    pub async fn upload_to_store(
        &self,
        store: &str,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation> {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mime_type = mime_type_for(path);
        let start = self
            .http
            .post(self.upload_url(&format!("{store}:uploadToFileSearchStore")))
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", bytes.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .json(&json!({ "displayName": display_name, "mimeType": mime_type }));
        let response = self.execute(start, "start document upload").await?;
        let session_url = response
            .headers()
            .get("x-goog-upload-url")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| anyhow!("upload session response did not include x-goog-upload-url"))?;
        debug!(store, display_name, size = bytes.len(), "upload session opened");

        let finalize = self
            .http
            .post(session_url)
            .header("X-Goog-Upload-Command", "upload, finalize")
            .header("X-Goog-Upload-Offset", "0")
            .body(bytes);
        self.execute_json(finalize, "upload document").await
    }

    pub async fn get_operation(&self, name: &str) -> Result<Operation> {
        let request = self.http.get(self.api_url(name));
        self.execute_json(request, "get operation").await
    }

    /// Lists every document in `store`, following page tokens.
    pub async fn list_documents(&self, store: &str) -> Result<Vec<RemoteDocument>> {
        let url = self.api_url(&format!("{store}/documents"));
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut request = self.http.get(&url).query(&[("pageSize", DOCUMENTS_PAGE_SIZE)]);
            if let Some(token) = &page_token {
                request = request.query(&[("pageToken", token.as_str())]);
            }
            let page: DocumentPage = self.execute_json(request, "list documents").await?;
            documents.extend(page.documents);
            match page.next_page_token.filter(|token| !token.is_empty()) {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }
        Ok(documents)
    }

    /// Deletes a document. With `force` the service also drops its chunks
    /// instead of refusing non-empty documents.
    pub async fn delete_document(&self, name: &str, force: bool) -> Result<()> {
        let request = self
            .http
            .delete(self.api_url(name))
            .query(&[("force", if force { "true" } else { "false" })]);
        self.execute(request, "delete document").await?;
        Ok(())
    }
}

fn mime_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "txt" | "log" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "html" | "htm" => "text/html",
        "csv" => "text/csv",
        "json" => "application/json",
        "xml" => "application/xml",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "hwp" => "application/x-hwp",
        _ => "application/octet-stream",
    }
}
