use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use milky_llm::{GenerateResponse, Operation, OperationError, OperationResponse, RemoteDocument};
use parking_lot::Mutex;

use crate::backend::{GenerationService, IndexingService};

/// In-memory stand-in for the remote file search store and generation
/// endpoint. Clones share state, so a test can keep a handle while the
/// pipelines own another.
#[derive(Clone, Default)]
pub struct FakeFileSearch {
    state: Arc<Mutex<FakeState>>,
}

#[derive(Default)]
struct FakeState {
    documents: Vec<RemoteDocument>,
    operations: HashMap<String, PendingOperation>,
    uploads: Vec<FakeUpload>,
    deleted: Vec<String>,
    prompts: Vec<(String, String)>,
    next_id: usize,
    polls_until_done: usize,
    omit_document_name: bool,
    operation_error: Option<String>,
    fail_upload: bool,
    fail_poll: bool,
    fail_list: bool,
    fail_delete: bool,
    fail_generate: bool,
    response: GenerateResponse,
}

struct PendingOperation {
    remaining_polls: usize,
    document_name: String,
}

/// What the fake saw for one `upload_document` call.
#[derive(Debug, Clone)]
pub struct FakeUpload {
    pub path: PathBuf,
    pub display_name: String,
    pub bytes: Vec<u8>,
}

impl FakeFileSearch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Operations report `done` only after this many polls.
    pub fn fake_polls_until_done(&self, polls: usize) {
        self.state.lock().polls_until_done = polls;
    }

    /// Completed operations carry no `documentName`.
    pub fn fake_omit_document_name(&self) {
        self.state.lock().omit_document_name = true;
    }

    /// Completed operations carry an error status with `message`.
    pub fn fake_operation_error(&self, message: &str) {
        self.state.lock().operation_error = Some(message.to_string());
    }

    pub fn fake_fail_upload(&self) {
        self.state.lock().fail_upload = true;
    }

    pub fn fake_fail_poll(&self) {
        self.state.lock().fail_poll = true;
    }

    pub fn fake_fail_list(&self) {
        self.state.lock().fail_list = true;
    }

    pub fn fake_fail_delete(&self) {
        self.state.lock().fail_delete = true;
    }

    pub fn fake_fail_generate(&self) {
        self.state.lock().fail_generate = true;
    }

    /// Response returned by every `generate` call.
    pub fn fake_response(&self, response: GenerateResponse) {
        self.state.lock().response = response;
    }

    /// Seed a document as if it had been indexed earlier.
    pub fn insert_document(&self, name: &str, display_name: &str) {
        self.state.lock().documents.push(RemoteDocument {
            name: name.to_string(),
            display_name: Some(display_name.to_string()),
        });
    }

    pub fn documents(&self) -> Vec<RemoteDocument> {
        self.state.lock().documents.clone()
    }

    pub fn uploads(&self) -> Vec<FakeUpload> {
        self.state.lock().uploads.clone()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().deleted.clone()
    }

    /// `(prompt, system_instruction)` for every `generate` call.
    pub fn prompts(&self) -> Vec<(String, String)> {
        self.state.lock().prompts.clone()
    }
}

impl FakeState {
    fn operation(&self, name: &str, pending: &PendingOperation) -> Operation {
        if pending.remaining_polls > 0 {
            return Operation {
                name: name.to_string(),
                ..Default::default()
            };
        }
        if let Some(message) = &self.operation_error {
            return Operation {
                name: name.to_string(),
                done: true,
                response: None,
                error: Some(OperationError {
                    code: 13,
                    message: message.clone(),
                }),
            };
        }
        let response = (!self.omit_document_name).then(|| OperationResponse {
            document_name: Some(pending.document_name.clone()),
        });
        Operation {
            name: name.to_string(),
            done: true,
            response,
            error: None,
        }
    }
}

#[async_trait]
impl IndexingService for FakeFileSearch {
    async fn upload_document(&self, path: &Path, display_name: &str) -> Result<Operation> {
        let mut state = self.state.lock();
        if state.fail_upload {
            return Err(anyhow!("simulated upload failure for {display_name}"));
        }
        let bytes = std::fs::read(path)?;
        state.next_id += 1;
        let id = state.next_id;
        let document_name = format!("fileSearchStores/fake/documents/doc-{id}");
        let op_name = format!("fileSearchStores/fake/upload/operations/op-{id}");
        state.uploads.push(FakeUpload {
            path: path.to_path_buf(),
            display_name: display_name.to_string(),
            bytes,
        });
        state.documents.push(RemoteDocument {
            name: document_name.clone(),
            display_name: Some(display_name.to_string()),
        });
        let pending = PendingOperation {
            remaining_polls: state.polls_until_done,
            document_name,
        };
        let op = state.operation(&op_name, &pending);
        state.operations.insert(op_name, pending);
        Ok(op)
    }

    async fn poll_operation(&self, operation: &Operation) -> Result<Operation> {
        let mut state = self.state.lock();
        if state.fail_poll {
            return Err(anyhow!("simulated poll failure for {}", operation.name));
        }
        let mut pending = state
            .operations
            .remove(&operation.name)
            .ok_or_else(|| anyhow!("unknown operation {}", operation.name))?;
        pending.remaining_polls = pending.remaining_polls.saturating_sub(1);
        let op = state.operation(&operation.name, &pending);
        state.operations.insert(operation.name.clone(), pending);
        Ok(op)
    }

    async fn list_documents(&self) -> Result<Vec<RemoteDocument>> {
        let state = self.state.lock();
        if state.fail_list {
            return Err(anyhow!("simulated list failure"));
        }
        Ok(state.documents.clone())
    }

    async fn delete_document(&self, name: &str) -> Result<()> {
        let mut state = self.state.lock();
        if state.fail_delete {
            return Err(anyhow!("simulated delete failure for {name}"));
        }
        let before = state.documents.len();
        state.documents.retain(|doc| doc.name != name);
        if state.documents.len() == before {
            return Err(anyhow!("document {name} not found"));
        }
        state.deleted.push(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl GenerationService for FakeFileSearch {
    async fn generate(&self, prompt: &str, system_instruction: &str) -> Result<GenerateResponse> {
        let mut state = self.state.lock();
        state
            .prompts
            .push((prompt.to_string(), system_instruction.to_string()));
        if state.fail_generate {
            return Err(anyhow!("simulated generation failure"));
        }
        Ok(state.response.clone())
    }
}
