pub mod admin;
pub mod backend;
pub mod config;
mod delete;
pub mod error;
#[cfg(any(test, feature = "fake"))]
pub mod fake;
pub mod gemini;
pub mod query;
pub mod upload;

pub use admin::FileStoreAdmin;
pub use backend::{GenerationService, IndexingService};
pub use config::{FileConfig, RagConfig};
pub use error::{PipelineError, Result};
pub use gemini::GeminiFileSearch;
pub use query::{collect_citations, render_answer, QueryPipeline, DEFAULT_SYSTEM_PROMPT};
pub use upload::{generate_stored_filename, PollSettings, UploadInput};

pub use milky_index::{RecordStore, StoreError, UploadRecord};
pub use milky_llm::{GeminiClient, GenerateResponse, Operation, RemoteDocument};
