use std::ffi::OsStr;
use std::fs::{self, File};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use std::time::Duration;

use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, Utc};
use milky_index::UploadRecord;
use rand::Rng;
use tokio::task;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::admin::FileStoreAdmin;
use crate::backend::IndexingService;
use crate::error::{PipelineError, Result};

/// Used when the uploader did not send a filename.
pub const DEFAULT_UPLOAD_NAME: &str = "uploaded_file";

const MAX_EXTENSION_LEN: usize = 16;

#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub interval: Duration,
    /// Upper bound on the wait for the indexing operation.
    pub max_wait: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_wait: Duration::from_secs(600),
        }
    }
}

/// A file handed to [`FileStoreAdmin::upload_file_and_index`].
pub struct UploadInput<R> {
    pub reader: R,
    pub filename: Option<String>,
    pub display_name: Option<String>,
}

impl<I: IndexingService> FileStoreAdmin<I> {
    /// Saves the file under an ASCII-only name, indexes it remotely, waits
    /// for indexing to finish and records it. Nothing is recorded on failure
    /// and the local copy is removed again.
    pub async fn upload_file_and_index<R>(&self, input: UploadInput<R>) -> Result<UploadRecord>
    where
        R: Read + Seek + Send + 'static,
    {
        let UploadInput {
            mut reader,
            filename,
            display_name,
        } = input;
        let original_name = filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPLOAD_NAME.to_string());
        let stored_filename = generate_stored_filename(&original_name, Utc::now());
        let stored_path = self.upload_dir.join(&stored_filename);

        let target = stored_path.clone();
        let written = task::spawn_blocking(move || write_local_copy(&mut reader, &target))
            .await
            .map_err(anyhow::Error::new)
            .and_then(|res| res.map_err(anyhow::Error::new));
        let size = match written {
            Ok(size) => size,
            Err(err) => {
                discard_local_copy(&stored_path);
                return Err(PipelineError::UploadFailed(
                    err.context("failed to store upload locally"),
                ));
            }
        };
        debug!(path = %stored_path.display(), size, "upload stored locally");

        let display_name = display_name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| original_name.clone());

        let remote_document_name = match self.index_remote(&stored_path, &display_name).await {
            Ok(name) => name,
            Err(err) => {
                discard_local_copy(&stored_path);
                return Err(err);
            }
        };
        if remote_document_name.is_none() {
            warn!(display_name = %display_name, "indexing finished without a document name");
        }

        let record = UploadRecord {
            id: Uuid::new_v4().to_string(),
            filename: original_name,
            stored_filename,
            stored_path,
            display_name,
            uploaded_at: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            remote_document_name,
        };
        if let Err(err) = self.persist_record(record.clone()).await {
            discard_local_copy(&record.stored_path);
            warn!(
                remote = record.remote_document_name.as_deref().unwrap_or("-"),
                "upload not recorded; remote document left in place"
            );
            return Err(err);
        }
        info!(
            id = %record.id,
            display_name = %record.display_name,
            remote = record.remote_document_name.as_deref().unwrap_or("-"),
            "file uploaded and indexed"
        );
        Ok(record)
    }

    async fn persist_record(&self, record: UploadRecord) -> Result<()> {
        let store = self.store.clone();
        task::spawn_blocking(move || store.append(record))
            .await
            .map_err(|err| {
                PipelineError::UploadFailed(
                    anyhow::Error::new(err).context("record store task failed"),
                )
            })??;
        Ok(())
    }

    async fn index_remote(&self, path: &Path, display_name: &str) -> Result<Option<String>> {
        let mut operation = self
            .indexer
            .upload_document(path, display_name)
            .await
            .map_err(PipelineError::UploadFailed)?;
        let started = Instant::now();
        while !operation.done {
            if started.elapsed() >= self.poll.max_wait {
                warn!(operation = %operation.name, "indexing wait exhausted");
                return Err(PipelineError::Timeout(self.poll.max_wait));
            }
            sleep(self.poll.interval).await;
            operation = self
                .indexer
                .poll_operation(&operation)
                .await
                .map_err(PipelineError::UploadFailed)?;
        }
        if let Some(status) = &operation.error {
            return Err(PipelineError::UploadFailed(anyhow!(
                "indexing operation {} failed (code {}): {}",
                operation.name,
                status.code,
                status.message
            )));
        }
        Ok(operation.document_name().map(str::to_string))
    }
}

/// `<yyyymmddHHMMSS>_<32 hex>.<ext>`; always ASCII.
pub fn generate_stored_filename(original_name: &str, now: DateTime<Utc>) -> String {
    let mut random = [0u8; 16];
    rand::thread_rng().fill(&mut random[..]);
    format!(
        "{}_{}{}",
        now.format("%Y%m%d%H%M%S"),
        hex::encode(random),
        safe_extension(original_name)
    )
}

/// Extension of `name` including the dot, or empty. Extensions that are not
/// short ASCII alphanumerics are dropped so the stored name stays ASCII.
pub fn safe_extension(name: &str) -> String {
    let ext = Path::new(name)
        .extension()
        .and_then(OsStr::to_str)
        .unwrap_or_default();
    if ext.is_empty()
        || ext.len() > MAX_EXTENSION_LEN
        || !ext.chars().all(|c| c.is_ascii_alphanumeric())
    {
        return String::new();
    }
    format!(".{ext}")
}

fn write_local_copy<R: Read + Seek>(reader: &mut R, path: &Path) -> io::Result<u64> {
    reader.seek(SeekFrom::Start(0))?;
    let mut out = File::create(path)?;
    let size = io::copy(reader, &mut out)?;
    out.sync_all()?;
    Ok(size)
}

fn discard_local_copy(path: &Path) {
    if let Err(err) = fs::remove_file(path) {
        if err.kind() != io::ErrorKind::NotFound {
            warn!(path = %path.display(), error = %err, "failed to remove local copy of failed upload");
        }
    }
}
