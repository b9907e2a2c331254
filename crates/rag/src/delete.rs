use std::fs;
use std::io;
use std::path::Path;

use tokio::task;
use tracing::{debug, info, warn};

use crate::admin::FileStoreAdmin;
use crate::backend::IndexingService;
use crate::error::{PipelineError, Result};

impl<I: IndexingService> FileStoreAdmin<I> {
    /// Removes an upload everywhere it lives. Only an unknown `id` is an
    /// error: remote and local cleanup failures are logged and the record is
    /// dropped regardless.
    pub async fn delete_file(&self, id: &str) -> Result<()> {
        let record = self
            .store
            .find(id)
            .ok_or_else(|| PipelineError::NotFound(id.to_string()))?;

        let remote = match &record.remote_document_name {
            Some(name) => Some(name.clone()),
            None => self.recover_remote_name(&record.display_name).await,
        };
        if let Some(document) = remote {
            match self.indexer.delete_document(&document).await {
                Ok(()) => debug!(id, document = %document, "remote document deleted"),
                Err(cause) => {
                    let err = PipelineError::RemoteCleanupFailed { document, cause };
                    warn!(id, error = %err, "continuing with local cleanup");
                }
            }
        }

        remove_local_artifact(&record.stored_path);
        let store = self.store.clone();
        let owned_id = id.to_string();
        task::spawn_blocking(move || store.remove(&owned_id))
            .await
            .map_err(|err| {
                PipelineError::Store(milky_index::StoreError::Io(io::Error::new(
                    io::ErrorKind::Other,
                    err,
                )))
            })??;
        info!(id, display_name = %record.display_name, "file deleted");
        Ok(())
    }

    /// Records written before remote handles were kept only know their
    /// display name. The first remote document carrying that name wins.
    async fn recover_remote_name(&self, display_name: &str) -> Option<String> {
        match self.indexer.list_documents().await {
            Ok(documents) => {
                let found = documents
                    .into_iter()
                    .find(|doc| doc.display_name.as_deref() == Some(display_name))
                    .map(|doc| doc.name);
                if found.is_none() {
                    debug!(display_name, "no remote document matches display name");
                }
                found
            }
            Err(err) => {
                warn!(display_name, error = %format!("{err:#}"), "failed to list remote documents");
                None
            }
        }
    }
}

fn remove_local_artifact(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "local artifact already gone");
        }
        Err(err) => warn!(path = %path.display(), error = %err, "failed to remove local artifact"),
    }
}
