use std::fs;
use std::path::{Path, PathBuf};

use milky_index::{RecordStore, UploadRecord};

use crate::error::Result;
use crate::upload::PollSettings;

/// Owns the local side of the document lifecycle: the record index, the
/// upload directory and the remote indexing service both are kept in sync
/// with. Upload and deletion live in `upload.rs` and `delete.rs`.
pub struct FileStoreAdmin<I> {
    pub(crate) store: RecordStore,
    pub(crate) indexer: I,
    pub(crate) upload_dir: PathBuf,
    pub(crate) poll: PollSettings,
}

impl<I> FileStoreAdmin<I> {
    /// Creates the upload directory if needed.
    pub fn open(
        store: RecordStore,
        indexer: I,
        upload_dir: impl Into<PathBuf>,
        poll: PollSettings,
    ) -> Result<Self> {
        let upload_dir = upload_dir.into();
        fs::create_dir_all(&upload_dir).map_err(milky_index::StoreError::from)?;
        Ok(Self {
            store,
            indexer,
            upload_dir,
            poll,
        })
    }

    /// All uploads, newest first.
    pub fn list_files(&self) -> Vec<UploadRecord> {
        self.store.list_sorted()
    }

    pub fn find(&self, id: &str) -> Option<UploadRecord> {
        self.store.find(id)
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }
}
