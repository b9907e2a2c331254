use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, warn};

/// One uploaded document as tracked by the local index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadRecord {
    pub id: String,
    /// Name as supplied by the uploader. May contain any script.
    pub filename: String,
    /// ASCII-only name of the artifact inside the upload directory.
    pub stored_filename: String,
    pub stored_path: PathBuf,
    pub display_name: String,
    pub uploaded_at: String,
    /// Handle of the indexed document in the remote store. Older index files
    /// wrote this as `google_file_name`.
    #[serde(default, alias = "google_file_name")]
    pub remote_document_name: Option<String>,
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Flat JSON file holding every [`UploadRecord`].
///
/// Writes go through a temp file in the same directory that is renamed over
/// the target, so readers observe either the previous or the new collection.
/// Read-modify-write operations share one mutex per store (clones included).
#[derive(Clone)]
pub struct RecordStore {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl RecordStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        Ok(Self {
            path,
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the stored collection in file order. A missing or unreadable
    /// file yields an empty collection.
    pub fn load(&self) -> Vec<UploadRecord> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Vec::new(),
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "failed to read record index");
                return Vec::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(records) => records,
            Err(err) => {
                warn!(path = %self.path.display(), error = %err, "record index is malformed; treating as empty");
                Vec::new()
            }
        }
    }

    pub fn save(&self, records: &[UploadRecord]) -> Result<()> {
        let _guard = self.write_lock.lock();
        self.write_all(records)
    }

    /// Newest upload first.
    pub fn list_sorted(&self) -> Vec<UploadRecord> {
        let mut records = self.load();
        sort_newest_first(&mut records);
        records
    }

    pub fn find(&self, id: &str) -> Option<UploadRecord> {
        self.load().into_iter().find(|record| record.id == id)
    }

    pub fn append(&self, record: UploadRecord) -> Result<()> {
        let _guard = self.write_lock.lock();
        let mut records = self.load();
        records.push(record);
        self.write_all(&records)
    }

    /// Drops the record with `id` and returns it, or `None` when no such
    /// record exists (the file is left untouched in that case).
    pub fn remove(&self, id: &str) -> Result<Option<UploadRecord>> {
        let _guard = self.write_lock.lock();
        let mut records = self.load();
        let Some(position) = records.iter().position(|record| record.id == id) else {
            return Ok(None);
        };
        let removed = records.remove(position);
        self.write_all(&records)?;
        Ok(Some(removed))
    }

    fn write_all(&self, records: &[UploadRecord]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut tmp, records)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.path).map_err(|err| err.error)?;
        debug!(path = %self.path.display(), records = records.len(), "record index written");
        Ok(())
    }
}

/// Orders by `uploaded_at`, most recent first. ISO-8601 timestamps compare
/// correctly as strings.
pub fn sort_newest_first(records: &mut [UploadRecord]) {
    records.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, uploaded_at: &str) -> UploadRecord {
        UploadRecord {
            id: id.to_string(),
            filename: format!("{id}.pdf"),
            stored_filename: format!("20250101000000_{id}.pdf"),
            stored_path: PathBuf::from(format!("uploaded_docs/20250101000000_{id}.pdf")),
            display_name: format!("{id}.pdf"),
            uploaded_at: uploaded_at.to_string(),
            remote_document_name: None,
        }
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("data/file_index.json")).unwrap();
        assert!(store.load().is_empty());
        assert!(dir.path().join("data").is_dir());
    }

    #[test]
    fn malformed_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_index.json");
        fs::write(&path, "{ not json").unwrap();
        let store = RecordStore::open(&path).unwrap();
        assert!(store.load().is_empty());
    }

    #[test]
    fn non_ascii_fields_survive_roundtrip_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        let mut first = record("a", "2025-01-01T00:00:00.000000Z");
        first.filename = "사내 규정집.pdf".to_string();
        first.display_name = "사내 규정집 (2025)".to_string();
        first.remote_document_name = Some("fileSearchStores/s/documents/d1".to_string());
        let records = vec![first, record("b", "2025-01-02T00:00:00.000000Z")];
        store.save(&records).unwrap();

        let raw = fs::read_to_string(store.path()).unwrap();
        assert!(raw.contains("사내 규정집 (2025)"));
        assert!(raw.contains("\n  "), "index should be pretty-printed");
        assert_eq!(store.load(), records);
    }

    #[test]
    fn legacy_google_file_name_is_read_as_remote_handle() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_index.json");
        fs::write(
            &path,
            r#"[{
                "id": "2025-03-01T10:00:00.123456",
                "filename": "manual.pdf",
                "stored_filename": "20250301100000_abc.pdf",
                "stored_path": "uploaded_docs/20250301100000_abc.pdf",
                "display_name": "manual.pdf",
                "uploaded_at": "2025-03-01T10:00:00.123456",
                "google_file_name": "fileSearchStores/s/documents/legacy"
            }]"#,
        )
        .unwrap();
        let store = RecordStore::open(&path).unwrap();
        let records = store.load();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].remote_document_name.as_deref(),
            Some("fileSearchStores/s/documents/legacy")
        );
    }

    #[test]
    fn null_remote_handle_loads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("file_index.json");
        fs::write(
            &path,
            r#"[{"id":"x","filename":"a","stored_filename":"b","stored_path":"c",
                "display_name":"a","uploaded_at":"2025","google_file_name":null}]"#,
        )
        .unwrap();
        let store = RecordStore::open(&path).unwrap();
        assert_eq!(store.load()[0].remote_document_name, None);
    }

    #[test]
    fn list_sorted_puts_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        store
            .save(&[
                record("old", "2024-12-31T23:59:59.000000Z"),
                record("new", "2025-02-01T08:00:00.000000Z"),
                record("mid", "2025-01-15T12:00:00.000000Z"),
            ])
            .unwrap();
        let ids: Vec<_> = store.list_sorted().into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec!["new", "mid", "old"]);
    }

    #[test]
    fn remove_returns_record_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        store.append(record("a", "2025-01-01")).unwrap();
        store.append(record("b", "2025-01-02")).unwrap();

        let removed = store.remove("a").unwrap();
        assert_eq!(removed.map(|r| r.id), Some("a".to_string()));
        assert!(store.find("a").is_none());
        assert!(store.find("b").is_some());
    }

    #[test]
    fn remove_unknown_id_leaves_file_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        store.append(record("a", "2025-01-01")).unwrap();
        let before = fs::read(store.path()).unwrap();

        assert!(store.remove("missing").unwrap().is_none());
        assert_eq!(fs::read(store.path()).unwrap(), before);
    }

    #[test]
    fn concurrent_appends_are_not_lost() {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for n in 0..10 {
                        let id = format!("{worker}-{n}");
                        store.append(record(&id, "2025-01-01")).unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.load().len(), 80);
    }
}
