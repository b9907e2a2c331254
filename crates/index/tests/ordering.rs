use std::path::PathBuf;

use milky_index::{sort_newest_first, RecordStore, UploadRecord};
use proptest::prelude::*;

fn record(id: usize, uploaded_at: String, display_name: String) -> UploadRecord {
    UploadRecord {
        id: format!("id-{id}"),
        filename: display_name.clone(),
        stored_filename: format!("20250101000000_{id:032x}.pdf"),
        stored_path: PathBuf::from(format!("uploaded_docs/{id}.pdf")),
        display_name,
        uploaded_at,
        remote_document_name: None,
    }
}

fn timestamp() -> impl Strategy<Value = String> {
    (2020u32..2030, 1u32..13, 1u32..29, 0u32..24, 0u32..60, 0u32..1_000_000).prop_map(
        |(y, mo, d, h, mi, us)| format!("{y:04}-{mo:02}-{d:02}T{h:02}:{mi:02}:00.{us:06}Z"),
    )
}

proptest! {
    #[test]
    fn sorted_output_is_non_increasing(stamps in prop::collection::vec(timestamp(), 0..40)) {
        let mut records: Vec<_> = stamps
            .into_iter()
            .enumerate()
            .map(|(idx, ts)| record(idx, ts, format!("doc {idx}")))
            .collect();
        sort_newest_first(&mut records);
        for pair in records.windows(2) {
            prop_assert!(pair[0].uploaded_at >= pair[1].uploaded_at);
        }
    }

    #[test]
    fn collection_survives_persist_and_reload(
        entries in prop::collection::vec((timestamp(), "\\PC{1,24}"), 0..12)
    ) {
        let dir = tempfile::tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("file_index.json")).unwrap();
        let records: Vec<_> = entries
            .into_iter()
            .enumerate()
            .map(|(idx, (ts, name))| record(idx, ts, name))
            .collect();
        store.save(&records).unwrap();
        prop_assert_eq!(store.load(), records);
    }
}
