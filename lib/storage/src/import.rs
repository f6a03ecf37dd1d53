// JSON-lines ingestion of cleaned listings
use staysim_core::{Error, Listing, ListingStore, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;
use tracing::{info, warn};

/// Counts from one import run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportReport {
    pub imported: usize,
    /// Lines that parsed but failed validation
    pub rejected: usize,
}

pub fn import_jsonl_file<S, P>(store: &S, path: P, batch_size: usize) -> Result<ImportReport>
where
    S: ListingStore + ?Sized,
    P: AsRef<Path>,
{
    let file = File::open(path.as_ref())?;
    info!("Importing listings from {}", path.as_ref().display());
    import_jsonl(store, file, batch_size)
}

/// One listing object per line; blank lines are ignored. A line that is not a listing
/// aborts the import, a listing that fails validation is counted and skipped.
/// Listings are written with `put_batch` every `batch_size` records.
pub fn import_jsonl<S, R>(store: &S, reader: R, batch_size: usize) -> Result<ImportReport>
where
    S: ListingStore + ?Sized,
    R: Read,
{
    let batch_size = batch_size.max(1);
    let mut report = ImportReport::default();
    let mut batch = Vec::with_capacity(batch_size);

    for (index, line) in BufReader::new(reader).lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let listing: Listing = serde_json::from_str(line)
            .map_err(|e| Error::Serialization(format!("line {}: {}", index + 1, e)))?;
        if let Err(e) = listing.validate() {
            warn!("Skipping line {}: {}", index + 1, e);
            report.rejected += 1;
            continue;
        }
        batch.push(listing);
        if batch.len() == batch_size {
            store.put_batch(&batch)?;
            report.imported += batch.len();
            batch.clear();
        }
    }
    if !batch.is_empty() {
        store.put_batch(&batch)?;
        report.imported += batch.len();
    }

    info!("Imported {} listings ({} rejected)", report.imported, report.rejected);
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysim_core::MemoryListingStore;

    const LINES: &str = r#"
{"id": 1, "price": 150.0, "neighbourhood_group": "Manhattan", "neighbourhood": "Harlem", "latitude": 40.81, "longitude": -73.94, "room_type": "Private room", "embedding": [1.0, 0.0]}

{"id": 2, "price": 95.0, "neighbourhood_group": "Queens", "neighbourhood": "Astoria", "latitude": 40.76, "longitude": -73.92}
{"id": 3, "price": 80.0, "neighbourhood_group": "Queens", "neighbourhood": "", "latitude": 40.76, "longitude": -73.92}
"#;

    #[test]
    fn test_import_parses_and_validates() {
        let store = MemoryListingStore::new();
        let report = import_jsonl(&store, LINES.as_bytes(), 1).unwrap();

        assert_eq!(report, ImportReport { imported: 2, rejected: 1 });
        assert_eq!(store.get_all_ids().unwrap(), vec![1, 2]);

        let first = store.get(1).unwrap();
        assert_eq!(first.room_type.as_deref(), Some("Private room"));
        assert_eq!(first.embedding.unwrap().as_slice(), &[1.0, 0.0]);
        assert!(store.get(2).unwrap().embedding.is_none());
    }

    #[test]
    fn test_malformed_line_is_an_error() {
        let store = MemoryListingStore::new();
        let err = import_jsonl(&store, "{\"id\": 1,\n".as_bytes(), 10).unwrap_err();
        match err {
            Error::Serialization(msg) => assert!(msg.starts_with("line 1")),
            other => panic!("unexpected error: {}", other),
        }
    }
}
