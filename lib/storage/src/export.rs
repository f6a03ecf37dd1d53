// Neighbor list export
use atomicwrites::{AtomicFile, OverwriteBehavior};
use staysim_core::{Error, ListingId, ListingStore, Result};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use tracing::info;

const READ_BATCH: usize = 1000;

/// Every listing's stored neighbor list, keyed by listing id.
pub fn collect_neighbors<S: ListingStore + ?Sized>(store: &S) -> Result<BTreeMap<ListingId, Vec<ListingId>>> {
    let ids = store.get_all_ids()?;
    let mut neighbors = BTreeMap::new();
    for chunk in ids.chunks(READ_BATCH) {
        for listing in store.get_many(chunk)? {
            neighbors.insert(listing.id, listing.similar_listings);
        }
    }
    Ok(neighbors)
}

/// Write `{"<id>": [neighbor ids...], ...}` to `path`. The file is replaced atomically,
/// so readers see either the previous export or the complete new one.
pub fn export_neighbors<S, P>(store: &S, path: P) -> Result<usize>
where
    S: ListingStore + ?Sized,
    P: AsRef<Path>,
{
    let neighbors = collect_neighbors(store)?;
    let json = serde_json::to_vec_pretty(&neighbors).map_err(|e| Error::Serialization(e.to_string()))?;

    AtomicFile::new(path.as_ref(), OverwriteBehavior::AllowOverwrite)
        .write(|f| f.write_all(&json))
        .map_err(|e| match e {
            atomicwrites::Error::Internal(io) | atomicwrites::Error::User(io) => Error::Io(io),
        })?;

    info!("Exported {} neighbor lists to {}", neighbors.len(), path.as_ref().display());
    Ok(neighbors.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use staysim_core::{Listing, MemoryListingStore};
    use tempfile::tempdir;

    #[test]
    fn test_export_writes_every_listing() {
        let mut a = Listing::new(1, 100.0, "Bronx", "Fordham", 40.86, -73.89);
        a.similar_listings = vec![3, 2];
        let b = Listing::new(2, 100.0, "Bronx", "Mott Haven", 40.81, -73.92);
        let store = MemoryListingStore::from_listings([a, b]);

        let dir = tempdir().unwrap();
        let path = dir.path().join("neighbors.json");
        std::fs::write(&path, b"stale").unwrap();

        assert_eq!(export_neighbors(&store, &path).unwrap(), 2);
        let written: BTreeMap<ListingId, Vec<ListingId>> =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written[&1], vec![3, 2]);
        assert!(written[&2].is_empty());
    }
}
