//! Persistence for staysim: an LMDB-backed [`ListingStore`](staysim_core::ListingStore),
//! JSON-lines import and neighbor list export.

pub mod export;
pub mod import;
pub mod lmdb_store;

pub use export::{collect_neighbors, export_neighbors};
pub use import::{import_jsonl, import_jsonl_file, ImportReport};
pub use lmdb_store::LmdbListingStore;
