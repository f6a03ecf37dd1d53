//! # staysim
//!
//! Similar-listing recommendations for short-term rental catalogs.
//!
//! staysim takes listings that carry a unit-norm embedding plus a few structured attributes
//! (price, neighbourhood, coordinates) and relates each listing to the listings most like it,
//! subject to hard constraints:
//!
//! - prices within a log-scale band of each other
//! - a different neighbourhood from the reference listing
//! - cosine similarity above a floor
//! - a minimum geographic separation between reference and recommendation
//!
//! Relations are either precomputed for the whole catalog and stored on each listing, or
//! computed on demand for a single listing. Both paths run the same pipeline and return the
//! same ids.
//!
//! ## Quick Start
//!
//! ### From the command line
//!
//! ```bash
//! staysim --data-dir ./data import listings.jsonl
//! staysim --data-dir ./data precompute
//! staysim --data-dir ./data similar 2595
//! staysim --data-dir ./data export neighbors.json
//! ```
//!
//! ### As a Library
//!
//! ```rust,no_run
//! use staysim::prelude::*;
//! use std::sync::Arc;
//!
//! let store = Arc::new(LmdbListingStore::open("./data").unwrap());
//! let engine = SimilarityEngine::new(store, EngineConfig::default()).unwrap();
//!
//! // Batch: write neighbor lists for every listing
//! let result = engine.precompute_all(&SimilarityParams::default()).unwrap();
//! println!("{} listings processed", result.processed_count);
//!
//! // Online: compute for one listing
//! let similar = engine.find_similar(2595, 10).unwrap();
//! ```
//!
//! ## Crate Structure
//!
//! - [`staysim-core`](https://docs.rs/staysim-core) - Listing model, filters, scoring, selection, engine
//! - [`staysim-storage`](https://docs.rs/staysim-storage) - LMDB store, JSON-lines import, export

// Re-export core types
pub use staysim_core::{
    CacheMode, EngineConfig, Error, FilterPipeline, GeoPoint, Listing, ListingCache, ListingId,
    ListingStore, MemoryListingStore, PairFilter, PersistResult, Result, SimilarityEngine,
    SimilarityParams, Vector, VectorProvider,
};

// Re-export storage
pub use staysim_storage::{export_neighbors, import_jsonl_file, ImportReport, LmdbListingStore};

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        CacheMode, EngineConfig, Error, FilterPipeline, Listing, ListingId, ListingStore,
        LmdbListingStore, MemoryListingStore, PairFilter, PersistResult, Result, SimilarityEngine,
        SimilarityParams, Vector, VectorProvider,
    };
}

/// Individual pipeline stages, for callers assembling their own runs
pub mod pipeline {
    pub use staysim_core::{
        BedroomsFilter, CandidateMask, EmbeddingMatrix, FeatureTable, NeighbourhoodFilter,
        PriceBandFilter, RoomTypeFilter, SimilarityFloor, SimilarityPipeline, SimilarityScorer,
        TopKSelector,
    };
}
