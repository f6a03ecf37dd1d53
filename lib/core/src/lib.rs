//! # staysim Core
//!
//! Core library of the staysim listing similarity engine.
//!
//! Given listings with unit-norm embeddings and a few structured attributes, the engine
//! recommends comparable listings under hard heuristic constraints:
//!
//! - [`FilterPipeline`] - price band and neighbourhood diversity, extensible via [`PairFilter`]
//! - [`SimilarityScorer`] - blocked all-pairs or one-vs-candidates cosine scoring
//! - [`TopKSelector`] - deterministic ranking plus minimum geographic separation
//! - [`ListingCache`] - read-through cache for online queries
//! - [`SimilarityEngine`] - precompute pass and online queries over a [`ListingStore`]
//!
//! ## Example
//!
//! ```rust
//! use staysim_core::{EngineConfig, Listing, MemoryListingStore, SimilarityEngine, Vector};
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryListingStore::from_listings([
//!     Listing::new(1, 100.0, "Manhattan", "Chelsea", 40.74, -74.00)
//!         .with_embedding(Vector::new(vec![1.0, 0.0])),
//!     Listing::new(2, 110.0, "Brooklyn", "Bushwick", 40.69, -73.92)
//!         .with_embedding(Vector::new(vec![1.0, 0.0])),
//! ]));
//! let engine = SimilarityEngine::new(store, EngineConfig::default()).unwrap();
//! assert_eq!(engine.find_similar(1, 10).unwrap(), vec![2]);
//! ```

pub mod cache;
pub mod config;
pub mod engine;
pub mod error;
pub mod filter;
pub mod listing;
pub mod pipeline;
pub mod precompute;
pub mod provider;
pub mod scorer;
pub mod select;
pub mod store;
pub mod vector;

/// Dot product kernels
///
/// - AVX2/FMA on x86_64
/// - NEON on ARM64
/// - scalar fallback elsewhere
pub mod simd;

pub use cache::ListingCache;
pub use config::{CacheMode, EngineConfig, SimilarityParams};
pub use engine::SimilarityEngine;
pub use error::{Error, Result};
pub use filter::{
    BedroomsFilter, CandidateMask, FilterPipeline, NeighbourhoodFilter, PairFilter,
    PriceBandFilter, RoomTypeFilter, SimilarityFloor,
};
pub use listing::{FeatureTable, GeoPoint, Listing, ListingFeatures, ListingId};
pub use pipeline::SimilarityPipeline;
pub use precompute::{ListingFailure, PersistResult, PrecomputeOrchestrator};
pub use provider::VectorProvider;
pub use scorer::{EmbeddingMatrix, ScoreBlock, SimilarityScorer};
pub use select::{Scored, TopKSelector};
pub use store::{ListingStore, MemoryListingStore};
pub use vector::Vector;
