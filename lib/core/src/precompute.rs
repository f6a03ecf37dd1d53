//! Batch precompute pass.
//!
//! Loads the whole catalog in id order, embeds listings that have no vector yet, runs the
//! batch pipeline and writes every listing back with its new neighbor list. Writes go
//! out in chunks, one `put_batch` per chunk; a failed chunk stops the pass with
//! `Error::PassInterrupted` and re-running the pass from scratch repairs it.

use crate::config::{EngineConfig, SimilarityParams};
use crate::filter::FilterPipeline;
use crate::listing::{check_embedding, FeatureTable, Listing, ListingId};
use crate::pipeline::SimilarityPipeline;
use crate::provider::VectorProvider;
use crate::scorer::EmbeddingMatrix;
use crate::store::ListingStore;
use crate::{Error, Result, Vector};
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A listing left out of the pass and why.
#[derive(Debug)]
pub struct ListingFailure {
    pub id: ListingId,
    pub error: Error,
}

/// Outcome of a completed pass.
#[derive(Debug, Default)]
pub struct PersistResult {
    /// Listings written with a fresh neighbor list
    pub processed_count: usize,
    pub failures: Vec<ListingFailure>,
}

impl PersistResult {
    pub fn failed_ids(&self) -> Vec<ListingId> {
        self.failures.iter().map(|f| f.id).collect()
    }
}

pub struct PrecomputeOrchestrator<'a, S: ListingStore + ?Sized> {
    store: &'a S,
    provider: Option<&'a dyn VectorProvider>,
    config: &'a EngineConfig,
    extra_filters: FilterPipeline,
}

impl<'a, S: ListingStore + ?Sized> PrecomputeOrchestrator<'a, S> {
    pub fn new(store: &'a S, provider: Option<&'a dyn VectorProvider>, config: &'a EngineConfig) -> Self {
        Self {
            store,
            provider,
            config,
            extra_filters: FilterPipeline::new(),
        }
    }

    /// Filters applied on top of the standard price band and neighbourhood filters.
    #[must_use]
    pub fn with_extra_filters(mut self, filters: FilterPipeline) -> Self {
        self.extra_filters = filters;
        self
    }

    pub fn run(&self, params: &SimilarityParams) -> Result<PersistResult> {
        params.validate()?;
        let started = Instant::now();
        let mut rejected = Rejected::default();

        let listings = self.load_catalog(&mut rejected)?;
        info!("Precompute: {} listings loaded", listings.len());

        let listings = self.embed_missing(listings, &mut rejected)?;

        let (pool, embeddings, mut listings) = build_pool(listings, &mut rejected)?;
        info!(
            "Precompute: scoring {} listings (dim {}, block size {})",
            pool.len(),
            embeddings.dim(),
            self.config.block_size
        );

        let pipeline =
            SimilarityPipeline::with_extra_filters(params, self.config.block_size, &self.extra_filters);
        let neighbors = pipeline.run_batch(&pool, &embeddings, self.config.parallel);
        for (listing, similar) in listings.iter_mut().zip(neighbors) {
            listing.similar_listings = similar;
        }
        let processed_count = listings.len();

        let Rejected {
            mut failures,
            listings: cleared,
        } = rejected;
        failures.sort_by_key(|f| f.id);
        for failure in &failures {
            warn!("Precompute: listing {} skipped: {}", failure.id, failure.error);
        }
        listings.extend(cleared);
        listings.sort_by_key(|l| l.id);
        let written = self.write_all(&listings)?;

        info!(
            "Precompute finished in {:?}: {} written, {} scored, {} failed",
            started.elapsed(),
            written,
            processed_count,
            failures.len()
        );
        Ok(PersistResult {
            processed_count,
            failures,
        })
    }

    /// Every listing in ascending id order, minus the ones that fail validation.
    fn load_catalog(&self, rejected: &mut Rejected) -> Result<Vec<Listing>> {
        let mut ids = self.store.get_all_ids()?;
        ids.sort_unstable();
        ids.dedup();

        let mut listings = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(self.config.write_batch_size) {
            let mut loaded = self.store.get_many(chunk)?;
            loaded.sort_by_key(|l| l.id);
            for listing in loaded {
                match listing.validate() {
                    Ok(()) => listings.push(listing),
                    Err(error) => rejected.push(listing, error),
                }
            }
        }
        Ok(listings)
    }

    /// Ask the provider for vectors of listings that have none; listings that cannot get
    /// one are rejected. Provider errors abort the pass before anything is written.
    fn embed_missing(&self, listings: Vec<Listing>, rejected: &mut Rejected) -> Result<Vec<Listing>> {
        let mut kept = Vec::with_capacity(listings.len());
        let mut pending = Vec::new();
        for listing in listings {
            if listing.embedding.is_some() {
                kept.push(listing);
                continue;
            }
            let has_text = listing
                .summary
                .as_deref()
                .is_some_and(|text| !text.trim().is_empty());
            let reason = match (self.provider.is_some(), has_text) {
                (true, true) => {
                    pending.push(kept.len());
                    kept.push(listing);
                    continue;
                }
                (false, _) => "no embedding and no vector provider",
                (true, false) => "no embedding and no summary text",
            };
            let error = Error::invalid(listing.id, reason);
            rejected.push(listing, error);
        }

        let Some(provider) = self.provider.filter(|_| !pending.is_empty()) else {
            return Ok(kept);
        };
        info!("Precompute: embedding {} listings", pending.len());
        for chunk in pending.chunks(self.config.embed_batch_size) {
            let texts: Vec<String> = chunk
                .iter()
                .map(|&i| kept[i].summary.clone().unwrap_or_default())
                .collect();
            let vectors = provider.embed_batch(&texts)?;
            if vectors.len() != chunk.len() {
                return Err(Error::ProviderUnavailable(format!(
                    "provider returned {} vectors for {} texts",
                    vectors.len(),
                    chunk.len()
                )));
            }
            for (&i, vector) in chunk.iter().zip(vectors) {
                kept[i].embedding = Some(vector);
            }
        }
        Ok(kept)
    }

    fn write_all(&self, listings: &[Listing]) -> Result<usize> {
        let mut committed = 0;
        for chunk in listings.chunks(self.config.write_batch_size) {
            if let Err(source) = self.store.put_batch(chunk) {
                error!(
                    "Precompute: write failed after {} of {} listings: {}",
                    committed,
                    listings.len(),
                    source
                );
                return Err(Error::PassInterrupted {
                    committed,
                    source: Box::new(source),
                });
            }
            committed += chunk.len();
            debug!("Precompute: {}/{} listings written", committed, listings.len());
        }
        Ok(committed)
    }
}

/// Listings left out of scoring. They are still written back, with an empty neighbor
/// list, so no list from an earlier pass survives.
#[derive(Default)]
struct Rejected {
    failures: Vec<ListingFailure>,
    listings: Vec<Listing>,
}

impl Rejected {
    fn push(&mut self, mut listing: Listing, error: Error) {
        self.failures.push(ListingFailure { id: listing.id, error });
        listing.similar_listings.clear();
        self.listings.push(listing);
    }
}

/// Features and embedding rows for every listing with a usable vector, all index-aligned.
/// The catalog dimension is taken from the first embedded listing. Non-unit vectors are
/// normalized for scoring only; the stored embedding is left as the provider gave it.
fn build_pool(
    listings: Vec<Listing>,
    rejected: &mut Rejected,
) -> Result<(FeatureTable, EmbeddingMatrix, Vec<Listing>)> {
    let dim = listings
        .iter()
        .find_map(|l| l.embedding.as_ref().map(Vector::dim))
        .unwrap_or(0);
    let mut pool = FeatureTable::with_capacity(listings.len());
    let mut embeddings = EmbeddingMatrix::with_capacity(dim, listings.len());
    let mut kept = Vec::with_capacity(listings.len());

    for listing in listings {
        let checked = match &listing.embedding {
            Some(embedding) => check_embedding(listing.id, embedding, Some(dim)),
            None => Err(Error::invalid(listing.id, "no embedding")),
        };
        if let Err(error) = checked {
            rejected.push(listing, error);
            continue;
        }
        if let Err(error) = pool.push(&listing) {
            rejected.push(listing, error);
            continue;
        }
        if let Some(embedding) = &listing.embedding {
            if embedding.is_unit() {
                embeddings.push(listing.id, embedding)?;
            } else {
                debug!("Listing {} embedding is not unit length, normalizing", listing.id);
                embeddings.push(listing.id, &embedding.normalized())?;
            }
        }
        kept.push(listing);
    }
    Ok((pool, embeddings, kept))
}
