use crate::cache::ListingCache;
use crate::config::{CacheMode, EngineConfig, SimilarityParams};
use crate::filter::{FilterPipeline, PairFilter};
use crate::listing::{check_embedding, FeatureTable, Listing, ListingId};
use crate::pipeline::SimilarityPipeline;
use crate::precompute::{PersistResult, PrecomputeOrchestrator};
use crate::provider::VectorProvider;
use crate::scorer::EmbeddingMatrix;
use crate::store::ListingStore;
use crate::{Error, Result, Vector};
use ahash::AHashMap;
use std::borrow::Cow;
use std::sync::Arc;
use tracing::debug;

/// Relative slack on the price prefilter bounds so rounding in `10^x` never drops a
/// listing the exact price band would admit.
const PRICE_BOUND_SLACK: f64 = 1e-9;

/// Entry point for precompute passes and online similarity queries over one store.
pub struct SimilarityEngine<S: ListingStore> {
    store: Arc<S>,
    provider: Option<Arc<dyn VectorProvider>>,
    config: EngineConfig,
    extra_filters: FilterPipeline,
    shared_cache: Option<Arc<ListingCache>>,
}

impl<S: ListingStore> SimilarityEngine<S> {
    pub fn new(store: Arc<S>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let shared_cache = match config.cache {
            CacheMode::Process => Some(Arc::new(ListingCache::new())),
            CacheMode::Query | CacheMode::Disabled => None,
        };
        Ok(Self {
            store,
            provider: None,
            config,
            extra_filters: FilterPipeline::new(),
            shared_cache,
        })
    }

    #[must_use]
    pub fn with_provider(mut self, provider: Arc<dyn VectorProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Add a filter on top of price band and neighbourhood diversity, for both the
    /// precompute pass and online queries.
    #[must_use]
    pub fn with_filter<F: PairFilter + 'static>(mut self, filter: F) -> Self {
        self.extra_filters = self.extra_filters.with(filter);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The process-wide cache, when enabled.
    pub fn shared_cache(&self) -> Option<&ListingCache> {
        self.shared_cache.as_deref()
    }

    /// Recompute and persist `similar_listings` for the whole catalog.
    pub fn precompute_all(&self, params: &SimilarityParams) -> Result<PersistResult> {
        let result =
            PrecomputeOrchestrator::new(self.store.as_ref(), self.provider.as_deref(), &self.config)
                .with_extra_filters(self.extra_filters.clone())
                .run(params);
        // cleared even on failure: some chunks may already hold new lists
        if let Some(cache) = &self.shared_cache {
            cache.clear();
        }
        result
    }

    /// Online query with the configured parameters and `top_n` results at most.
    pub fn find_similar(&self, reference: ListingId, top_n: usize) -> Result<Vec<ListingId>> {
        self.find_similar_with(reference, &self.config.params.with_top_n(top_n))
    }

    pub fn find_similar_with(
        &self,
        reference: ListingId,
        params: &SimilarityParams,
    ) -> Result<Vec<ListingId>> {
        params.validate()?;
        let query_cache;
        let cache = match self.config.cache {
            CacheMode::Query => {
                query_cache = ListingCache::new();
                Some(&query_cache)
            }
            CacheMode::Process => self.shared_cache.as_deref(),
            CacheMode::Disabled => None,
        };

        let reference = self.fetch(cache, reference)?;
        let reference_embedding = match &reference.embedding {
            Some(embedding) => Cow::Borrowed(embedding),
            None => Cow::Owned(self.embed_reference(&reference)?),
        };
        check_embedding(reference.id, &reference_embedding, None)?;
        let reference_embedding = unit(reference_embedding);

        let mut pool = FeatureTable::new();
        let reference_features = pool.describe(&reference)?;

        let log_price = reference.log_price();
        let min_price = 10f64.powf(log_price - params.max_log_price_diff) * (1.0 - PRICE_BOUND_SLACK);
        let max_price = 10f64.powf(log_price + params.max_log_price_diff) * (1.0 + PRICE_BOUND_SLACK);
        let mut ids = self.store.candidate_ids(min_price, max_price)?;
        ids.sort_unstable();
        ids.dedup();
        ids.retain(|id| *id != reference.id);

        let candidates = self.fetch_many(cache, &ids)?;
        let embeddings = self.build_pool(&candidates, reference_embedding.dim(), &mut pool)?;
        debug!(
            "Online query for listing {}: {} candidates after price prefilter, {} scored pool",
            reference.id,
            ids.len(),
            pool.len()
        );

        let pipeline =
            SimilarityPipeline::with_extra_filters(params, self.config.block_size, &self.extra_filters);
        Ok(pipeline.run_online(
            &reference_features,
            reference_embedding.as_slice(),
            &pool,
            &embeddings,
        ))
    }

    /// The neighbor list written by the last precompute pass.
    pub fn precomputed_similar(&self, reference: ListingId) -> Result<Vec<ListingId>> {
        Ok(self.store.get(reference)?.similar_listings)
    }

    /// Stored neighbors of `reference`, resolved to listings, most similar first.
    pub fn similar_listings(&self, reference: ListingId) -> Result<Vec<Listing>> {
        let ids = self.precomputed_similar(reference)?;
        self.store.get_many(&ids)
    }

    fn fetch(&self, cache: Option<&ListingCache>, id: ListingId) -> Result<Arc<Listing>> {
        match cache {
            Some(cache) => cache.get_through(self.store.as_ref(), id),
            None => self.store.get(id).map(Arc::new),
        }
    }

    fn fetch_many(&self, cache: Option<&ListingCache>, ids: &[ListingId]) -> Result<Vec<Arc<Listing>>> {
        match cache {
            Some(cache) => cache.get_many_through(self.store.as_ref(), ids),
            None => Ok(self.store.get_many(ids)?.into_iter().map(Arc::new).collect()),
        }
    }

    fn embed_reference(&self, listing: &Listing) -> Result<Vector> {
        match (&self.provider, listing.summary.as_deref()) {
            (Some(provider), Some(text)) if !text.trim().is_empty() => provider.embed(text),
            _ => Err(Error::invalid(listing.id, "no embedding available")),
        }
    }

    /// Digest usable candidates into `pool` and return their embeddings, index-aligned.
    /// Candidates without a vector are embedded on the fly (not persisted) when a
    /// provider is configured; anything unusable is skipped.
    fn build_pool(
        &self,
        candidates: &[Arc<Listing>],
        dim: usize,
        pool: &mut FeatureTable,
    ) -> Result<EmbeddingMatrix> {
        let missing: Vec<&Listing> = candidates
            .iter()
            .map(Arc::as_ref)
            .filter(|l| l.embedding.is_none() && l.summary.is_some())
            .collect();
        let mut fresh: AHashMap<ListingId, Vector> = AHashMap::new();
        if let Some(provider) = self.provider.as_ref().filter(|_| !missing.is_empty()) {
            for chunk in missing.chunks(self.config.embed_batch_size) {
                let texts: Vec<String> =
                    chunk.iter().map(|l| l.summary.clone().unwrap_or_default()).collect();
                let vectors = provider.embed_batch(&texts)?;
                if vectors.len() != chunk.len() {
                    return Err(Error::ProviderUnavailable(format!(
                        "provider returned {} vectors for {} texts",
                        vectors.len(),
                        chunk.len()
                    )));
                }
                fresh.extend(chunk.iter().map(|l| l.id).zip(vectors));
            }
        }

        let mut embeddings = EmbeddingMatrix::with_capacity(dim, candidates.len());
        for candidate in candidates {
            let embedding = match candidate.embedding.as_ref().or_else(|| fresh.get(&candidate.id)) {
                Some(embedding) => embedding,
                None => continue,
            };
            if let Err(error) = check_embedding(candidate.id, embedding, Some(dim)) {
                debug!("Skipping candidate {}: {}", candidate.id, error);
                continue;
            }
            if let Err(error) = pool.push(candidate) {
                debug!("Skipping candidate {}: {}", candidate.id, error);
                continue;
            }
            embeddings.push(candidate.id, &unit(Cow::Borrowed(embedding)))?;
        }
        Ok(embeddings)
    }
}

/// Unit-length view of an embedding, normalizing a copy only when needed.
fn unit(embedding: Cow<'_, Vector>) -> Cow<'_, Vector> {
    if embedding.is_unit() {
        embedding
    } else {
        Cow::Owned(embedding.normalized())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryListingStore;

    fn unit_vec(values: &[f32]) -> Vector {
        Vector::new(values.to_vec()).normalized()
    }

    fn scenario_store() -> Arc<MemoryListingStore> {
        Arc::new(MemoryListingStore::from_listings([
            Listing::new(1, 100.0, "G", "X", 0.0, 0.0).with_embedding(unit_vec(&[1.0, 0.0, 0.0])),
            Listing::new(2, 105.0, "G", "Y", 0.0, 5.0).with_embedding(unit_vec(&[1.0, 0.0, 0.0])),
            Listing::new(3, 100.0, "G", "X", 0.0, 0.001).with_embedding(unit_vec(&[0.0, 1.0, 0.0])),
        ]))
    }

    #[test]
    fn test_scenario_online() {
        let engine = SimilarityEngine::new(scenario_store(), EngineConfig::default()).unwrap();
        let similar = engine.find_similar(1, 10).unwrap();
        assert_eq!(similar, vec![2]);
    }

    #[test]
    fn test_unknown_reference_is_not_found() {
        let engine = SimilarityEngine::new(scenario_store(), EngineConfig::default()).unwrap();
        assert!(matches!(engine.find_similar(99, 10), Err(Error::NotFound(99))));
    }

    #[test]
    fn test_precompute_then_read_back() {
        let engine = SimilarityEngine::new(scenario_store(), EngineConfig::default()).unwrap();
        let result = engine.precompute_all(&SimilarityParams::default()).unwrap();
        assert_eq!(result.processed_count, 3);
        assert!(result.failures.is_empty());
        assert_eq!(engine.precomputed_similar(1).unwrap(), vec![2]);
        assert_eq!(engine.precomputed_similar(2).unwrap(), vec![1]);
        assert!(engine.precomputed_similar(3).unwrap().is_empty());

        let resolved = engine.similar_listings(1).unwrap();
        assert_eq!(resolved.len(), 1);
        assert_eq!(resolved[0].id, 2);
    }

    #[test]
    fn test_cache_modes_agree() {
        let store = scenario_store();
        let mut results = Vec::new();
        for cache in [CacheMode::Query, CacheMode::Process, CacheMode::Disabled] {
            let config = EngineConfig {
                cache,
                ..EngineConfig::default()
            };
            let engine = SimilarityEngine::new(Arc::clone(&store), config).unwrap();
            let first = engine.find_similar(2, 10).unwrap();
            let second = engine.find_similar(2, 10).unwrap();
            assert_eq!(first, second);
            results.push(first);
        }
        assert!(results.windows(2).all(|w| w[0] == w[1]));
    }

    #[test]
    fn test_process_cache_cleared_by_precompute() {
        let config = EngineConfig {
            cache: CacheMode::Process,
            ..EngineConfig::default()
        };
        let engine = SimilarityEngine::new(scenario_store(), config).unwrap();
        engine.find_similar(1, 10).unwrap();
        assert!(!engine.shared_cache().unwrap().is_empty());
        engine.precompute_all(&SimilarityParams::default()).unwrap();
        assert!(engine.shared_cache().unwrap().is_empty());
    }

    #[test]
    fn test_extra_filter_applies_to_both_paths() {
        let store = Arc::new(MemoryListingStore::from_listings([
            Listing::new(1, 100.0, "G", "X", 0.0, 0.0)
                .with_embedding(unit_vec(&[1.0, 0.0]))
                .with_room_type("Private room"),
            Listing::new(2, 100.0, "G", "Y", 0.0, 1.0)
                .with_embedding(unit_vec(&[1.0, 0.0]))
                .with_room_type("Entire home/apt"),
            Listing::new(3, 100.0, "G", "Z", 0.0, 2.0).with_embedding(unit_vec(&[1.0, 0.01])),
        ]));
        let engine = SimilarityEngine::new(store, EngineConfig::default())
            .unwrap()
            .with_filter(crate::filter::RoomTypeFilter);
        assert_eq!(engine.find_similar(1, 10).unwrap(), vec![3]);
        engine.precompute_all(&SimilarityParams::default()).unwrap();
        assert_eq!(engine.precomputed_similar(1).unwrap(), vec![3]);
        assert_eq!(engine.precomputed_similar(3).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = EngineConfig {
            block_size: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            SimilarityEngine::new(scenario_store(), config),
            Err(Error::InvalidConfig(_))
        ));
    }

    /// Drops every text it is given.
    struct EmptyProvider;

    impl VectorProvider for EmptyProvider {
        fn dim(&self) -> usize {
            2
        }

        fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vector>> {
            Ok(Vec::new())
        }
    }

    #[test]
    fn test_short_provider_response_fails_both_paths() {
        let store = Arc::new(MemoryListingStore::from_listings([
            Listing::new(1, 100.0, "G", "X", 0.0, 0.0).with_embedding(unit_vec(&[1.0, 0.0])),
            Listing::new(2, 100.0, "G", "Y", 0.0, 1.0).with_summary("Entire home/apt in G"),
        ]));
        let engine = SimilarityEngine::new(store, EngineConfig::default())
            .unwrap()
            .with_provider(Arc::new(EmptyProvider));

        assert!(matches!(
            engine.find_similar(1, 10),
            Err(Error::ProviderUnavailable(_))
        ));
        assert!(matches!(
            engine.precompute_all(&SimilarityParams::default()),
            Err(Error::ProviderUnavailable(_))
        ));
    }
}
