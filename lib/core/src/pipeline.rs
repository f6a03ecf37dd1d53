//! Filter → score → select, shared by the batch pass and online queries.
//!
//! The batch path scores every pool row against the whole pool in row blocks and masks
//! afterwards; the online path masks first and scores only the admitted candidates.
//! Both feed the same floor and selector, so a listing's online result matches the row
//! the batch pass computes for it over the same pool.

use crate::config::SimilarityParams;
use crate::filter::{CandidateMask, FilterPipeline, SimilarityFloor};
use crate::listing::{FeatureTable, ListingFeatures, ListingId};
use crate::scorer::{EmbeddingMatrix, SimilarityScorer};
use crate::select::{Scored, TopKSelector};
use rayon::prelude::*;
use std::ops::Range;

#[derive(Debug)]
pub struct SimilarityPipeline {
    filters: FilterPipeline,
    floor: SimilarityFloor,
    scorer: SimilarityScorer,
    selector: TopKSelector,
}

impl SimilarityPipeline {
    /// Standard filters (price band, neighbourhood diversity) for `params`.
    pub fn new(params: &SimilarityParams, block_size: usize) -> Self {
        Self::with_filters(params, block_size, FilterPipeline::standard(params.max_log_price_diff))
    }

    /// Standard filters followed by `extra`.
    pub fn with_extra_filters(params: &SimilarityParams, block_size: usize, extra: &FilterPipeline) -> Self {
        let mut filters = FilterPipeline::standard(params.max_log_price_diff);
        filters.extend(extra);
        Self::with_filters(params, block_size, filters)
    }

    pub fn with_filters(params: &SimilarityParams, block_size: usize, filters: FilterPipeline) -> Self {
        Self {
            filters,
            floor: SimilarityFloor::new(params.min_similarity),
            scorer: SimilarityScorer::new(block_size),
            selector: TopKSelector::new(
                params.top_n,
                params.superset_factor,
                params.min_distance_miles,
            ),
        }
    }

    pub fn filters(&self) -> &FilterPipeline {
        &self.filters
    }

    pub fn selector(&self) -> &TopKSelector {
        &self.selector
    }

    /// Neighbor ids for every pool row, index-aligned with `pool`.
    ///
    /// Row blocks share nothing mutable, so with `parallel` they run on the rayon pool;
    /// results are concatenated in block order either way.
    pub fn run_batch(
        &self,
        pool: &FeatureTable,
        embeddings: &EmbeddingMatrix,
        parallel: bool,
    ) -> Vec<Vec<ListingId>> {
        debug_assert_eq!(pool.len(), embeddings.len());
        let blocks = self.scorer.blocks(pool.len());
        let per_block: Vec<Vec<Vec<ListingId>>> = if parallel {
            blocks
                .into_par_iter()
                .map(|rows| self.process_block(pool, embeddings, rows))
                .collect()
        } else {
            blocks
                .into_iter()
                .map(|rows| self.process_block(pool, embeddings, rows))
                .collect()
        };
        per_block.into_iter().flatten().collect()
    }

    fn process_block(
        &self,
        pool: &FeatureTable,
        embeddings: &EmbeddingMatrix,
        rows: Range<usize>,
    ) -> Vec<Vec<ListingId>> {
        let scores = self.scorer.score_block(embeddings, rows.clone());
        let mask = self.filters.block_mask(pool.as_slice(), rows.clone());

        rows.enumerate()
            .map(|(offset, i)| {
                let row_scores = scores.row(i);
                let candidates = self.admissible(&mask, offset, pool, |col| row_scores[col]);
                self.selector.select_ids(pool.get(i), candidates, pool.as_slice())
            })
            .collect()
    }

    /// Neighbors of `reference` among `pool`. Only mask-admitted candidates are scored.
    pub fn run_online(
        &self,
        reference: &ListingFeatures,
        reference_embedding: &[f32],
        pool: &FeatureTable,
        embeddings: &EmbeddingMatrix,
    ) -> Vec<ListingId> {
        debug_assert_eq!(pool.len(), embeddings.len());
        let mask = self.filters.row_mask(reference, pool.as_slice());
        let admitted: Vec<usize> = mask
            .admitted(0)
            .filter(|&col| pool.get(col).id != reference.id)
            .collect();
        let scores = self.scorer.score_rows(reference_embedding, embeddings, &admitted);

        let candidates = admitted
            .iter()
            .zip(scores)
            .filter(|(_, score)| self.floor.admits(*score))
            .map(|(&index, score)| Scored {
                index,
                id: pool.get(index).id,
                score,
            })
            .collect();
        self.selector.select_ids(reference, candidates, pool.as_slice())
    }

    fn admissible(
        &self,
        mask: &CandidateMask,
        row: usize,
        pool: &FeatureTable,
        score_of: impl Fn(usize) -> f32,
    ) -> Vec<Scored> {
        mask.admitted(row)
            .filter_map(|index| {
                let score = score_of(index);
                self.floor.admits(score).then(|| Scored {
                    index,
                    id: pool.get(index).id,
                    score,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::listing::Listing;
    use crate::Vector;

    fn unit(values: &[f32]) -> Vector {
        Vector::new(values.to_vec()).normalized()
    }

    /// Twelve listings spread over four neighbourhoods with near-parallel embeddings.
    fn catalog() -> (FeatureTable, EmbeddingMatrix) {
        let mut pool = FeatureTable::new();
        let mut embeddings = EmbeddingMatrix::new(4);
        for i in 0..12u64 {
            let listing = Listing::new(
                100 + i,
                80.0 + 5.0 * i as f64,
                "Brooklyn",
                format!("hood-{}", i % 4),
                40.60 + 0.03 * i as f64,
                -73.95,
            );
            pool.push(&listing).unwrap();
            let t = i as f32 * 0.03;
            embeddings.push(listing.id, &unit(&[1.0, t, 0.5 * t, 0.1])).unwrap();
        }
        (pool, embeddings)
    }

    fn params() -> SimilarityParams {
        SimilarityParams::default().with_top_n(3)
    }

    #[test]
    fn test_batch_is_block_size_and_thread_independent() {
        let (pool, embeddings) = catalog();
        let reference = SimilarityPipeline::new(&params(), 1000).run_batch(&pool, &embeddings, false);
        for block_size in [1, 5, 12] {
            let pipeline = SimilarityPipeline::new(&params(), block_size);
            assert_eq!(pipeline.run_batch(&pool, &embeddings, false), reference);
            assert_eq!(pipeline.run_batch(&pool, &embeddings, true), reference);
        }
    }

    #[test]
    fn test_online_matches_batch() {
        let (pool, embeddings) = catalog();
        let pipeline = SimilarityPipeline::new(&params(), 4);
        let batch = pipeline.run_batch(&pool, &embeddings, true);
        assert!(batch.iter().any(|row| !row.is_empty()));

        for (i, expected) in batch.iter().enumerate() {
            let online = pipeline.run_online(pool.get(i), embeddings.row(i), &pool, &embeddings);
            assert_eq!(&online, expected, "row {}", i);
        }
    }

    #[test]
    fn test_results_respect_every_constraint() {
        let (pool, embeddings) = catalog();
        let p = params();
        let pipeline = SimilarityPipeline::new(&p, 4);
        let scorer = SimilarityScorer::default();
        let n = pool.len();
        let scores = scorer.score_all(&embeddings);

        for (i, row) in pipeline.run_batch(&pool, &embeddings, false).iter().enumerate() {
            let reference = pool.get(i);
            assert!(row.len() <= p.top_n);
            assert!(!row.contains(&reference.id));
            let picked: Vec<usize> = row
                .iter()
                .map(|id| pool.as_slice().iter().position(|f| f.id == *id).unwrap())
                .collect();
            for &j in &picked {
                let candidate = pool.get(j);
                assert_ne!(candidate.neighbourhood, reference.neighbourhood);
                assert!((candidate.log_price - reference.log_price).abs() <= p.max_log_price_diff);
                assert!(scores[i * n + j] > p.min_similarity);
                assert!(reference.geo.haversine_miles(&candidate.geo) >= p.min_distance_miles);
            }
            for pair in picked.windows(2) {
                let (a, b) = (scores[i * n + pair[0]], scores[i * n + pair[1]]);
                assert!(a > b || (a == b && pool.get(pair[0]).id < pool.get(pair[1]).id));
            }
        }
    }

    #[test]
    fn test_extra_filters_narrow_results() {
        let (pool, embeddings) = catalog();
        let p = params();
        let plain = SimilarityPipeline::new(&p, 4).run_batch(&pool, &embeddings, false);
        let extra = FilterPipeline::new().with(crate::filter::PriceBandFilter::new(0.01));
        let narrowed = SimilarityPipeline::with_extra_filters(&p, 4, &extra);
        assert_eq!(narrowed.filters().names(), vec!["price_band", "neighbourhood", "price_band"]);

        let rows = narrowed.run_batch(&pool, &embeddings, false);
        for (wide, narrow) in plain.iter().zip(&rows) {
            assert!(narrow.len() <= wide.len());
        }
        assert!(rows.iter().map(Vec::len).sum::<usize>() < plain.iter().map(Vec::len).sum::<usize>());
    }

    #[test]
    fn test_floor_rejects_dissimilar_candidates() {
        let mut pool = FeatureTable::new();
        let mut embeddings = EmbeddingMatrix::new(2);
        for (id, hood, lat, v) in [
            (1u64, "x", 40.0, [1.0f32, 0.0]),
            (2, "y", 40.5, [0.0, 1.0]),
            (3, "z", 41.0, [1.0, 0.05]),
        ] {
            let listing = Listing::new(id, 100.0, "NYC", hood, lat, -74.0);
            pool.push(&listing).unwrap();
            embeddings.push(id, &unit(&v)).unwrap();
        }
        let pipeline = SimilarityPipeline::new(&SimilarityParams::default(), 8);
        let batch = pipeline.run_batch(&pool, &embeddings, false);
        assert_eq!(batch[0], vec![3]);
        assert!(batch[1].is_empty());
        assert_eq!(batch[2], vec![1]);
    }
}
