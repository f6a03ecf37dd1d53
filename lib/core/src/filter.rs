// Heuristic admissibility filters over (reference, candidate) listing pairs
use crate::listing::ListingFeatures;
use std::fmt;
use std::sync::Arc;

/// A hard admissibility predicate between a reference listing and a candidate.
///
/// Filters whose attribute is missing on either side must admit the pair: an absent
/// optional value never rejects (or rescues) a candidate on its own.
pub trait PairFilter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool;

    /// AND this filter into one mask row. Override when a filter can do better than a
    /// per-pair loop.
    fn apply_row(&self, reference: &ListingFeatures, pool: &[ListingFeatures], row: &mut [bool]) {
        for (admissible, candidate) in row.iter_mut().zip(pool) {
            if *admissible {
                *admissible = self.matches(reference, candidate);
            }
        }
    }
}

/// |log10(price) - log10(reference price)| <= max_log_diff, prices below 1 lifted to 1.
#[derive(Debug, Clone, Copy)]
pub struct PriceBandFilter {
    max_log_diff: f64,
}

impl PriceBandFilter {
    pub fn new(max_log_diff: f64) -> Self {
        Self { max_log_diff }
    }
}

impl PairFilter for PriceBandFilter {
    fn name(&self) -> &'static str {
        "price_band"
    }

    #[inline]
    fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool {
        (candidate.log_price - reference.log_price).abs() <= self.max_log_diff
    }
}

/// Only candidates from a different neighbourhood are admissible.
#[derive(Debug, Clone, Copy, Default)]
pub struct NeighbourhoodFilter;

impl PairFilter for NeighbourhoodFilter {
    fn name(&self) -> &'static str {
        "neighbourhood"
    }

    #[inline]
    fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool {
        candidate.neighbourhood != reference.neighbourhood
    }
}

/// Same room type, when both sides declare one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoomTypeFilter;

impl PairFilter for RoomTypeFilter {
    fn name(&self) -> &'static str {
        "room_type"
    }

    fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool {
        match (reference.room_type, candidate.room_type) {
            (Some(a), Some(b)) => a == b,
            _ => true,
        }
    }
}

/// Bedroom counts within `max_diff`, when both sides declare one.
#[derive(Debug, Clone, Copy)]
pub struct BedroomsFilter {
    max_diff: u32,
}

impl BedroomsFilter {
    pub fn new(max_diff: u32) -> Self {
        Self { max_diff }
    }
}

impl PairFilter for BedroomsFilter {
    fn name(&self) -> &'static str {
        "bedrooms"
    }

    fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool {
        match (reference.bedrooms, candidate.bedrooms) {
            (Some(a), Some(b)) => a.abs_diff(b) <= self.max_diff,
            _ => true,
        }
    }
}

/// Post-scoring floor: a score at or below `min` is inadmissible.
#[derive(Debug, Clone, Copy)]
pub struct SimilarityFloor {
    min: f32,
}

impl SimilarityFloor {
    pub fn new(min: f32) -> Self {
        Self { min }
    }

    #[inline]
    pub fn admits(&self, score: f32) -> bool {
        score > self.min
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }
}

/// Row-major boolean admissibility relation: one row per reference, one column per
/// pool member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMask {
    rows: usize,
    cols: usize,
    bits: Vec<bool>,
}

impl CandidateMask {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            bits: vec![true; rows * cols],
        }
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn row(&self, row: usize) -> &[bool] {
        &self.bits[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn row_mut(&mut self, row: usize) -> &mut [bool] {
        &mut self.bits[row * self.cols..(row + 1) * self.cols]
    }

    #[inline]
    pub fn is_admissible(&self, row: usize, col: usize) -> bool {
        self.bits[row * self.cols + col]
    }

    pub fn count_admissible(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Admissible column indices of one row.
    pub fn admitted(&self, row: usize) -> impl Iterator<Item = usize> + '_ {
        self.row(row)
            .iter()
            .enumerate()
            .filter_map(|(col, admissible)| admissible.then_some(col))
    }
}

/// Conjunction of pair filters.
#[derive(Debug, Clone, Default)]
pub struct FilterPipeline {
    filters: Vec<Arc<dyn PairFilter>>,
}

impl FilterPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// Price band plus neighbourhood diversity.
    pub fn standard(max_log_price_diff: f64) -> Self {
        Self::new()
            .with(PriceBandFilter::new(max_log_price_diff))
            .with(NeighbourhoodFilter)
    }

    #[must_use]
    pub fn with<F: PairFilter + 'static>(mut self, filter: F) -> Self {
        self.filters.push(Arc::new(filter));
        self
    }

    pub fn push(&mut self, filter: Arc<dyn PairFilter>) {
        self.filters.push(filter);
    }

    pub fn extend(&mut self, filters: &FilterPipeline) {
        self.filters.extend(filters.filters.iter().cloned());
    }

    pub fn len(&self) -> usize {
        self.filters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.filters.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.filters.iter().map(|f| f.name()).collect()
    }

    pub fn matches(&self, reference: &ListingFeatures, candidate: &ListingFeatures) -> bool {
        self.filters.iter().all(|f| f.matches(reference, candidate))
    }

    pub fn fill_row(&self, reference: &ListingFeatures, pool: &[ListingFeatures], row: &mut [bool]) {
        row.fill(true);
        for filter in &self.filters {
            filter.apply_row(reference, pool, row);
        }
    }

    /// 1×n mask of `reference` against `pool`.
    pub fn row_mask(&self, reference: &ListingFeatures, pool: &[ListingFeatures]) -> CandidateMask {
        let mut mask = CandidateMask::new(1, pool.len());
        self.fill_row(reference, pool, mask.row_mut(0));
        mask
    }

    /// Mask for pool rows `rows.start..rows.end` against the whole pool.
    pub fn block_mask(&self, pool: &[ListingFeatures], rows: std::ops::Range<usize>) -> CandidateMask {
        let mut mask = CandidateMask::new(rows.len(), pool.len());
        for (offset, reference) in pool[rows].iter().enumerate() {
            self.fill_row(reference, pool, mask.row_mut(offset));
        }
        mask
    }

    /// Full n×n mask. Only sensible for small pools.
    pub fn full_mask(&self, pool: &[ListingFeatures]) -> CandidateMask {
        self.block_mask(pool, 0..pool.len())
    }
}
