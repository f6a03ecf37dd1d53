// Two-stage top-k: rank by score, then enforce geographic separation on the shortlist
use crate::listing::{ListingFeatures, ListingId};
use ordered_float::OrderedFloat;
use std::cmp::{Ordering, Reverse};

/// An admissible candidate: its index in the pool and its score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scored {
    pub index: usize,
    pub id: ListingId,
    pub score: f32,
}

impl Scored {
    /// Higher score first, then lower id.
    #[inline]
    fn rank_key(&self) -> (Reverse<OrderedFloat<f32>>, ListingId) {
        (Reverse(OrderedFloat(self.score)), self.id)
    }

    #[inline]
    fn rank_cmp(&self, other: &Self) -> Ordering {
        self.rank_key().cmp(&other.rank_key())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TopKSelector {
    top_n: usize,
    shortlist: usize,
    min_distance_miles: f64,
}

impl TopKSelector {
    pub fn new(top_n: usize, superset_factor: usize, min_distance_miles: f64) -> Self {
        Self {
            top_n,
            shortlist: top_n.saturating_mul(superset_factor.max(1)),
            min_distance_miles,
        }
    }

    #[inline]
    pub fn top_n(&self) -> usize {
        self.top_n
    }

    /// Size of the stage-one shortlist.
    #[inline]
    pub fn shortlist_len(&self) -> usize {
        self.shortlist
    }

    /// Stage one: drop the reference itself, order by (score desc, id asc) and keep the
    /// shortlist.
    pub fn rank(&self, reference: ListingId, mut candidates: Vec<Scored>) -> Vec<Scored> {
        candidates.retain(|c| c.id != reference);
        if candidates.len() > self.shortlist {
            if self.shortlist == 0 {
                return Vec::new();
            }
            candidates.select_nth_unstable_by(self.shortlist - 1, Scored::rank_cmp);
            candidates.truncate(self.shortlist);
        }
        candidates.sort_unstable_by(Scored::rank_cmp);
        candidates
    }

    /// Both stages. `pool` is indexed by `Scored::index`.
    pub fn select(
        &self,
        reference: &ListingFeatures,
        candidates: Vec<Scored>,
        pool: &[ListingFeatures],
    ) -> Vec<Scored> {
        let mut selected = Vec::with_capacity(self.top_n.min(candidates.len()));
        for candidate in self.rank(reference.id, candidates) {
            if selected.len() == self.top_n {
                break;
            }
            let distance = reference.geo.haversine_miles(&pool[candidate.index].geo);
            if distance >= self.min_distance_miles {
                selected.push(candidate);
            }
        }
        selected
    }

    pub fn select_ids(
        &self,
        reference: &ListingFeatures,
        candidates: Vec<Scored>,
        pool: &[ListingFeatures],
    ) -> Vec<ListingId> {
        self.select(reference, candidates, pool)
            .into_iter()
            .map(|c| c.id)
            .collect()
    }
}
