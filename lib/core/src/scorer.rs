//! Cosine scoring over unit-norm embeddings.
//!
//! Embeddings are stored contiguously, one row per listing. Batch scoring walks the
//! catalog in row blocks so only `block_size × n` scores are alive per block; every
//! score is produced by the same dot-product kernel, so blocking never changes a value.

use crate::{Error, ListingId, Result, Vector};
use std::ops::Range;

pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Row-major n×d matrix of embeddings.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    dim: usize,
    data: Vec<f32>,
}

impl EmbeddingMatrix {
    pub fn new(dim: usize) -> Self {
        Self {
            dim,
            data: Vec::new(),
        }
    }

    pub fn with_capacity(dim: usize, rows: usize) -> Self {
        Self {
            dim,
            data: Vec::with_capacity(dim * rows),
        }
    }

    /// Append one embedding as the next row.
    pub fn push(&mut self, id: ListingId, vector: &Vector) -> Result<()> {
        if vector.dim() != self.dim {
            return Err(Error::InvalidAttribute {
                id,
                reason: format!("embedding dimension {} (expected {})", vector.dim(), self.dim),
            });
        }
        self.data.extend_from_slice(vector.as_slice());
        Ok(())
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    #[inline]
    pub fn len(&self) -> usize {
        if self.dim == 0 {
            0
        } else {
            self.data.len() / self.dim
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dim;
        &self.data[start..start + self.dim]
    }
}

/// Scores for references `start..start + rows` against every row of the matrix.
#[derive(Debug, Clone)]
pub struct ScoreBlock {
    start: usize,
    cols: usize,
    scores: Vec<f32>,
}

impl ScoreBlock {
    #[inline]
    pub fn rows(&self) -> Range<usize> {
        let rows = if self.cols == 0 { 0 } else { self.scores.len() / self.cols };
        self.start..self.start + rows
    }

    /// Scores of global reference row `row` against the whole pool.
    #[inline]
    pub fn row(&self, row: usize) -> &[f32] {
        let offset = (row - self.start) * self.cols;
        &self.scores[offset..offset + self.cols]
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SimilarityScorer {
    block_size: usize,
}

impl Default for SimilarityScorer {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE)
    }
}

impl SimilarityScorer {
    pub fn new(block_size: usize) -> Self {
        Self {
            block_size: block_size.max(1),
        }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Row ranges covering `0..n` in order.
    pub fn blocks(&self, n: usize) -> Vec<Range<usize>> {
        (0..n)
            .step_by(self.block_size)
            .map(|start| start..(start + self.block_size).min(n))
            .collect()
    }

    /// Self-product restricted to `rows`.
    pub fn score_block(&self, matrix: &EmbeddingMatrix, rows: Range<usize>) -> ScoreBlock {
        let n = matrix.len();
        let mut scores = Vec::with_capacity(rows.len() * n);
        for i in rows.clone() {
            let reference = matrix.row(i);
            scores.extend((0..n).map(|j| crate::simd::dot_product_simd(reference, matrix.row(j))));
        }
        ScoreBlock {
            start: rows.start,
            cols: n,
            scores,
        }
    }

    /// Unblocked n×n self-product. Materializes every score; tests and small pools only.
    pub fn score_all(&self, matrix: &EmbeddingMatrix) -> Vec<f32> {
        self.score_block(matrix, 0..matrix.len()).scores
    }

    /// One reference against the selected rows only, in `rows` order.
    pub fn score_rows(&self, reference: &[f32], matrix: &EmbeddingMatrix, rows: &[usize]) -> Vec<f32> {
        rows.iter()
            .map(|&j| crate::simd::dot_product_simd(reference, matrix.row(j)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix(rows: &[Vec<f32>]) -> EmbeddingMatrix {
        let mut m = EmbeddingMatrix::new(rows[0].len());
        for (i, r) in rows.iter().enumerate() {
            m.push(i as u64, &Vector::new(r.clone()).normalized()).unwrap();
        }
        m
    }

    fn pseudo_random_rows(n: usize, dim: usize) -> Vec<Vec<f32>> {
        (0..n)
            .map(|i| (0..dim).map(|k| ((i * 31 + k * 17) as f32 * 0.173).sin()).collect())
            .collect()
    }

    #[test]
    fn test_blocks_cover_all_rows() {
        let scorer = SimilarityScorer::new(4);
        assert_eq!(scorer.blocks(10), vec![0..4, 4..8, 8..10]);
        assert!(scorer.blocks(0).is_empty());
    }

    #[test]
    fn test_blocked_scores_equal_unblocked() {
        let m = matrix(&pseudo_random_rows(23, 40));
        let full = SimilarityScorer::new(1000).score_all(&m);

        for block_size in [1, 3, 7, 23] {
            let scorer = SimilarityScorer::new(block_size);
            for rows in scorer.blocks(m.len()) {
                let block = scorer.score_block(&m, rows.clone());
                for i in rows {
                    assert_eq!(block.row(i), &full[i * m.len()..(i + 1) * m.len()]);
                }
            }
        }
    }

    #[test]
    fn test_online_scores_equal_batch_row() {
        let m = matrix(&pseudo_random_rows(9, 33));
        let scorer = SimilarityScorer::default();
        let full = scorer.score_all(&m);
        let all: Vec<usize> = (0..9).collect();
        let online = scorer.score_rows(m.row(4), &m, &all);
        assert_eq!(online.as_slice(), &full[4 * 9..5 * 9]);

        let subset = scorer.score_rows(m.row(4), &m, &[8, 1]);
        assert_eq!(subset, vec![full[4 * 9 + 8], full[4 * 9 + 1]]);
    }

    #[test]
    fn test_self_similarity_is_one() {
        let m = matrix(&pseudo_random_rows(5, 16));
        let full = SimilarityScorer::default().score_all(&m);
        for i in 0..5 {
            assert!((full[i * 5 + i] - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_push_rejects_wrong_dimension() {
        let mut m = EmbeddingMatrix::new(3);
        let err = m.push(7, &Vector::new(vec![1.0, 0.0])).unwrap_err();
        assert!(matches!(err, Error::InvalidAttribute { id: 7, .. }));
    }
}
