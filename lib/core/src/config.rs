use crate::scorer::DEFAULT_BLOCK_SIZE;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Knobs shared by the precompute pass and online queries.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityParams {
    pub top_n: usize,
    pub max_log_price_diff: f64,
    pub min_similarity: f32,
    pub min_distance_miles: f64,
    /// Stage-one shortlist is `top_n * superset_factor` candidates.
    pub superset_factor: usize,
}

impl Default for SimilarityParams {
    fn default() -> Self {
        Self {
            top_n: 10,
            max_log_price_diff: 0.3,
            min_similarity: 0.9,
            min_distance_miles: 1.0,
            superset_factor: 10,
        }
    }
}

impl SimilarityParams {
    #[must_use]
    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.top_n == 0 {
            return Err(Error::InvalidConfig("top_n must be at least 1".into()));
        }
        if self.superset_factor == 0 {
            return Err(Error::InvalidConfig("superset_factor must be at least 1".into()));
        }
        if !(self.max_log_price_diff >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "max_log_price_diff must be non-negative, got {}",
                self.max_log_price_diff
            )));
        }
        if !(-1.0..=1.0).contains(&self.min_similarity) {
            return Err(Error::InvalidConfig(format!(
                "min_similarity must lie in [-1, 1], got {}",
                self.min_similarity
            )));
        }
        if !(self.min_distance_miles >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "min_distance_miles must be non-negative, got {}",
                self.min_distance_miles
            )));
        }
        Ok(())
    }
}

/// Scope of the online listing cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheMode {
    /// Fresh cache for every query
    #[default]
    Query,
    /// One cache shared by all queries, cleared after each precompute pass
    Process,
    Disabled,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    #[serde(flatten)]
    pub params: SimilarityParams,
    /// Reference rows scored together in the batch pass.
    pub block_size: usize,
    /// Score row blocks on the rayon pool.
    pub parallel: bool,
    /// Listings written per store transaction.
    pub write_batch_size: usize,
    /// Texts sent per vector provider call.
    pub embed_batch_size: usize,
    pub cache: CacheMode,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            params: SimilarityParams::default(),
            block_size: DEFAULT_BLOCK_SIZE,
            parallel: true,
            write_batch_size: 250,
            embed_batch_size: 32,
            cache: CacheMode::Query,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        self.params.validate()?;
        for (name, value) in [
            ("block_size", self.block_size),
            ("write_batch_size", self.write_batch_size),
            ("embed_batch_size", self.embed_batch_size),
        ] {
            if value == 0 {
                return Err(Error::InvalidConfig(format!("{} must be at least 1", name)));
            }
        }
        Ok(())
    }
}
