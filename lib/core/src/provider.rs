use crate::{Result, Vector};

/// Maps listing text representations to unit-norm embeddings.
///
/// Implementations wrap an embedding model; failures should surface as
/// `Error::ProviderUnavailable`.
pub trait VectorProvider: Send + Sync {
    /// Output dimension
    fn dim(&self) -> usize;

    /// One vector per input text, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vector>>;

    fn embed(&self, text: &str) -> Result<Vector> {
        let mut vectors = self.embed_batch(&[text.to_string()])?;
        vectors.pop().ok_or_else(|| {
            crate::Error::ProviderUnavailable("provider returned no vector".to_string())
        })
    }
}
