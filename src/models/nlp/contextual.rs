use std::error::Error as StdError;

use crate::error::{Error, Result};
use crate::io::embedding::Embeddings;

pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Provider of per-token vectors computed outside the model, e.g. by a
/// pretrained transformer.
pub trait ContextualEmbedder: Send + Sync {
    fn dim(&self) -> usize;

    /// One vector of length `dim()` per token.
    fn embed(&self, tokens: &[&str]) -> std::result::Result<Vec<Vec<f32>>, BoxError>;
}

/// Embeds every sentence and checks the vectors returned by `embedder`.
pub fn embed_sentences<E, S>(embedder: &E, sentences: &[&[S]]) -> Result<Vec<Vec<Vec<f32>>>>
where
    E: ContextualEmbedder + ?Sized,
    S: AsRef<str>,
{
    let dim = embedder.dim();
    sentences
        .iter()
        .map(|tokens| {
            let tokens: Vec<&str> = tokens.iter().map(|t| t.as_ref()).collect();
            let vectors = embedder
                .embed(&tokens)
                .map_err(|e| Error::Contextual(e.to_string()))?;
            if vectors.len() != tokens.len() {
                return Err(Error::Contextual(format!(
                    "got {} vectors for {} tokens",
                    vectors.len(),
                    tokens.len()
                )));
            }
            if let Some(v) = vectors.iter().find(|v| v.len() != dim) {
                return Err(Error::Contextual(format!(
                    "got a vector of dimension {}, expected {}",
                    v.len(),
                    dim
                )));
            }
            Ok(vectors)
        })
        .collect()
}

/// Context-free vectors read from a table; unknown tokens get the `UNK` row.
#[derive(Debug, Clone)]
pub struct TableEmbedder {
    table: Embeddings,
}

impl TableEmbedder {
    pub fn new(table: Embeddings) -> Self {
        TableEmbedder { table }
    }
}

impl ContextualEmbedder for TableEmbedder {
    fn dim(&self) -> usize {
        self.table.dim()
    }

    fn embed(&self, tokens: &[&str]) -> std::result::Result<Vec<Vec<f32>>, BoxError> {
        Ok(tokens
            .iter()
            .map(|t| self.table.lookup(t).to_vec())
            .collect())
    }
}
