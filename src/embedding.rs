//! Embedding provider seam.
//!
//! The store never generates embeddings itself; callers hand it an
//! [`EmbeddingProvider`]. With the `fastembed` feature a local
//! AllMiniLML6V2 implementation is available.

use thiserror::Error;

/// Errors raised by embedding providers
#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error(
        "Failed to initialize embedding model: {0}\nSuggestion: Ensure the model can be downloaded or is cached"
    )]
    ModelInit(String),

    #[error("Embedding generation failed: {0}")]
    Generation(String),

    #[error("Embedding provider panicked or was poisoned")]
    Poisoned,
}

/// Trait for turning query text into a vector.
///
/// Implementations must be thread-safe: `search` calls `embed` on a worker
/// thread while the index loads on another.
pub trait EmbeddingProvider: Send + Sync {
    /// Generate the embedding for a single text.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Name of the model, recorded for diagnostics.
    fn model_name(&self) -> &str {
        "unknown"
    }
}

#[cfg(feature = "fastembed")]
pub use local::FastEmbedProvider;

#[cfg(feature = "fastembed")]
mod local {
    use super::{EmbeddingError, EmbeddingProvider};
    use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
    use std::path::PathBuf;
    use std::sync::Mutex;

    /// FastEmbed implementation using AllMiniLML6V2 (384 dimensions).
    pub struct FastEmbedProvider {
        model: Mutex<TextEmbedding>,
    }

    impl FastEmbedProvider {
        pub fn new(cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
            let model = TextEmbedding::try_new(
                InitOptions::new(EmbeddingModel::AllMiniLML6V2)
                    .with_cache_dir(cache_dir)
                    .with_show_download_progress(false),
            )
            .map_err(|e| EmbeddingError::ModelInit(e.to_string()))?;

            Ok(Self {
                model: Mutex::new(model),
            })
        }
    }

    impl EmbeddingProvider for FastEmbedProvider {
        fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
            let mut model = self.model.lock().map_err(|_| EmbeddingError::Poisoned)?;
            let embeddings = model
                .embed(vec![text], None)
                .map_err(|e| EmbeddingError::Generation(e.to_string()))?;
            embeddings
                .into_iter()
                .next()
                .ok_or_else(|| EmbeddingError::Generation("model returned no embedding".into()))
        }

        fn model_name(&self) -> &str {
            "AllMiniLML6V2"
        }
    }
}
