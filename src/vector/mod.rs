//! Vector math used by the store.
//!
//! Projection and quantization turn an embedding into a directory path for
//! sharding point files on disk. Exact cosine similarity re-scores ANN
//! candidates before results are returned.

mod projection;
mod quantizer;
mod similarity;
mod types;

pub use projection::{PROJECTION_MATRIX_FILE, ProjectionMatrix, ProjectionMatrixManager};
pub use quantizer::{QuantizationMode, VectorQuantizer, analytic_range};
pub use similarity::cosine_similarity;
pub use types::VectorDimension;
