//! Persistent indices of a collection.
//!
//! - [`IdIndexManager`]: point id -> record file, compact binary
//! - [`PathIndex`]: source file -> point ids, drives duplicate cleanup
//! - [`HnswIndexManager`]: ANN graph lifecycle and staleness
//! - [`VectorIndexManager`]: legacy Hamming-distance candidates

mod codec;
mod hnsw;
mod id_index;
mod legacy;
mod path_index;

pub use hnsw::{AnnIndex, HNSW_INDEX_FILE, HnswIndexManager};
pub use id_index::{ID_INDEX_FILE, IdIndexManager, IdMap};
pub use legacy::{CODE_BYTES, LEGACY_INDEX_FILE, VectorIndexManager};
pub use path_index::{PATH_INDEX_FILE, PathIndex};
