//! Type-safe wrappers for vector dimensions.

use crate::error::{StoreError, StoreResult};

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent dimension
/// mismatches between a collection and the vectors written into it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> StoreResult<Self> {
        if dim == 0 {
            return Err(StoreError::InvalidArgument {
                reason: "Vector dimension cannot be zero".to_string(),
            });
        }
        Ok(Self(dim))
    }

    /// Returns the underlying dimension value.
    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that the vector of point `id` has the expected dimension.
    pub fn validate_vector(&self, id: &str, vector: &[f32]) -> StoreResult<()> {
        if vector.len() != self.0 {
            return Err(StoreError::DimensionMismatch {
                id: id.to_string(),
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
