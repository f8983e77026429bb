//! Deterministic Gaussian random projection.
//!
//! Each collection projects its embeddings down to a small fixed dimension
//! before quantization. The matrix is seeded from a hash of the dimension pair,
//! so the same `(input_dim, output_dim)` always yields a bit-identical matrix.
//! Entries are drawn from N(0, 1) and scaled by `1/sqrt(output_dim)`, which
//! preserves expected pairwise distances (Johnson-Lindenstrauss).
//!
//! # Storage Format
//!
//! - Header (16 bytes): magic `CVPM`, version, rows, cols (u32 little-endian)
//! - Body: row-major f32 little-endian, `rows * cols` values

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::error::{IoContext, StoreError, StoreResult};
use crate::storage::write_atomic;

/// File name of the persisted matrix inside a collection directory.
pub const PROJECTION_MATRIX_FILE: &str = "projection_matrix.bin";

/// Magic bytes to identify projection matrix files.
const MAGIC_BYTES: &[u8; 4] = b"CVPM";

/// Current matrix format version.
const FORMAT_VERSION: u32 = 1;

/// Size of the header in bytes.
const HEADER_SIZE: usize = 16;

/// Dense `input_dim x output_dim` projection matrix, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectionMatrix {
    input_dim: usize,
    output_dim: usize,
    data: Vec<f32>,
}

impl ProjectionMatrix {
    #[must_use]
    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    #[must_use]
    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Projects `vector` (length `input_dim`) to `output_dim` components.
    pub fn project(&self, vector: &[f32]) -> StoreResult<Vec<f32>> {
        if vector.len() != self.input_dim {
            return Err(StoreError::DimensionMismatch {
                id: "<projection input>".to_string(),
                expected: self.input_dim,
                actual: vector.len(),
            });
        }

        let mut out = vec![0.0f32; self.output_dim];
        for (value, row) in vector.iter().zip(self.data.chunks_exact(self.output_dim)) {
            if *value == 0.0 {
                continue;
            }
            for (acc, weight) in out.iter_mut().zip(row) {
                *acc += value * weight;
            }
        }
        Ok(out)
    }
}

/// Creates, persists and loads projection matrices.
pub struct ProjectionMatrixManager;

impl ProjectionMatrixManager {
    /// Generates the matrix for a dimension pair.
    ///
    /// Deterministic across calls and process restarts.
    pub fn create_projection_matrix(
        input_dim: usize,
        output_dim: usize,
    ) -> StoreResult<ProjectionMatrix> {
        if input_dim == 0 || output_dim == 0 {
            return Err(StoreError::InvalidArgument {
                reason: format!(
                    "projection dimensions must be non-zero (got {input_dim}x{output_dim})"
                ),
            });
        }

        let mut rng = StdRng::seed_from_u64(seed_for(input_dim, output_dim));
        let scale = 1.0 / (output_dim as f64).sqrt();
        let len = input_dim * output_dim;
        let mut data = Vec::with_capacity(len);

        // Box-Muller yields two independent normals per draw
        while data.len() < len {
            let u1: f64 = 1.0 - rng.random::<f64>();
            let u2: f64 = rng.random::<f64>();
            let radius = (-2.0 * u1.ln()).sqrt();
            let theta = 2.0 * std::f64::consts::PI * u2;
            data.push((radius * theta.cos() * scale) as f32);
            if data.len() < len {
                data.push((radius * theta.sin() * scale) as f32);
            }
        }

        Ok(ProjectionMatrix {
            input_dim,
            output_dim,
            data,
        })
    }

    /// Path of the matrix file inside `collection_dir`.
    #[must_use]
    pub fn matrix_path(collection_dir: &Path) -> PathBuf {
        collection_dir.join(PROJECTION_MATRIX_FILE)
    }

    /// Writes the matrix atomically.
    pub fn save_matrix(collection_dir: &Path, matrix: &ProjectionMatrix) -> StoreResult<()> {
        let mut bytes = Vec::with_capacity(HEADER_SIZE + matrix.data.len() * 4);
        bytes.extend_from_slice(MAGIC_BYTES);
        bytes.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&(matrix.input_dim as u32).to_le_bytes());
        bytes.extend_from_slice(&(matrix.output_dim as u32).to_le_bytes());
        for value in &matrix.data {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        write_atomic(&Self::matrix_path(collection_dir), &bytes)
    }

    /// Loads the matrix. A missing file is a configuration error, never a
    /// reason to regenerate.
    pub fn load_matrix(collection_dir: &Path) -> StoreResult<ProjectionMatrix> {
        let path = Self::matrix_path(collection_dir);
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::ProjectionMatrixNotFound { path });
            }
            Err(e) => return Err(e).with_path(&path),
        };

        if bytes.len() < HEADER_SIZE {
            return Err(StoreError::corrupted(&path, "file shorter than header"));
        }
        if &bytes[0..4] != MAGIC_BYTES {
            return Err(StoreError::corrupted(&path, "invalid magic bytes"));
        }
        let version = read_u32(&bytes, 4);
        if version != FORMAT_VERSION {
            return Err(StoreError::corrupted(
                &path,
                format!("unsupported matrix version {version}"),
            ));
        }
        let input_dim = read_u32(&bytes, 8) as usize;
        let output_dim = read_u32(&bytes, 12) as usize;
        let expected = input_dim
            .checked_mul(output_dim)
            .and_then(|n| n.checked_mul(4))
            .map(|n| n + HEADER_SIZE);
        if expected != Some(bytes.len()) {
            return Err(StoreError::corrupted(
                &path,
                format!(
                    "expected {input_dim}x{output_dim} matrix, file has {} bytes",
                    bytes.len()
                ),
            ));
        }

        let data = bytes[HEADER_SIZE..]
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect();

        Ok(ProjectionMatrix {
            input_dim,
            output_dim,
            data,
        })
    }
}

fn seed_for(input_dim: usize, output_dim: usize) -> u64 {
    let mut hasher = Sha256::new();
    hasher.update(format!("projection:{input_dim}x{output_dim}").as_bytes());
    let digest = hasher.finalize();
    let mut seed = [0u8; 8];
    seed.copy_from_slice(&digest[..8]);
    u64::from_le_bytes(seed)
}

fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}
