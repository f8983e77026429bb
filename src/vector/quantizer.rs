//! Embedding to directory-path quantization.
//!
//! A vector is projected down to `reduced_dim` components, each component is
//! bucketed into a 2-bit symbol, and pairs of symbols are packed into hex
//! nibbles. With the default 64 components this yields a 32 character hex
//! string which is then cut into directory segments:
//!
//! ```text
//! depth_factor = 4:  a3/0f/9c/12/<remaining 24 chars>
//! ```
//!
//! The resulting path shards point files across directories. It is not used
//! for ranking; nearest-neighbor search goes through the ANN index.

use std::path::PathBuf;

use crate::config::QuantizationStrategy;
use crate::error::{StoreError, StoreResult};
use crate::vector::ProjectionMatrix;

/// Number of standard deviations covered by the analytic range.
const RANGE_SIGMAS: f32 = 3.0;

/// Bucketing mode for a single quantization.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantizationMode {
    /// Four equal-width buckets over `[min, max]`; values outside are clamped.
    Range { min: f32, max: f32 },
    /// Thresholds at the 25th/50th/75th percentile of the vector itself.
    Quartile,
}

impl QuantizationMode {
    /// Mode for a collection given its configured strategy and stored range.
    #[must_use]
    pub fn from_strategy(strategy: QuantizationStrategy, range: (f32, f32)) -> Self {
        match strategy {
            QuantizationStrategy::Range => Self::Range {
                min: range.0,
                max: range.1,
            },
            QuantizationStrategy::Quartile => Self::Quartile,
        }
    }
}

/// Analytic quantization range for a projection `input_dim -> output_dim`.
///
/// Assumes unit-variance input components, so each projected component has
/// standard deviation `sqrt(input_dim / output_dim)`. The range is +/- 3 sigma.
#[must_use]
pub fn analytic_range(input_dim: usize, output_dim: usize) -> (f32, f32) {
    let sigma = (input_dim as f32 / output_dim.max(1) as f32).sqrt();
    (-RANGE_SIGMAS * sigma, RANGE_SIGMAS * sigma)
}

/// Stateless quantizer configured with the directory depth.
#[derive(Debug, Clone, Copy)]
pub struct VectorQuantizer {
    depth_factor: usize,
    reduced_dim: usize,
}

impl VectorQuantizer {
    pub fn new(depth_factor: usize, reduced_dim: usize) -> StoreResult<Self> {
        if reduced_dim == 0 || reduced_dim % 2 != 0 {
            return Err(StoreError::Config {
                reason: format!("reduced_dim must be a positive even number, got {reduced_dim}"),
            });
        }
        let hex_len = reduced_dim / 2;
        if depth_factor * 2 >= hex_len {
            return Err(StoreError::Config {
                reason: format!(
                    "depth_factor {depth_factor} leaves no final segment for a {hex_len} character code"
                ),
            });
        }
        Ok(Self {
            depth_factor,
            reduced_dim,
        })
    }

    #[must_use]
    pub fn depth_factor(&self) -> usize {
        self.depth_factor
    }

    #[must_use]
    pub fn reduced_dim(&self) -> usize {
        self.reduced_dim
    }

    /// Length of the hex code produced by [`Self::quantize_vector`].
    #[must_use]
    pub fn hex_len(&self) -> usize {
        self.reduced_dim / 2
    }

    /// Bucket each reduced component into a symbol in `0..4`.
    #[must_use]
    pub fn quantize(&self, reduced: &[f32], mode: QuantizationMode) -> Vec<u8> {
        match mode {
            QuantizationMode::Range { min, max } => {
                let width = (max - min) / 4.0;
                reduced
                    .iter()
                    .map(|value| {
                        if width <= 0.0 || !value.is_finite() {
                            return 0;
                        }
                        ((value - min) / width).floor().clamp(0.0, 3.0) as u8
                    })
                    .collect()
            }
            QuantizationMode::Quartile => {
                let mut sorted: Vec<f32> = reduced.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let n = sorted.len();
                if n == 0 {
                    return Vec::new();
                }
                let q1 = sorted[n / 4];
                let q2 = sorted[n / 2];
                let q3 = sorted[(3 * n) / 4];
                reduced
                    .iter()
                    .map(|value| {
                        if *value < q1 {
                            0
                        } else if *value < q2 {
                            1
                        } else if *value < q3 {
                            2
                        } else {
                            3
                        }
                    })
                    .collect()
            }
        }
    }

    /// Pack symbol pairs into hex nibbles.
    #[must_use]
    pub fn to_hex(symbols: &[u8]) -> String {
        symbols
            .chunks(2)
            .map(|pair| {
                let high = pair[0] & 0b11;
                let low = pair.get(1).copied().unwrap_or(0) & 0b11;
                let nibble = (high << 2) | low;
                char::from_digit(u32::from(nibble), 16).unwrap_or('0')
            })
            .collect()
    }

    /// Full pipeline: project, bucket, pack.
    pub fn quantize_vector(
        &self,
        vector: &[f32],
        matrix: &ProjectionMatrix,
        mode: QuantizationMode,
    ) -> StoreResult<String> {
        if matrix.output_dim() != self.reduced_dim {
            return Err(StoreError::Config {
                reason: format!(
                    "projection matrix outputs {} components, quantizer expects {}",
                    matrix.output_dim(),
                    self.reduced_dim
                ),
            });
        }
        let reduced = matrix.project(vector)?;
        Ok(Self::to_hex(&self.quantize(&reduced, mode)))
    }

    /// Split a hex code into `depth_factor` two-character segments plus the rest.
    #[must_use]
    pub fn path_segments(&self, hex: &str) -> Vec<String> {
        let mut segments = Vec::with_capacity(self.depth_factor + 1);
        let mut rest = hex;
        for _ in 0..self.depth_factor {
            if rest.len() <= 2 {
                break;
            }
            let (head, tail) = rest.split_at(2);
            segments.push(head.to_string());
            rest = tail;
        }
        if !rest.is_empty() {
            segments.push(rest.to_string());
        }
        segments
    }

    /// Directory (relative to the collection root) a vector belongs in.
    pub fn relative_dir(
        &self,
        vector: &[f32],
        matrix: &ProjectionMatrix,
        mode: QuantizationMode,
    ) -> StoreResult<PathBuf> {
        let hex = self.quantize_vector(vector, matrix, mode)?;
        Ok(self.path_segments(&hex).iter().collect())
    }
}
