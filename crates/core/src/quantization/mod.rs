//! Vector quantization: exact f32, signed 8-bit, and binary sign bitmap.
//!
//! Every vector is L2-normalized before encoding, so quantization only has
//! to cover the unit ball. `Q8` stores one signed byte per component plus a
//! single f32 `range` (the largest absolute component); `Bin` stores one
//! sign bit per component. An index is created with exactly one
//! [`Quantization`] kind and every node in it uses that kind.

use serde::{Deserialize, Serialize};

/// Storage format for vectors in an index, fixed at index creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quantization {
    /// Exact 32-bit floats, 4 bytes per component.
    F32,
    /// Signed 8-bit components with a per-vector range, 1 byte per component.
    Q8,
    /// One sign bit per component.
    Bin,
}

/// A vector encoded in one of the three storage formats.
///
/// The variant always matches the owning index's [`Quantization`] kind.
#[derive(Debug, Clone, PartialEq)]
pub enum QuantizedVector {
    /// Exact storage of the normalized vector.
    F32(Vec<f32>),
    /// `codes[i]` in `[-127, 127]` represents `codes[i] * range / 127.0`.
    Q8 {
        /// Quantized components.
        codes: Vec<i8>,
        /// Largest absolute component of the normalized source vector.
        range: f32,
    },
    /// Sign bitmap packed into u64 words; bit `i` set means component `i`
    /// was negative.
    Bin(Vec<u64>),
}

impl QuantizedVector {
    /// Encode an already-normalized vector into the given storage format.
    pub fn encode(kind: Quantization, v: &[f32]) -> Self {
        match kind {
            Quantization::F32 => QuantizedVector::F32(v.to_vec()),
            Quantization::Q8 => {
                let mut range = 0.0f32;
                for &x in v {
                    let a = x.abs();
                    if a > range {
                        range = a;
                    }
                }
                let codes = if range > 0.0 {
                    let inv = 127.0 / range;
                    v.iter()
                        .map(|&x| (x * inv).round().clamp(-127.0, 127.0) as i8)
                        .collect()
                } else {
                    vec![0i8; v.len()]
                };
                QuantizedVector::Q8 { codes, range }
            }
            Quantization::Bin => {
                let words = v.len().div_ceil(64);
                let mut bits = vec![0u64; words];
                for (i, &x) in v.iter().enumerate() {
                    if x < 0.0 {
                        bits[i / 64] |= 1u64 << (i % 64);
                    }
                }
                QuantizedVector::Bin(bits)
            }
        }
    }

    /// Storage format of this vector.
    pub fn kind(&self) -> Quantization {
        match self {
            QuantizedVector::F32(_) => Quantization::F32,
            QuantizedVector::Q8 { .. } => Quantization::Q8,
            QuantizedVector::Bin(_) => Quantization::Bin,
        }
    }

    /// Decode the approximate normalized vector into `out`.
    ///
    /// `out.len()` is the dimension. `F32` is exact; `Q8` reconstructs each
    /// component as `code * range / 127`; `Bin` yields `±1/√D` per the sign
    /// bit.
    pub fn decode_into(&self, out: &mut [f32]) {
        match self {
            QuantizedVector::F32(v) => out.copy_from_slice(v),
            QuantizedVector::Q8 { codes, range } => {
                let scale = range / 127.0;
                for (o, &c) in out.iter_mut().zip(codes.iter()) {
                    *o = c as f32 * scale;
                }
            }
            QuantizedVector::Bin(bits) => {
                let mag = 1.0 / (out.len() as f32).sqrt();
                for (i, o) in out.iter_mut().enumerate() {
                    let neg = bits[i / 64] >> (i % 64) & 1 == 1;
                    *o = if neg { -mag } else { mag };
                }
            }
        }
    }
}

/// L2-normalize `v` in place and return the original magnitude.
///
/// Returns `None` for the zero vector (and any vector whose norm is not a
/// positive finite number), leaving `v` untouched.
pub fn normalize(v: &mut [f32]) -> Option<f32> {
    let norm_sq: f32 = v.iter().map(|&x| x * x).sum();
    let norm = norm_sq.sqrt();
    if !norm.is_normal() {
        return None;
    }
    let inv = 1.0 / norm;
    for x in v.iter_mut() {
        *x *= inv;
    }
    Some(norm)
}
