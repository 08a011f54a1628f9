//! Binary quantization — one sign bit per dimension.
//!
//! Bit `i` is 1 iff `v[i] > 0.0` (zero, negative zero and NaN map to 0).
//! Bits are packed most-significant-bit first, 8 per byte; when the dimension
//! is not a multiple of 8 the unused low bits of the last byte are 0.
//!
//! # Compression
//! - 1024D f32 vector: 4096 bytes → 128 bytes (32×)
//! - 384D f32 vector: 1536 bytes → 48 bytes (32×)
//!
//! Stored items and queries must go through [`quantize_vector`]; any other
//! packing silently breaks Hamming ranking.

use bitrag_core::error::{BitRagError, Result};
use bitrag_core::types::EmbeddingVector;
use serde::{Deserialize, Serialize};

/// Packed sign bits of an embedding.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BinaryCode {
    bytes: Vec<u8>,
    bits: usize,
}

/// Number of bytes needed for `bits` bits.
pub fn code_len(bits: usize) -> usize {
    bits.div_ceil(8)
}

impl BinaryCode {
    /// Wrap raw bytes, checking the length and that padding bits are clear.
    pub fn from_bytes(bytes: Vec<u8>, bits: usize) -> Result<Self> {
        if bytes.len() != code_len(bits) {
            return Err(BitRagError::InvalidInput(format!(
                "binary code of {bits} bits needs {} byte(s), got {}",
                code_len(bits),
                bytes.len()
            )));
        }
        let used = bits % 8;
        if used != 0 {
            let padding = bytes.last().map_or(0, |last| last & (0xFFu8 >> used));
            if padding != 0 {
                return Err(BitRagError::InvalidInput(
                    "binary code has non-zero padding bits".into(),
                ));
            }
        }
        Ok(Self { bytes, bits })
    }

    /// Dimension D of the source vector.
    pub fn bits(&self) -> usize {
        self.bits
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Value of bit `i` (MSB-first within each byte).
    pub fn bit(&self, i: usize) -> bool {
        i < self.bits && self.bytes[i / 8] & (0x80 >> (i % 8)) != 0
    }

    /// Hamming distance to another code of the same dimension.
    pub fn hamming(&self, other: &Self) -> Result<u32> {
        if self.bits != other.bits {
            return Err(BitRagError::DimensionMismatch {
                expected: self.bits,
                actual: other.bits,
            });
        }
        Ok(hamming_bytes(&self.bytes, &other.bytes))
    }
}

/// Popcount of `a XOR b`, 8 bytes at a time. Both slices must have equal length.
pub(crate) fn hamming_bytes(a: &[u8], b: &[u8]) -> u32 {
    let mut distance = 0u32;
    let mut wa = a.chunks_exact(8);
    let mut wb = b.chunks_exact(8);
    for (x, y) in wa.by_ref().zip(wb.by_ref()) {
        let mut xa = [0u8; 8];
        let mut yb = [0u8; 8];
        xa.copy_from_slice(x);
        yb.copy_from_slice(y);
        distance += (u64::from_ne_bytes(xa) ^ u64::from_ne_bytes(yb)).count_ones();
    }
    for (x, y) in wa.remainder().iter().zip(wb.remainder()) {
        distance += (x ^ y).count_ones();
    }
    distance
}

/// Quantize one vector.
pub fn quantize_vector(vector: &[f32]) -> BinaryCode {
    let mut bytes = vec![0u8; code_len(vector.len())];
    for (i, &v) in vector.iter().enumerate() {
        if v > 0.0 {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    BinaryCode {
        bytes,
        bits: vector.len(),
    }
}

/// Quantize a sequence of vectors, preserving order.
pub fn quantize(vectors: &[EmbeddingVector]) -> Vec<BinaryCode> {
    vectors.iter().map(|v| quantize_vector(v)).collect()
}

/// Expand a code back into one bool per dimension.
pub fn unpack(code: &BinaryCode) -> Vec<bool> {
    (0..code.bits).map(|i| code.bit(i)).collect()
}

/// Pack bools into a code with the same layout as [`quantize_vector`].
pub fn pack(bits: &[bool]) -> BinaryCode {
    let mut bytes = vec![0u8; code_len(bits.len())];
    for (i, &set) in bits.iter().enumerate() {
        if set {
            bytes[i / 8] |= 0x80 >> (i % 8);
        }
    }
    BinaryCode {
        bytes,
        bits: bits.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand::rngs::StdRng;

    #[test]
    fn test_msb_first_packing() {
        let code = quantize_vector(&[1.0, -1.0, 0.5, -0.5, 0.0, 2.0, -3.0, 4.0]);
        assert_eq!(code.as_bytes(), &[0b1010_0101]);
        assert_eq!(code.bits(), 8);
    }

    #[test]
    fn test_zero_and_nan_are_unset() {
        let code = quantize_vector(&[0.0, -0.0, f32::NAN, f32::MIN_POSITIVE]);
        assert_eq!(unpack(&code), vec![false, false, false, true]);
    }

    #[test]
    fn test_padding_bits_clear() {
        let code = quantize_vector(&[1.0; 10]);
        assert_eq!(code.as_bytes(), &[0xFF, 0b1100_0000]);
        assert_eq!(unpack(&code).iter().filter(|b| **b).count(), 10);
    }

    #[test]
    fn test_empty_vector() {
        let code = quantize_vector(&[]);
        assert_eq!(code.bits(), 0);
        assert!(code.as_bytes().is_empty());
    }

    #[test]
    fn test_unpack_matches_sign_and_repack_is_identity() {
        let mut rng = StdRng::seed_from_u64(7);
        for dim in [1usize, 7, 8, 13, 64, 100, 1024] {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let code = quantize_vector(&v);
            let bits = unpack(&code);
            let expected: Vec<bool> = v.iter().map(|x| *x > 0.0).collect();
            assert_eq!(bits, expected, "dim {dim}");
            assert_eq!(pack(&bits), code, "dim {dim}");
        }
    }

    #[test]
    fn test_quantize_preserves_order() {
        let codes = quantize(&[vec![1.0, -1.0], vec![-1.0, 1.0]]);
        assert_eq!(codes[0].as_bytes(), &[0b1000_0000]);
        assert_eq!(codes[1].as_bytes(), &[0b0100_0000]);
    }

    #[test]
    fn test_hamming() {
        let a = quantize_vector(&[1.0, 1.0, -1.0, -1.0]);
        let b = quantize_vector(&[1.0, -1.0, -1.0, 1.0]);
        assert_eq!(a.hamming(&a).unwrap(), 0);
        assert_eq!(a.hamming(&b).unwrap(), 2);
    }

    #[test]
    fn test_hamming_wide_matches_bitwise() {
        let mut rng = StdRng::seed_from_u64(11);
        let a: Vec<f32> = (0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let b: Vec<f32> = (0..1000).map(|_| rng.gen_range(-1.0..1.0)).collect();
        let expected = a
            .iter()
            .zip(&b)
            .filter(|(x, y)| (**x > 0.0) != (**y > 0.0))
            .count() as u32;
        assert_eq!(quantize_vector(&a).hamming(&quantize_vector(&b)).unwrap(), expected);
    }

    #[test]
    fn test_hamming_dimension_mismatch() {
        let a = quantize_vector(&[1.0; 8]);
        let b = quantize_vector(&[1.0; 16]);
        assert!(matches!(
            a.hamming(&b),
            Err(BitRagError::DimensionMismatch { expected: 8, actual: 16 })
        ));
    }

    #[test]
    fn test_from_bytes_validation() {
        assert!(BinaryCode::from_bytes(vec![0xFF, 0xC0], 10).is_ok());
        let short = BinaryCode::from_bytes(vec![0xFF], 10).unwrap_err();
        assert!(matches!(short, BitRagError::InvalidInput(_)));
        assert!(short.to_string().contains("10 bits needs 2 byte(s), got 1"));
        assert!(BinaryCode::from_bytes(vec![0xFF, 0xE0], 10).is_err());
    }
}
