//! Fixed-width XOR and hex ⇄ byte conversions.
//!
//! Every other module leans on `xor` for the unlock-key algebra and hash
//! perturbation, so it lives on its own with no dependencies beyond `std`.

use crate::error::{PackagerError, Result};

/// Byte-wise XOR of two equal-length buffers.
///
/// # Errors
/// Returns [`PackagerError::LengthMismatch`] if `a.len() != b.len()`.
pub fn xor(a: &[u8], b: &[u8]) -> Result<Vec<u8>> {
    if a.len() != b.len() {
        return Err(PackagerError::LengthMismatch {
            expected: a.len(),
            actual: b.len(),
        });
    }
    Ok(a.iter().zip(b.iter()).map(|(x, y)| x ^ y).collect())
}

/// XOR two equal-length fixed-size arrays in place — used on the hot path
/// (perturbation, unlock algebra) to avoid `Vec` allocation per call.
pub fn xor_into<const N: usize>(a: &mut [u8; N], b: &[u8; N]) {
    for i in 0..N {
        a[i] ^= b[i];
    }
}

/// Uppercase hex, no separators.
pub fn to_hex(bytes: &[u8]) -> String {
    hex::encode_upper(bytes)
}

/// Parse uppercase (or mixed-case) even-length hex into bytes.
///
/// # Errors
/// Returns [`PackagerError::BadHex`] for odd-length or non-hex input.
pub fn from_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(s).map_err(|e| PackagerError::BadHex(e.to_string()))
}
