//! AES-256-CBC encryption with zero padding, and the IV-from-key derivation
//! the unlock interlock depends on.
//!
//! # Cryptographic parameters (bit-exact)
//! - AES-256-CBC, zero padding, no MAC (no authenticated encryption, no
//!   resistance to a chosen-ciphertext adversary — both out of scope here).
//! - `key` is 32 random bytes from a CSPRNG.
//! - `IV = SHA512(key)[0..16]`.
//!
//! Every chunk is encrypted through one *continuing* CBC stream — the IV for
//! chunk `i+1` is the last ciphertext block of chunk `i`, not re-derived.
//! Only the final chunk's cipher is finalized with zero padding; every
//! earlier chunk's ciphertext is exactly its (128-byte-aligned) plaintext
//! length. This is why [`CbcEncryptStream`] is processed one block at a
//! time rather than through a single one-shot call.

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::cipher::generic_array::GenericArray;
use sha2::{Digest, Sha512};

use crate::error::{PackagerError, Result};

pub const KEY_LEN: usize = 32;
pub const IV_LEN: usize = 16;
pub const BLOCK_LEN: usize = 16;

type Block = GenericArray<u8, cbc::cipher::consts::U16>;

/// `IV = SHA512(key)[0..16]`.
pub fn derive_iv(key: &[u8; KEY_LEN]) -> [u8; IV_LEN] {
    let digest = Sha512::digest(key);
    let mut iv = [0u8; IV_LEN];
    iv.copy_from_slice(&digest[..IV_LEN]);
    iv
}

/// A single continuing AES-256-CBC encryption stream.
///
/// Construct once per packaging run, feed it every chunk's plaintext in
/// order via [`encrypt_full_blocks`](Self::encrypt_full_blocks) for all but
/// the last chunk, then consume it with
/// [`finalize_zero_padded`](Self::finalize_zero_padded) for the last chunk.
pub struct CbcEncryptStream {
    inner: cbc::Encryptor<Aes256>,
}

impl CbcEncryptStream {
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner: cbc::Encryptor::<Aes256>::new(key.into(), iv.into()),
        }
    }

    /// Encrypt `plaintext` as whole blocks, chaining from the previous call.
    ///
    /// `plaintext.len()` must be a multiple of 16, since every byte has to
    /// go through a full AES block or it's silently dropped from the
    /// ciphertext. The chunk-length generator is responsible for handing
    /// every non-final chunk in aligned; this is the last line of defense
    /// against a caller that skipped that step.
    ///
    /// # Errors
    /// Returns [`PackagerError::LengthMismatch`] if `plaintext.len()` is not
    /// a multiple of 16 rather than silently truncating the unaligned tail.
    pub fn encrypt_full_blocks(&mut self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let remainder = plaintext.len() % BLOCK_LEN;
        if remainder != 0 {
            return Err(PackagerError::LengthMismatch {
                expected: 0,
                actual: remainder,
            });
        }
        let mut out = plaintext.to_vec();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            let b: &mut Block = Block::from_mut_slice(block);
            self.inner.encrypt_block_mut(b);
        }
        Ok(out)
    }

    /// Zero-pad `plaintext` to `ceil((len+1)/16)*16` bytes (always at least
    /// one full block of padding, even when `plaintext` is already
    /// block-aligned) and encrypt it, consuming the stream.
    pub fn finalize_zero_padded(mut self, plaintext: &[u8]) -> Vec<u8> {
        let padded_len = zero_padded_len(plaintext.len());
        let mut buf = vec![0u8; padded_len];
        buf[..plaintext.len()].copy_from_slice(plaintext);
        for block in buf.chunks_exact_mut(BLOCK_LEN) {
            let b: &mut Block = Block::from_mut_slice(block);
            self.inner.encrypt_block_mut(b);
        }
        buf
    }
}

/// `ceil((len + 1) / 16) * 16` — always rounds up, even for an
/// already-aligned `len`, because the `+1` forces at least one full block
/// of padding. This is the canonical final-block length for a zero-padded
/// CBC finalization.
pub fn zero_padded_len(len: usize) -> usize {
    ((len + 1) / BLOCK_LEN + 1) * BLOCK_LEN
}

/// The decrypting counterpart of [`CbcEncryptStream`]. One instance per
/// block file during reassembly: the decryptor is reset per block because
/// each block was encrypted as its own standalone or finalized CBC segment.
pub struct CbcDecryptStream {
    inner: cbc::Decryptor<Aes256>,
}

impl CbcDecryptStream {
    pub fn new(key: &[u8; KEY_LEN], iv: &[u8; IV_LEN]) -> Self {
        Self {
            inner: cbc::Decryptor::<Aes256>::new(key.into(), iv.into()),
        }
    }

    /// Decrypt `ciphertext` and return the raw plaintext bytes, zero-padding
    /// bytes included for the final block.
    ///
    /// # Errors
    /// Returns [`PackagerError::LengthMismatch`] if `ciphertext.len()` is not
    /// a multiple of 16 — a truncated or corrupt block file — rather than
    /// silently leaving its unaligned tail undecrypted.
    pub fn decrypt_blocks(mut self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let remainder = ciphertext.len() % BLOCK_LEN;
        if remainder != 0 {
            return Err(PackagerError::LengthMismatch {
                expected: 0,
                actual: remainder,
            });
        }
        let mut out = ciphertext.to_vec();
        for block in out.chunks_exact_mut(BLOCK_LEN) {
            let b: &mut Block = Block::from_mut_slice(block);
            self.inner.decrypt_block_mut(b);
        }
        Ok(out)
    }
}
