//! The unlock-key interlock: the manifest's `unlock` value and the
//! hash-perturbation scheme built on top of it.
//!
//! `unlock(K, blocks) = K ⊕ h_0 ⊕ h_1 ⊕ … ⊕ h_{n-1}` where `h_i` is the
//! 32-byte prefix of block `i`'s (pre-perturbation) full hash. Because XOR
//! is its own inverse, the same expression recovers `K` once every `h_i`
//! is known again — which is only possible once every block is present,
//! because each manifest entry is the *perturbed* hash, masked by every
//! other block's trailing bytes (see [`perturb_all`]).

use crate::block::Block;
use crate::crypto::KEY_LEN;

const HASH_PREFIX_LEN: usize = KEY_LEN; // 32 bytes of the 64-byte SHA-512

/// `U = K ⊕ (⨁ block.full_hash[0..32])`.
///
/// Used both to build the manifest's `unlock_bytes` (packaging) and, given
/// the same XOR is involutive, to recover `K` during reassembly once every
/// block's un-perturbed hash prefix is known again.
pub fn unlock(key: &[u8; KEY_LEN], hash_prefixes: impl Iterator<Item = [u8; HASH_PREFIX_LEN]>) -> [u8; KEY_LEN] {
    let mut acc = *key;
    for h in hash_prefixes {
        for i in 0..KEY_LEN {
            acc[i] ^= h[i];
        }
    }
    acc
}

/// Recover `K` from the manifest's unlock bytes and every block's recovered
/// (pre-perturbation) full hash. XOR is involutive, so this is the same
/// computation as [`unlock`] run over the recovered hashes.
pub fn recover_key(
    unlock_bytes: &[u8; KEY_LEN],
    hash_prefixes: impl Iterator<Item = [u8; HASH_PREFIX_LEN]>,
) -> [u8; KEY_LEN] {
    unlock(unlock_bytes, hash_prefixes)
}

/// The leading 32 bytes of a 64-byte SHA-512, as used by the unlock algebra.
pub fn prefix32(hash: &[u8; 64]) -> [u8; HASH_PREFIX_LEN] {
    let mut p = [0u8; HASH_PREFIX_LEN];
    p.copy_from_slice(&hash[..HASH_PREFIX_LEN]);
    p
}

/// Compute every block's perturbed hash: `p_i = h_i ⊕ (⨁_{j≠i} trailing_j)`.
///
/// Returns one 64-byte perturbed hash per input block, in the same order.
/// Implemented in O(n) by XOR-folding every block's trailing bytes once and
/// then un-XORing each block's own contribution, rather than the O(n²)
/// direct sum the formula suggests.
pub fn perturb_all(blocks: &[Block]) -> Vec<[u8; 64]> {
    let mut total = [0u8; 64];
    for b in blocks {
        xor_64_into(&mut total, &b.trailing_bytes);
    }

    blocks
        .iter()
        .map(|b| {
            let mut others = total;
            xor_64_into(&mut others, &b.trailing_bytes); // remove self's contribution
            let mut p = b.full_hash;
            xor_64_into(&mut p, &others);
            p
        })
        .collect()
}

fn xor_64_into(a: &mut [u8; 64], b: &[u8; 64]) {
    for i in 0..64 {
        a[i] ^= b[i];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::Block;

    fn block(full_hash_byte: u8, trailing_byte: u8) -> Block {
        Block {
            full_hash: [full_hash_byte; 64],
            trailing_bytes: [trailing_byte; 64],
            path: None,
            ordering: None,
        }
    }

    #[test]
    fn unlock_recover_roundtrip() {
        let key = [0x42u8; KEY_LEN];
        let blocks = vec![block(1, 10), block(2, 20), block(3, 30)];
        let prefixes: Vec<[u8; 32]> = blocks
            .iter()
            .map(|b| {
                let mut p = [0u8; 32];
                p.copy_from_slice(&b.full_hash[..32]);
                p
            })
            .collect();

        let u = unlock(&key, prefixes.iter().copied());
        let recovered = recover_key(&u, prefixes.iter().copied());
        assert_eq!(recovered, key);
    }

    #[test]
    fn perturbation_involution() {
        // ⨁ᵢ (pᵢ ⊕ ⨁_{j≠i} trailing_j) == ⨁ᵢ hᵢ — the cross terms cancel.
        let blocks = vec![block(0xAA, 1), block(0xBB, 2), block(0xCC, 3), block(0xDD, 4)];
        let perturbed = perturb_all(&blocks);

        let mut lhs = [0u8; 64];
        for (p, b) in perturbed.iter().zip(&blocks) {
            let mut term = *p;
            let mut others = [0u8; 64];
            for (j, other) in blocks.iter().enumerate() {
                if !std::ptr::eq(other, b) {
                    xor_64_into(&mut others, &other.trailing_bytes);
                }
                let _ = j;
            }
            xor_64_into(&mut term, &others);
            xor_64_into(&mut lhs, &term);
        }

        let mut rhs = [0u8; 64];
        for b in &blocks {
            xor_64_into(&mut rhs, &b.full_hash);
        }

        assert_eq!(lhs, rhs);
    }

    #[test]
    fn single_block_is_unmasked_by_itself() {
        // With one block, perturbation XORs with an all-zero accumulator —
        // the perturbed hash equals the plain hash.
        let blocks = vec![block(7, 9)];
        let perturbed = perturb_all(&blocks);
        assert_eq!(perturbed[0], blocks[0].full_hash);
    }
}
