//! Reassembler: from a manifest and a pile of candidate block files, recover
//! chunk order and the encryption key, then decrypt and concatenate.
//!
//! Phase D decrypts with a fresh `CbcDecryptStream` per block, but the
//! continuing-CBC construction from packaging means only the first
//! recovered block uses the globally derived IV — every later block's
//! effective IV is the previous block's last 16 ciphertext bytes, tracked
//! here as `prev_tail`.

use std::fs;
use std::path::{Path, PathBuf};

use crate::block::{Block, HASH_LEN};
use crate::bytes::{from_hex, xor_into};
use crate::cancel::CancellationToken;
use crate::crypto::{self, CbcDecryptStream, IV_LEN, KEY_LEN};
use crate::error::{PackagerError, Result};
use crate::io_seam::Filesystem;
use crate::manifest::{FileManifest, LocalShareFileManifest};
use crate::unlock;

/// Phase E's output: a short record of what was recovered, rather than a
/// bare `()`.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    pub destination: PathBuf,
    pub blocks_recovered: usize,
    pub bytes_written: u64,
}

impl RecoveryReport {
    pub fn summary(&self) -> String {
        format!(
            "recovered {} block(s), wrote {} bytes to {}",
            self.blocks_recovered,
            self.bytes_written,
            self.destination.display()
        )
    }
}

/// Reassemble `manifest` from `candidate_paths` into `destination`.
///
/// `local_share`, when provided, supplies the per-chunk plaintext lengths
/// needed to truncate the final block's CBC zero-padding exactly; without
/// it the output carries the final block's zero-padding bytes verbatim, a
/// documented limitation of the public manifest format.
pub fn reassemble(
    manifest: &FileManifest,
    candidate_paths: &[PathBuf],
    destination: &Path,
    overwrite: bool,
    local_share: Option<&LocalShareFileManifest>,
    fs: &impl Filesystem,
    cancel: &CancellationToken,
) -> Result<RecoveryReport> {
    if manifest.block_hashes.is_empty() {
        return Err(PackagerError::BadInput("manifest has no blocks".into()));
    }
    if fs.exists(destination) && !overwrite {
        return Err(PackagerError::OutputExists(destination.to_path_buf()));
    }

    let (mut candidates, ciphertexts) = fingerprint_candidates(candidate_paths, fs)?;
    let pre_perturbation_hashes = recover_order(manifest, &mut candidates, cancel)?;

    let unlock_bytes = parse_unlock(&manifest.unlock)?;
    let key = recover_key(&unlock_bytes, &pre_perturbation_hashes);

    let output = decrypt_in_order(
        manifest.block_hashes.len(),
        &candidates,
        &ciphertexts,
        &key,
        local_share,
        cancel,
    )?;

    let mut out_file = fs.open_new(destination)?;
    crate::io_seam::BlockWriter::write(&mut out_file, &output)?;

    Ok(RecoveryReport {
        destination: destination.to_path_buf(),
        blocks_recovered: manifest.block_hashes.len(),
        bytes_written: output.len() as u64,
    })
}

/// Phase A: hash and tail-fingerprint every candidate file.
fn fingerprint_candidates(paths: &[PathBuf], fs: &impl Filesystem) -> Result<(Vec<Block>, Vec<Vec<u8>>)> {
    let mut blocks = Vec::with_capacity(paths.len());
    let mut ciphertexts = Vec::with_capacity(paths.len());

    for path in paths {
        let mut file = fs.open_read(path)?;
        let mut bytes = Vec::new();
        std::io::Read::read_to_end(&mut file, &mut bytes)?;
        let mut block = Block::from_ciphertext(&bytes);
        block.path = Some(path.clone());
        blocks.push(block);
        ciphertexts.push(bytes);
    }

    Ok((blocks, ciphertexts))
}

/// Phase B: bind each manifest position to a candidate by XOR search.
///
/// Returns the pre-perturbation hash recovered for each manifest position,
/// in manifest order — Phase C needs these, but `candidates[..].full_hash`
/// is overwritten in place with the perturbed form to mirror packaging
/// state, so both must be preserved.
fn recover_order(
    manifest: &FileManifest,
    candidates: &mut [Block],
    cancel: &CancellationToken,
) -> Result<Vec<[u8; HASH_LEN]>> {
    let n = manifest.block_hashes.len();
    let mut pre_perturbation_hashes = Vec::with_capacity(n);

    for (i, hex_hash) in manifest.block_hashes.iter().enumerate() {
        cancel.check()?;
        let p_i = parse_hash64(hex_hash)?;

        let mut bound = None;
        for c in 0..candidates.len() {
            if candidates[c].ordering.is_some() {
                continue;
            }

            let mut t = [0u8; HASH_LEN];
            for (j, other) in candidates.iter().enumerate() {
                if j == c {
                    continue;
                }
                xor_into(&mut t, &other.trailing_bytes);
            }

            let mut candidate_xor = p_i;
            xor_into(&mut candidate_xor, &t);

            if candidate_xor == candidates[c].full_hash {
                bound = Some(c);
                break;
            }
        }

        match bound {
            Some(c) => {
                pre_perturbation_hashes.push(candidates[c].full_hash);
                candidates[c].ordering = Some(i);
                candidates[c].full_hash = p_i;
            }
            None => return Err(PackagerError::OrderingIrrecoverable),
        }
    }

    Ok(pre_perturbation_hashes)
}

fn recover_key(unlock_bytes: &[u8; KEY_LEN], pre_perturbation_hashes: &[[u8; HASH_LEN]]) -> [u8; KEY_LEN] {
    unlock::recover_key(unlock_bytes, pre_perturbation_hashes.iter().map(unlock::prefix32))
}

/// Phase D: decrypt every block in recovered order, chaining each block's
/// IV from the previous block's ciphertext tail, and concatenate.
fn decrypt_in_order(
    n: usize,
    candidates: &[Block],
    ciphertexts: &[Vec<u8>],
    key: &[u8; KEY_LEN],
    local_share: Option<&LocalShareFileManifest>,
    cancel: &CancellationToken,
) -> Result<Vec<u8>> {
    let mut by_position: Vec<usize> = vec![usize::MAX; n];
    for (idx, block) in candidates.iter().enumerate() {
        if let Some(pos) = block.ordering {
            by_position[pos] = idx;
        }
    }
    if by_position.iter().any(|&idx| idx == usize::MAX) {
        return Err(PackagerError::OrderingIrrecoverable);
    }

    let mut output = Vec::new();
    let mut prev_tail = [0u8; IV_LEN];

    for (position, &candidate_idx) in by_position.iter().enumerate() {
        cancel.check()?;
        let ciphertext = &ciphertexts[candidate_idx];

        let iv = if position == 0 {
            crypto::derive_iv(key)
        } else {
            prev_tail
        };

        let dec = CbcDecryptStream::new(key, &iv);
        let mut plaintext = dec.decrypt_blocks(ciphertext)?;

        if position == n - 1 {
            if let Some(ls) = local_share {
                let total = ls.plaintext_len();
                let remaining = total.saturating_sub(output.len() as u64) as usize;
                plaintext.truncate(remaining);
            }
        }

        if ciphertext.len() >= IV_LEN {
            prev_tail.copy_from_slice(&ciphertext[ciphertext.len() - IV_LEN..]);
        }

        output.extend_from_slice(&plaintext);
    }

    Ok(output)
}

fn parse_unlock(hex: &str) -> Result<[u8; KEY_LEN]> {
    let bytes = from_hex(hex)?;
    bytes.try_into().map_err(|v: Vec<u8>| PackagerError::LengthMismatch {
        expected: KEY_LEN,
        actual: v.len(),
    })
}

fn parse_hash64(hex: &str) -> Result<[u8; HASH_LEN]> {
    let bytes = from_hex(hex)?;
    bytes.try_into().map_err(|v: Vec<u8>| PackagerError::LengthMismatch {
        expected: HASH_LEN,
        actual: v.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NullSink;
    use crate::io_seam::RealFilesystem;
    use crate::pipeline::{pack, PackOptions, Persist};
    use std::fs::File;
    use std::io::Write as _;

    fn pack_into_dir(plaintext: &[u8], chunk_size: Option<u64>) -> (tempfile::TempDir, FileManifest, Vec<u64>) {
        let src_dir = tempfile::tempdir().unwrap();
        let src_path = src_dir.path().join("source.bin");
        File::create(&src_path).unwrap().write_all(plaintext).unwrap();

        let out_dir = tempfile::tempdir().unwrap();
        let mut source = File::open(&src_path).unwrap();
        let options = PackOptions {
            chunk_size,
            persist: Persist::Directory(out_dir.path().to_path_buf()),
            ..PackOptions::default()
        };
        let mut sink = NullSink;
        let (manifest, _blocks, lengths) = pack(
            &mut source,
            "source.bin",
            &options,
            &RealFilesystem,
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        (out_dir, manifest, lengths)
    }

    fn candidate_paths(dir: &Path) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        paths.sort();
        paths
    }

    #[test]
    fn round_trip_recovers_original_bytes_with_local_share_truncation() {
        let plaintext = vec![0xAAu8; 2 * 1024 * 1024];
        let (out_dir, manifest, lengths) = pack_into_dir(&plaintext, Some(1_048_576));
        let candidates = candidate_paths(out_dir.path());
        assert_eq!(candidates.len(), 2);

        let local_share = LocalShareFileManifest {
            manifest: manifest.clone(),
            local_path: "source.bin".into(),
            size_bytes: plaintext.len() as i64,
            hash: String::new(),
            block_lengths: lengths.iter().map(|c| c.to_string()).collect(),
        };

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("recovered.bin");

        let report = reassemble(
            &manifest,
            &candidates,
            &dest,
            false,
            Some(&local_share),
            &RealFilesystem,
            &CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(report.bytes_written, plaintext.len() as u64);
        assert_eq!(fs::read(&dest).unwrap(), plaintext);
    }

    #[test]
    fn round_trip_without_local_share_keeps_final_zero_padding() {
        let plaintext = vec![7u8; 64];
        let (out_dir, manifest, _lengths) = pack_into_dir(&plaintext, Some(64));
        let candidates = candidate_paths(out_dir.path());

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("recovered.bin");

        let report = reassemble(
            &manifest,
            &candidates,
            &dest,
            false,
            None,
            &RealFilesystem,
            &CancellationToken::new(),
        )
        .unwrap();

        // 64 plaintext bytes zero-padded to 80 for the single finalized block.
        assert_eq!(report.bytes_written, 80);
        let recovered = fs::read(&dest).unwrap();
        assert_eq!(&recovered[..64], plaintext.as_slice());
        assert_eq!(&recovered[64..], &[0u8; 16]);
    }

    #[test]
    fn missing_block_fails_with_ordering_irrecoverable() {
        let plaintext = vec![1u8; 3 * 1_048_576 + 123];
        let (out_dir, manifest, _lengths) = pack_into_dir(&plaintext, Some(1_048_576));
        let mut candidates = candidate_paths(out_dir.path());
        candidates.remove(1);

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("recovered.bin");

        let err = reassemble(
            &manifest,
            &candidates,
            &dest,
            false,
            None,
            &RealFilesystem,
            &CancellationToken::new(),
        );

        assert!(matches!(err, Err(PackagerError::OrderingIrrecoverable)));
        assert!(!dest.exists());
    }

    #[test]
    fn corrupt_block_fails_with_ordering_irrecoverable() {
        let plaintext = vec![2u8; 2 * 1_048_576];
        let (out_dir, manifest, _lengths) = pack_into_dir(&plaintext, Some(1_048_576));
        let candidates = candidate_paths(out_dir.path());

        let mut bytes = fs::read(&candidates[0]).unwrap();
        bytes[0] ^= 0xFF;
        fs::write(&candidates[0], &bytes).unwrap();

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("recovered.bin");

        let err = reassemble(
            &manifest,
            &candidates,
            &dest,
            false,
            None,
            &RealFilesystem,
            &CancellationToken::new(),
        );

        assert!(matches!(err, Err(PackagerError::OrderingIrrecoverable)));
    }

    #[test]
    fn refuses_to_overwrite_existing_destination() {
        let plaintext = vec![9u8; 64];
        let (out_dir, manifest, _lengths) = pack_into_dir(&plaintext, Some(64));
        let candidates = candidate_paths(out_dir.path());

        let dest_dir = tempfile::tempdir().unwrap();
        let dest = dest_dir.path().join("recovered.bin");
        fs::write(&dest, b"already here").unwrap();

        let err = reassemble(
            &manifest,
            &candidates,
            &dest,
            false,
            None,
            &RealFilesystem,
            &CancellationToken::new(),
        );
        assert!(matches!(err, Err(PackagerError::OutputExists(_))));
    }
}
