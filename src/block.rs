//! `Block` — the in-memory descriptor of one encrypted chunk.
//!
//! A block carries its ciphertext's SHA-512 (`full_hash`, later overwritten
//! in place with the perturbed form once the whole batch is known), the
//! last 64 bytes of that ciphertext (`trailing_bytes`), an optional on-disk
//! location, and its 0-based chunk ordering.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha512};

use crate::error::{PackagerError, Result, VerificationWarning, WarningSink};
use crate::io_seam::{BlockWriter, Filesystem};

pub const HASH_LEN: usize = 64;
pub const TRAILING_LEN: usize = 64;

/// An encrypted block, before or after persistence.
#[derive(Debug, Clone)]
pub struct Block {
    /// SHA-512 of the ciphertext. Pre-perturbation while packaging is in
    /// progress; overwritten with the perturbed form once the whole batch
    /// of blocks for a file is known (see `unlock::perturb_all`).
    pub full_hash: [u8; HASH_LEN],
    /// Last 64 bytes of the ciphertext, zero-left-padded if shorter.
    pub trailing_bytes: [u8; TRAILING_LEN],
    /// On-disk location, if this block has been persisted.
    pub path: Option<PathBuf>,
    /// 0-based chunk index. `None` until assigned — during packaging it's
    /// implicit in collection order; during reassembly it's set in Phase B.
    pub ordering: Option<usize>,
}

impl Block {
    /// Hash `ciphertext` and capture its trailing bytes without touching
    /// disk. Used by the metadata-only pipeline and by reassembly
    /// fingerprinting.
    pub fn from_ciphertext(ciphertext: &[u8]) -> Self {
        Self {
            full_hash: sha512(ciphertext),
            trailing_bytes: trailing_bytes_of(ciphertext),
            path: None,
            ordering: None,
        }
    }

    /// As [`from_ciphertext`](Self::from_ciphertext), then write `ciphertext`
    /// to a fresh temporary file and record its path.
    pub fn persist_temp(ciphertext: &[u8], fs: &impl Filesystem) -> Result<Self> {
        let mut block = Self::from_ciphertext(ciphertext);
        let (mut file, path) = fs.make_temp_file()?;
        file.write(ciphertext)?;
        block.path = Some(path);
        Ok(block)
    }

    /// As [`from_ciphertext`](Self::from_ciphertext), then write `ciphertext`
    /// to `directory/filename`.
    ///
    /// Fails with [`PackagerError::OutputExists`] if the target exists and
    /// `overwrite` is false; removes the existing file first when
    /// `overwrite` is true. When `verify`, re-reads the written file and
    /// re-hashes it, reporting any mismatch to `warnings` as a non-fatal
    /// [`VerificationWarning`] rather than failing the run.
    pub fn persist_to_directory(
        ciphertext: &[u8],
        directory: &Path,
        filename: &str,
        overwrite: bool,
        verify: bool,
        warnings: &mut impl WarningSink,
        fs: &impl Filesystem,
    ) -> Result<Self> {
        let mut block = Self::from_ciphertext(ciphertext);
        let target = directory.join(filename);

        if fs.exists(&target) {
            if !overwrite {
                return Err(PackagerError::OutputExists(target));
            }
            fs.delete(&target)?;
        }

        {
            let mut f = fs.open_new(&target)?;
            f.write(ciphertext)?;
        }

        if verify {
            let mut f = fs.open_read(&target)?;
            let mut on_disk = Vec::new();
            std::io::Read::read_to_end(&mut f, &mut on_disk)?;
            let actual_hash = sha512(&on_disk);
            if actual_hash != block.full_hash || on_disk.len() != ciphertext.len() {
                warnings.warn(VerificationWarning {
                    path: target.clone(),
                    expected_hash: block.full_hash,
                    actual_hash,
                    expected_len: ciphertext.len() as u64,
                    actual_len: on_disk.len() as u64,
                });
            }
        }

        block.path = Some(target);
        Ok(block)
    }
}

pub fn sha512(data: &[u8]) -> [u8; HASH_LEN] {
    let digest = Sha512::digest(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Last 64 bytes of `data`, zero-left-padded if `data` is shorter.
pub fn trailing_bytes_of(data: &[u8]) -> [u8; TRAILING_LEN] {
    let mut buf = [0u8; TRAILING_LEN];
    let n = data.len().min(TRAILING_LEN);
    buf[TRAILING_LEN - n..].copy_from_slice(&data[data.len() - n..]);
    buf
}
