//! Chunking & encryption pipeline, and the parallel-hash pass it shares with
//! the metadata-only mode.
//!
//! Pass 1 parallel-hashes plaintext chunks across four workers purely to
//! validate hashing throughput — its result is not consumed by Pass 2, which
//! re-derives everything it needs from ciphertext. Pass 2 is strictly
//! sequential: one continuing AES-256-CBC stream can't be split across
//! threads.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::bounded;
use rand::rngs::OsRng;
use rand::RngCore;

use crate::block::Block;
use crate::bytes::to_hex;
use crate::cancel::CancellationToken;
use crate::chunklen;
use crate::crypto::{self, CbcEncryptStream, KEY_LEN};
use crate::error::{PackagerError, Result, WarningSink};
use crate::io_seam::{Filesystem, SourceReader};
use crate::manifest::{self, FileManifest};
use crate::unlock;

const PASS1_WORKERS: usize = 4;
const PASS1_QUEUE_CAPACITY: usize = 4;

/// Where persisted blocks land.
#[derive(Debug, Clone)]
pub enum Persist {
    /// Each block goes to its own fresh temporary file.
    Temp,
    /// Each block is written into `directory`, named from its (pre- then
    /// post-perturbation) hash prefix.
    Directory(PathBuf),
}

/// Knobs for one packaging run. Mirrors the shape of a config struct
/// consumed by a CLI subcommand: every field has a sensible default.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Fixed per-chunk length; `None` selects the scale-aware random
    /// generator.
    pub chunk_size: Option<u64>,
    /// RNG seed for the random chunk-length generator. Ignored when
    /// `chunk_size` is `Some`.
    pub seed: Option<u64>,
    pub persist: Persist,
    /// Overwrite an existing block file of the same name instead of
    /// failing with `OutputExists`.
    pub overwrite: bool,
    /// Re-read and re-hash each written block file to catch a silent
    /// short write.
    pub verify_on_write: bool,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            chunk_size: None,
            seed: None,
            persist: Persist::Temp,
            overwrite: false,
            verify_on_write: false,
        }
    }
}

/// Run the pipeline end to end: draw a key, chunk, hash, encrypt, persist,
/// perturb, rename, and build the manifest. Returns the manifest alongside
/// the final block sequence (with perturbed `full_hash`es) and the
/// per-chunk plaintext lengths, which the caller needs to build a
/// `LocalShareFileManifest`.
pub fn pack(
    source: &mut impl SourceReader,
    name: &str,
    options: &PackOptions,
    fs: &impl Filesystem,
    cancel: &CancellationToken,
    warnings: &mut impl WarningSink,
) -> Result<(FileManifest, Vec<Block>, Vec<u64>)> {
    let file_size = source.length()?;
    let chunk_lengths = chunklen::generate(file_size, options.chunk_size, options.seed)?;

    let mut key = [0u8; KEY_LEN];
    OsRng.fill_bytes(&mut key);

    run_pass1(source, &chunk_lengths, cancel)?;

    source.seek_start()?;
    let mut blocks = run_pass2(source, &chunk_lengths, &key, name, options, fs, cancel, warnings)?;

    let hash_prefixes = blocks.iter().map(|b| unlock::prefix32(&b.full_hash));
    let unlock_bytes_vec = unlock::unlock(&key, hash_prefixes);

    let perturbed = unlock::perturb_all(&blocks);
    for (block, p) in blocks.iter_mut().zip(perturbed.iter()) {
        rename_block(block, name, &block.full_hash, p, options, fs)?;
        block.full_hash = *p;
    }

    let manifest = manifest::build(&blocks, &unlock_bytes_vec, name, now_epoch(), None);
    Ok((manifest, blocks, chunk_lengths))
}

/// Pass 1: feed plaintext chunks to four hashing workers through a bounded
/// channel and wait for all of them to finish. The per-chunk hashes aren't
/// retained — Pass 2 re-derives hashes from ciphertext — this exists to
/// validate hashing throughput before the sequential encryption pass begins.
pub(crate) fn run_pass1_pub(
    source: &mut impl SourceReader,
    chunk_lengths: &[u64],
    cancel: &CancellationToken,
) -> Result<()> {
    run_pass1(source, chunk_lengths, cancel)
}

fn run_pass1(
    source: &mut impl SourceReader,
    chunk_lengths: &[u64],
    cancel: &CancellationToken,
) -> Result<()> {
    let (tx, rx) = bounded::<(usize, Vec<u8>)>(PASS1_QUEUE_CAPACITY);
    let results: Arc<Mutex<Vec<Option<[u8; 32]>>>> =
        Arc::new(Mutex::new(vec![None; chunk_lengths.len()]));

    let workers: Vec<_> = (0..PASS1_WORKERS)
        .map(|_| {
            let rx = rx.clone();
            let results = Arc::clone(&results);
            thread::spawn(move || {
                for (index, buf) in rx.iter() {
                    let hash = crate::block::sha512(&buf);
                    let mut prefix = [0u8; 32];
                    prefix.copy_from_slice(&hash[..32]);
                    results.lock().unwrap()[index] = Some(prefix);
                }
            })
        })
        .collect();

    source.seek_start()?;
    for (index, &len) in chunk_lengths.iter().enumerate() {
        cancel.check()?;
        let mut buf = vec![0u8; len as usize];
        read_exact(source, &mut buf)?;
        if tx.send((index, buf)).is_err() {
            break;
        }
    }
    drop(tx);

    for worker in workers {
        worker.join().expect("pass 1 hashing worker panicked");
    }

    Ok(())
}

fn run_pass2(
    source: &mut impl SourceReader,
    chunk_lengths: &[u64],
    key: &[u8; KEY_LEN],
    name: &str,
    options: &PackOptions,
    fs: &impl Filesystem,
    cancel: &CancellationToken,
    warnings: &mut impl WarningSink,
) -> Result<Vec<Block>> {
    let iv = crypto::derive_iv(key);
    let mut stream = Some(CbcEncryptStream::new(key, &iv));
    let mut blocks = Vec::with_capacity(chunk_lengths.len());
    let last = chunk_lengths.len() - 1;

    for (i, &len) in chunk_lengths.iter().enumerate() {
        cancel.check()?;
        let mut plaintext = vec![0u8; len as usize];
        read_exact(source, &mut plaintext)?;

        let ciphertext = if i < last {
            stream.as_mut().expect("stream consumed before final chunk").encrypt_full_blocks(&plaintext)?
        } else {
            stream.take().expect("stream consumed before final chunk").finalize_zero_padded(&plaintext)
        };

        let block = persist_one(&ciphertext, name, options, warnings, fs)?;
        blocks.push(block);
    }

    Ok(blocks)
}

fn persist_one(
    ciphertext: &[u8],
    name: &str,
    options: &PackOptions,
    warnings: &mut impl WarningSink,
    fs: &impl Filesystem,
) -> Result<Block> {
    match &options.persist {
        Persist::Temp => Block::persist_temp(ciphertext, fs),
        Persist::Directory(dir) => {
            let probe = Block::from_ciphertext(ciphertext);
            let temp_name = temp_filename(name, &probe.full_hash);
            Block::persist_to_directory(
                ciphertext,
                dir,
                &temp_name,
                options.overwrite,
                options.verify_on_write,
                warnings,
                fs,
            )
        }
    }
}

/// Rename a directory-persisted block from its temporary (pre-perturbation)
/// name to its final (perturbed) name. A no-op for `Persist::Temp`, whose
/// paths are never meant to be stable.
fn rename_block(
    block: &Block,
    name: &str,
    pre_perturbation_hash: &[u8; 64],
    perturbed_hash: &[u8; 64],
    options: &PackOptions,
    fs: &impl Filesystem,
) -> Result<()> {
    let Persist::Directory(dir) = &options.persist else {
        return Ok(());
    };
    let Some(old_path) = &block.path else {
        return Err(PackagerError::BadInput("directory-persisted block is missing a path".into()));
    };

    let old_expected = dir.join(temp_filename(name, pre_perturbation_hash));
    debug_assert_eq!(old_path, &old_expected);

    let new_path = dir.join(final_filename(name, perturbed_hash));
    fs.rename(old_path, &new_path)?;
    Ok(())
}

fn temp_filename(name: &str, hash: &[u8; 64]) -> String {
    format!("{name}.temp.{}", &to_hex(hash)[..8])
}

fn final_filename(name: &str, hash: &[u8; 64]) -> String {
    format!("{name}.{}", &to_hex(hash)[..8])
}

fn read_exact(source: &mut impl SourceReader, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(PackagerError::BadInput("source stream ended before chunk was fully read".into()));
        }
        filled += n;
    }
    Ok(())
}

fn now_epoch() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NullSink;
    use std::fs::File;
    use std::io::Write as _;

    fn write_temp_source(bytes: &[u8]) -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.bin");
        let mut f = File::create(&path).unwrap();
        f.write_all(bytes).unwrap();
        (dir, path)
    }

    #[test]
    fn pack_single_chunk_tiny_file_produces_one_block() {
        let (_dir, path) = write_temp_source(&[0u8; 64]);
        let mut file = File::open(&path).unwrap();
        let options = PackOptions {
            chunk_size: Some(64),
            ..PackOptions::default()
        };
        let mut sink = NullSink;
        let (manifest, blocks, lengths) = pack(
            &mut file,
            "tiny.bin",
            &options,
            &crate::io_seam::RealFilesystem,
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        assert_eq!(lengths, vec![64]);
        assert_eq!(blocks.len(), 1);
        assert_eq!(manifest.block_hashes.len(), 1);
        assert_eq!(manifest.unlock.len(), 64); // 32 bytes hex-encoded
    }

    #[test]
    fn pack_two_blocks_at_exact_chunk_boundary() {
        let plaintext = vec![0xAAu8; 2 * 1024 * 1024];
        let (_dir, path) = write_temp_source(&plaintext);
        let mut file = File::open(&path).unwrap();
        let options = PackOptions {
            chunk_size: Some(1_048_576),
            ..PackOptions::default()
        };
        let mut sink = NullSink;
        let (_manifest, blocks, lengths) = pack(
            &mut file,
            "two.bin",
            &options,
            &crate::io_seam::RealFilesystem,
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        assert_eq!(lengths, vec![1_048_576, 1_048_576]);
        assert_eq!(blocks.len(), 2);
    }

    #[test]
    fn pack_persists_to_directory_with_final_perturbed_names() {
        let (_src_dir, path) = write_temp_source(&[7u8; 4096]);
        let mut file = File::open(&path).unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let options = PackOptions {
            chunk_size: Some(4096),
            persist: Persist::Directory(out_dir.path().to_path_buf()),
            ..PackOptions::default()
        };
        let mut sink = NullSink;
        let (manifest, blocks, _lengths) = pack(
            &mut file,
            "payload.bin",
            &options,
            &crate::io_seam::RealFilesystem,
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        let expected_name = final_filename("payload.bin", &blocks[0].full_hash);
        assert!(out_dir.path().join(&expected_name).exists());
        assert_eq!(manifest.block_hashes[0], to_hex(&blocks[0].full_hash)[..].to_string());
    }
}
