//! Metadata-only mode: the pre-hash stage's view of a file — chunk lengths
//! and a whole-plaintext SHA-512 — computed without persisting any block or
//! running the encryption pass.

use sha2::{Digest, Sha512};

use crate::block::HASH_LEN;
use crate::cancel::CancellationToken;
use crate::chunklen;
use crate::error::Result;
use crate::io_seam::SourceReader;

/// The product of a metadata-only scan: enough to populate a
/// `LocalShareFileManifest`'s `size_bytes`, `hash`, and `block_lengths`
/// without ever writing a block to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    pub chunk_lengths: Vec<u64>,
    pub plaintext_hash: [u8; HASH_LEN],
}

/// Chunk the file exactly as the packaging pipeline would, parallel-hash
/// each chunk for throughput parity with it (see `pipeline::run_pass1`),
/// and separately accumulate a single SHA-512 over the whole plaintext.
pub fn scan(
    source: &mut impl SourceReader,
    chunk_size: Option<u64>,
    seed: Option<u64>,
    cancel: &CancellationToken,
) -> Result<FileDigest> {
    let file_size = source.length()?;
    let chunk_lengths = chunklen::generate(file_size, chunk_size, seed)?;

    crate::pipeline::run_pass1_pub(source, &chunk_lengths, cancel)?;

    source.seek_start()?;
    let plaintext_hash = hash_whole_stream(source, &chunk_lengths, cancel)?;

    Ok(FileDigest {
        chunk_lengths,
        plaintext_hash,
    })
}

fn hash_whole_stream(
    source: &mut impl SourceReader,
    chunk_lengths: &[u64],
    cancel: &CancellationToken,
) -> Result<[u8; HASH_LEN]> {
    let mut hasher = Sha512::new();
    let mut buf = vec![0u8; 1 << 20];

    for &len in chunk_lengths {
        cancel.check()?;
        let mut remaining = len as usize;
        while remaining > 0 {
            let take = remaining.min(buf.len());
            read_exact(source, &mut buf[..take])?;
            hasher.update(&buf[..take]);
            remaining -= take;
        }
    }

    let digest = hasher.finalize();
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    Ok(out)
}

fn read_exact(source: &mut impl SourceReader, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(crate::error::PackagerError::BadInput(
                "source stream ended before chunk was fully read".into(),
            ));
        }
        filled += n;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::io::Write as _;

    #[test]
    fn scan_matches_full_pack_chunk_lengths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let plaintext = vec![3u8; 5 * 1024 * 1024];
        File::create(&path).unwrap().write_all(&plaintext).unwrap();

        let mut scan_file = File::open(&path).unwrap();
        let digest = scan(&mut scan_file, None, Some(99), &CancellationToken::new()).unwrap();

        let mut pack_file = File::open(&path).unwrap();
        let options = crate::pipeline::PackOptions {
            seed: Some(99),
            ..crate::pipeline::PackOptions::default()
        };
        let mut sink = crate::error::NullSink;
        let (_manifest, _blocks, pack_lengths) = crate::pipeline::pack(
            &mut pack_file,
            "f.bin",
            &options,
            &crate::io_seam::RealFilesystem,
            &CancellationToken::new(),
            &mut sink,
        )
        .unwrap();

        assert_eq!(digest.chunk_lengths, pack_lengths);
        assert_eq!(digest.chunk_lengths.iter().sum::<u64>(), 5 * 1024 * 1024);
    }

    #[test]
    fn plaintext_hash_matches_direct_sha512() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        let plaintext = b"the quick brown fox jumps over the lazy dog".to_vec();
        File::create(&path).unwrap().write_all(&plaintext).unwrap();

        let mut file = File::open(&path).unwrap();
        let digest = scan(&mut file, Some(8), None, &CancellationToken::new()).unwrap();

        let expected = crate::block::sha512(&plaintext);
        assert_eq!(digest.plaintext_hash, expected);
    }
}
