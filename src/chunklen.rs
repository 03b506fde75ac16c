//! Chunk-length generator.
//!
//! Produces a finite sequence of positive lengths summing to `file_size`:
//! either exactly `chunk_size` per chunk (with a possibly short final
//! chunk), or scale-aware random lengths aligned to 128 bytes.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};

use crate::error::{PackagerError, Result};

/// Lower bound below which scale-aware chunks never shrink.
pub const ABSOLUTE_MIN_CHUNK: u64 = 1_048_576;
/// Upper bound above which scale-aware chunks never grow.
pub const ABSOLUTE_MAX_CHUNK: u64 = 10_485_760;
/// All non-final randomized chunks are rounded down to a multiple of this.
pub const ALIGNMENT: u64 = 128;

/// Produce the chunk-length sequence for a file of `file_size` bytes.
///
/// If `chunk_size` is `Some`, every chunk is exactly that length except the
/// last, which takes the remainder (and may equal `chunk_size` itself if
/// `file_size` divides evenly). If `chunk_size` is `None`, lengths are drawn
/// from a scale-aware range and rounded to 128-byte alignment; `seed` makes
/// that draw reproducible — the same seed and inputs always yield the same
/// sequence.
///
/// # Errors
/// [`PackagerError::BadInput`] if `file_size == 0` or `chunk_size == Some(0)`.
/// [`PackagerError::LengthMismatch`] if `chunk_size` is `Some` and doesn't
/// divide the file into at least one chunk and leaves every non-final chunk
/// aligned to 128 bytes — see [`generate_fixed`]'s docs for why.
pub fn generate(file_size: u64, chunk_size: Option<u64>, seed: Option<u64>) -> Result<Vec<u64>> {
    if file_size == 0 {
        return Err(PackagerError::BadInput("file_size must be >= 1".into()));
    }

    if let Some(fixed) = chunk_size {
        return generate_fixed(file_size, fixed);
    }

    generate_randomized(file_size, seed)
}

/// Every non-final chunk gets encrypted through a continuing AES-CBC stream
/// one whole block at a time; a chunk length that isn't a multiple of 16
/// would leave a ragged tail that can't go through a block cipher, and the
/// randomized generator already only ever produces non-final lengths that
/// are multiples of 128. A fixed `chunk_size` is user-supplied, so it gets
/// the same alignment requirement enforced here instead of silently
/// truncating or corrupting the ciphertext later: reject rather than pad,
/// since padding a non-final chunk would break the byte-exact round trip.
fn generate_fixed(file_size: u64, chunk_size: u64) -> Result<Vec<u64>> {
    if chunk_size == 0 {
        return Err(PackagerError::BadInput("chunk_size must be >= 1".into()));
    }
    if file_size > chunk_size && chunk_size % ALIGNMENT != 0 {
        return Err(PackagerError::LengthMismatch {
            expected: 0,
            actual: (chunk_size % ALIGNMENT) as usize,
        });
    }
    let mut lengths = Vec::new();
    let mut remaining = file_size;
    while remaining > 0 {
        let c = remaining.min(chunk_size);
        lengths.push(c);
        remaining -= c;
    }
    Ok(lengths)
}

fn generate_randomized(file_size: u64, seed: Option<u64>) -> Result<Vec<u64>> {
    let mut rng: Box<dyn RngCore> = match seed {
        Some(s) => Box::new(StdRng::seed_from_u64(s)),
        None => Box::new(StdRng::from_entropy()),
    };

    let (min_chunk, max_chunk) = scale_bounds(file_size);

    let mut lengths = Vec::new();
    let mut remaining = file_size;
    while remaining > 0 {
        let c = if max_chunk > min_chunk {
            rng.gen_range(min_chunk..max_chunk)
        } else {
            min_chunk
        };

        if remaining <= c {
            lengths.push(remaining);
            break;
        }

        let aligned = c - (c % ALIGNMENT);
        let aligned = aligned.max(ALIGNMENT);
        lengths.push(aligned);
        remaining -= aligned;
    }
    Ok(lengths)
}

/// `min_chunk = max(1 MiB, 10^(L-2))`, `max_chunk = max(10 MiB, 10^(L-1))`
/// where `L = floor(log10(file_size))`.
fn scale_bounds(file_size: u64) -> (u64, u64) {
    let l = (file_size as f64).log10().floor() as i64;
    let min_chunk = ABSOLUTE_MIN_CHUNK.max(pow10(l - 2));
    let max_chunk = ABSOLUTE_MAX_CHUNK.max(pow10(l - 1));
    (min_chunk, max_chunk)
}

fn pow10(exp: i64) -> u64 {
    if exp <= 0 {
        1
    } else {
        10u64.saturating_pow(exp.min(19) as u32)
    }
}
