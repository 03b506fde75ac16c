//! Crate-wide error taxonomy.
//!
//! One enum covers every fallible boundary in packaging and reassembly.
//! `VerificationWarning` is deliberately NOT a variant here — it is
//! non-fatal and is reported through a [`WarningSink`] instead of aborting
//! the operation (see `persist_to_directory`).

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PackagerError {
    #[error("bad input: {0}")]
    BadInput(String),

    #[error("output already exists: {}", .0.display())]
    OutputExists(PathBuf),

    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("malformed hex string: {0}")]
    BadHex(String),

    #[error("block order could not be recovered from the manifest and candidate blocks")]
    OrderingIrrecoverable,

    #[error("operation cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PackagerError>;

/// A non-fatal mismatch detected by `persist_to_directory(verify=true)`
/// between the in-memory block state and what was actually read back from
/// disk. Execution continues; the caller decides what to do with these.
#[derive(Debug, Clone)]
pub struct VerificationWarning {
    pub path: PathBuf,
    pub expected_hash: [u8; 64],
    pub actual_hash: [u8; 64],
    pub expected_len: u64,
    pub actual_len: u64,
}

impl std::fmt::Display for VerificationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "verification mismatch for {}: hash/length does not match the in-memory block \
             (expected {} bytes, on disk {} bytes)",
            self.path.display(),
            self.expected_len,
            self.actual_len,
        )
    }
}

/// Sink that collects non-fatal verification warnings.
///
/// A run that hits a `VerificationWarning` keeps going; the caller decides
/// afterward whether the warnings matter.
pub trait WarningSink {
    fn warn(&mut self, warning: VerificationWarning);
}

/// Discards every warning. Use when the caller doesn't care to collect them.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl WarningSink for NullSink {
    fn warn(&mut self, _warning: VerificationWarning) {}
}

impl WarningSink for Vec<VerificationWarning> {
    fn warn(&mut self, warning: VerificationWarning) {
        self.push(warning);
    }
}
