//! cryptshard — content-obfuscating file packager.
//!
//! Splits a file into encrypted, variable-length blocks whose filenames
//! reveal nothing about their order, plus a small JSON manifest. The
//! encryption key is never stored: it's reconstructible only once every
//! block is present, via an XOR interlock over the blocks' hashes (see
//! [`unlock`]). There is no authentication tag and no resistance to a
//! chosen-ciphertext adversary — see each module's docs for what is and
//! isn't covered.

pub mod block;
pub mod bytes;
pub mod cancel;
pub mod chunklen;
pub mod crypto;
pub mod error;
pub mod io_seam;
pub mod manifest;
pub mod metadata;
pub mod pipeline;
pub mod reassemble;
pub mod unlock;

pub use block::Block;
pub use cancel::CancellationToken;
pub use error::{PackagerError, Result, VerificationWarning, WarningSink};
pub use manifest::{FileManifest, LocalShareFileManifest};
pub use metadata::{scan as scan_metadata, FileDigest};
pub use pipeline::{pack, PackOptions, Persist};
pub use reassemble::{reassemble, RecoveryReport};
