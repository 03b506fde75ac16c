//! External I/O seams: the only side effects the packaging and reassembly
//! pipelines are permitted to perform. Consumed by `pipeline`, `reassemble`,
//! and `metadata`; kept as traits so tests can substitute in-memory fakes
//! without touching the filesystem.

use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::Result;

/// A readable byte stream with a known length and the ability to rewind —
/// exactly what Pass 1 (hash) and Pass 2 (encrypt) need from the source
/// file: read it once to hash, then seek back to the start and read it
/// again to encrypt.
pub trait SourceReader {
    fn length(&mut self) -> Result<u64>;
    fn seek_start(&mut self) -> Result<()>;
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;
}

impl SourceReader for File {
    fn length(&mut self) -> Result<u64> {
        Ok(self.metadata()?.len())
    }

    fn seek_start(&mut self) -> Result<()> {
        self.seek(SeekFrom::Start(0))?;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(Read::read(self, buf)?)
    }
}

/// A writable byte sink — a persisted block file.
pub trait BlockWriter {
    fn write(&mut self, buf: &[u8]) -> Result<()>;
}

impl BlockWriter for File {
    fn write(&mut self, buf: &[u8]) -> Result<()> {
        Write::write_all(self, buf)?;
        Ok(())
    }
}

/// The filesystem facade the core is allowed to call through. `RealFilesystem`
/// is the only implementation shipped; tests that need isolation construct
/// their own `tempfile::tempdir()` and still go through this trait, so the
/// core never hardcodes a path outside what it's handed.
pub trait Filesystem {
    fn open_new(&self, path: &Path) -> Result<File>;
    fn open_read(&self, path: &Path) -> Result<File>;
    fn rename(&self, src: &Path, dst: &Path) -> Result<()>;
    fn delete(&self, path: &Path) -> Result<()>;
    fn exists(&self, path: &Path) -> bool;
    fn make_temp_file(&self) -> Result<(File, PathBuf)>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct RealFilesystem;

impl Filesystem for RealFilesystem {
    fn open_new(&self, path: &Path) -> Result<File> {
        Ok(File::create(path)?)
    }

    fn open_read(&self, path: &Path) -> Result<File> {
        Ok(File::open(path)?)
    }

    fn rename(&self, src: &Path, dst: &Path) -> Result<()> {
        fs::rename(src, dst)?;
        Ok(())
    }

    fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(path)?;
        Ok(())
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }

    fn make_temp_file(&self) -> Result<(File, PathBuf)> {
        let tmp = tempfile::NamedTempFile::new()?;
        let (file, path) = tmp.keep().map_err(|e| e.error)?;
        Ok((file, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn real_filesystem_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let fs = RealFilesystem;
        let path = dir.path().join("a.bin");

        let mut w = fs.open_new(&path).unwrap();
        BlockWriter::write(&mut w, b"hello").unwrap();
        drop(w);

        assert!(fs.exists(&path));
        let mut r = fs.open_read(&path).unwrap();
        assert_eq!(SourceReader::length(&mut r).unwrap(), 5);

        let dst = dir.path().join("b.bin");
        fs.rename(&path, &dst).unwrap();
        assert!(!fs.exists(&path));
        assert!(fs.exists(&dst));

        fs.delete(&dst).unwrap();
        assert!(!fs.exists(&dst));
    }

    #[test]
    fn make_temp_file_is_writable() {
        let fs = RealFilesystem;
        let (mut file, path) = fs.make_temp_file().unwrap();
        BlockWriter::write(&mut file, b"temp contents").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"temp contents");
    }
}
