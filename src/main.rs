use std::fs::{self, File};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use cryptshard::{
    block, cancel::CancellationToken, manifest::LocalShareFileManifest, metadata, pipeline,
    reassemble, FileManifest,
};

#[derive(Parser)]
#[command(name = "cryptshard", version = "0.1.0", about = "Content-obfuscating file packager")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a file into encrypted blocks plus a manifest
    Pack {
        input: PathBuf,
        /// Directory to write block files and the manifest into
        #[arg(short, long)]
        output_dir: PathBuf,
        /// Fixed chunk size in bytes; omit for scale-aware random lengths
        #[arg(long)]
        chunk_size: Option<u64>,
        /// Seed for the random chunk-length generator (ignored with --chunk-size)
        #[arg(long)]
        seed: Option<u64>,
        #[arg(long)]
        overwrite: bool,
        /// Re-read and re-hash each block file after writing it
        #[arg(long)]
        verify: bool,
    },
    /// Reconstruct a file from a manifest and its block files
    Unpack {
        manifest: PathBuf,
        /// Directory containing the candidate block files
        #[arg(short, long)]
        blocks_dir: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        #[arg(long)]
        overwrite: bool,
    },
    /// Pre-hash a file without writing any block to disk
    Scan {
        input: PathBuf,
        #[arg(long)]
        chunk_size: Option<u64>,
        #[arg(long)]
        seed: Option<u64>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    match Cli::parse().command {
        Commands::Pack {
            input,
            output_dir,
            chunk_size,
            seed,
            overwrite,
            verify,
        } => run_pack(&input, &output_dir, chunk_size, seed, overwrite, verify)?,

        Commands::Unpack {
            manifest,
            blocks_dir,
            output,
            overwrite,
        } => run_unpack(&manifest, &blocks_dir, &output, overwrite)?,

        Commands::Scan { input, chunk_size, seed } => run_scan(&input, chunk_size, seed)?,
    }

    Ok(())
}

fn run_pack(
    input: &PathBuf,
    output_dir: &PathBuf,
    chunk_size: Option<u64>,
    seed: Option<u64>,
    overwrite: bool,
    verify: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    fs::create_dir_all(output_dir)?;

    let name = input
        .file_name()
        .ok_or("input path has no file name")?
        .to_string_lossy()
        .into_owned();

    let mut source = File::open(input)?;
    let options = pipeline::PackOptions {
        chunk_size,
        seed,
        persist: pipeline::Persist::Directory(output_dir.clone()),
        overwrite,
        verify_on_write: verify,
    };

    let mut warnings = Vec::new();
    let (manifest, _blocks, chunk_lengths) = pipeline::pack(
        &mut source,
        &name,
        &options,
        &cryptshard::io_seam::RealFilesystem,
        &CancellationToken::new(),
        &mut warnings,
    )?;

    for w in &warnings {
        eprintln!("warning: {w}");
    }

    let plaintext_hash = block::sha512(&fs::read(input)?);
    let local = LocalShareFileManifest {
        manifest: manifest.clone(),
        local_path: input.to_string_lossy().into_owned(),
        size_bytes: chunk_lengths.iter().sum::<u64>() as i64,
        hash: cryptshard::bytes::to_hex(&plaintext_hash),
        block_lengths: chunk_lengths.iter().map(|c| c.to_string()).collect(),
    };

    fs::write(output_dir.join("manifest.json"), manifest.to_bytes()?)?;
    fs::write(output_dir.join("manifest.local.json"), local.to_bytes()?)?;

    println!(
        "packed {} into {} block(s) under {}",
        input.display(),
        manifest.block_hashes.len(),
        output_dir.display()
    );
    Ok(())
}

fn run_unpack(
    manifest_path: &PathBuf,
    blocks_dir: &PathBuf,
    output: &PathBuf,
    overwrite: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let bytes = fs::read(manifest_path)?;
    let local = LocalShareFileManifest::from_bytes(&bytes).ok();
    let manifest: FileManifest = match &local {
        Some(local) => local.manifest.clone(),
        None => FileManifest::from_bytes(&bytes)?,
    };

    let mut candidates: Vec<PathBuf> = fs::read_dir(blocks_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file())
        .collect();
    candidates.sort();

    let report = reassemble::reassemble(
        &manifest,
        &candidates,
        output,
        overwrite,
        local.as_ref(),
        &cryptshard::io_seam::RealFilesystem,
        &CancellationToken::new(),
    )?;

    println!("{}", report.summary());
    Ok(())
}

fn run_scan(
    input: &PathBuf,
    chunk_size: Option<u64>,
    seed: Option<u64>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut source = File::open(input)?;
    let digest = metadata::scan(&mut source, chunk_size, seed, &CancellationToken::new())?;

    println!("chunks: {}", digest.chunk_lengths.len());
    println!("plaintext hash: {}", cryptshard::bytes::to_hex(&digest.plaintext_hash));
    println!("chunk lengths: {:?}", digest.chunk_lengths);
    Ok(())
}
