///
/// This module implements the CLI interface for tex-bucket: command parsing, argument
/// validation and the async entrypoint.
///
/// All pipeline logic lives in the [`tex-bucket-core`] crate; this module is strictly
/// CLI glue and user-visible output.
///
/// ## Subcommands
/// - `process`: split a bucket tarball and merge every document in it.
/// - `merge`: merge one already-extracted document directory.
/// - `fetch`: download configured source bundles or buckets.
///
/// ## How To Use
/// - For command-line users: use the installed `tex-bucket` binary with `--help`.
/// - For programmatic/integration use: call [`run`] with a constructed [`Cli`].
///
/// [`tex-bucket-core`]: ../../tex-bucket-core/
use crate::load_config::load_config;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tex_bucket_core::contract::Downloader;
use tex_bucket_core::convert::ProcessConverter;
use tex_bucket_core::download::HttpDownloader;
use tex_bucket_core::pipeline::{self, BucketReport, Conversion, DocumentStatus};
use tex_bucket_core::tokenizer::Tokenizer;
use tex_bucket_core::unpack::DEFAULT_SOURCE_EXTENSION;

/// CLI for tex-bucket: reconstruct single-file sources from preprint source buckets.
#[derive(Parser)]
#[clap(
    name = "tex-bucket",
    version,
    about = "Split preprint source buckets and merge every document into one comment-free source file"
)]
pub struct Cli {
    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process every document of a bucket tarball using the given config file
    Process {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
        /// Path to the bucket tarball
        #[clap(long)]
        bucket: PathBuf,
    },
    /// Merge an already-extracted document directory into one source text
    Merge {
        /// Directory holding the document's source files
        #[clap(long)]
        dir: PathBuf,
        /// Write the merged text here instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Download the sources listed in the config file
    Fetch {
        /// Path to the YAML config file
        #[clap(long)]
        config: PathBuf,
    },
}

/// Extracted async CLI logic entrypoint for integration tests and main()
pub async fn run(cli: Cli) -> Result<()> {
    // Emit a top-level 'trace_initialised' event at the very start
    tracing::info!("trace_initialised");

    match cli.command {
        Commands::Process { config, bucket } => {
            let config = load_config(config)?;
            tracing::info!(command = "process", bucket = %bucket.display(), "Starting bucket processing");
            let converter = config.convert.as_ref().map(ProcessConverter::from_config);
            let conversion = match (&converter, &config.convert) {
                (Some(converter), Some(convert)) => Some(Conversion {
                    converter,
                    deadline: convert.deadline(),
                }),
                _ => None,
            };
            let report = pipeline::run_bucket(&config.process, &bucket, conversion)
                .await
                .with_context(|| format!("Processing bucket {} failed", bucket.display()))?;
            print_summary(&report);
            tracing::info!(command = "process", run_id = %report.run_id, "Bucket processing complete");
            Ok(())
        }
        Commands::Merge { dir, output } => {
            tracing::info!(command = "merge", dir = %dir.display(), "Merging document directory");
            let merged = pipeline::resolve_directory(
                &dir,
                &Tokenizer::default(),
                DEFAULT_SOURCE_EXTENSION,
                false,
            )
            .map_err(|e| anyhow::anyhow!("{}: {e}", e.kind()))
            .with_context(|| format!("Cannot merge {}", dir.display()))?;
            match output {
                Some(path) => {
                    std::fs::write(&path, &merged.text)
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    println!("Merged {} files from root {} into {}", merged.included.len(), merged.root, path.display());
                }
                None => print!("{}", merged.text),
            }
            Ok(())
        }
        Commands::Fetch { config } => {
            let config = load_config(config)?;
            let download = config
                .download
                .context("The config has no download section")?;
            tracing::info!(command = "fetch", sources = download.sources.len(), "Starting download");
            let downloader = HttpDownloader::new(download);
            let manifest = Downloader::download_all(&downloader)
                .await
                .map_err(|e| anyhow::Error::msg(format!("Download failed: {e}")))?;
            for file in &manifest.files {
                println!("fetched {} -> {} ({} bytes)", file.url, file.local_path.display(), file.bytes);
            }
            for failure in &manifest.failures {
                println!("failed  {}: {}", failure.url, failure.reason);
            }
            Ok(())
        }
    }
}

fn print_summary(report: &BucketReport) {
    println!(
        "Processed bucket {}: {} merged, {} skipped (report run {})",
        report.bucket, report.merged, report.skipped, report.run_id
    );
    for doc in report.documents.iter().filter(|d| d.status != DocumentStatus::Merged) {
        println!(
            "  {} [{}]: {}",
            doc.name,
            doc.failure_kind.as_deref().unwrap_or("unknown"),
            doc.message.as_deref().unwrap_or_default()
        );
    }
    for doc in report.documents.iter().filter(|d| !d.notes.is_empty()) {
        println!("  {} notes: {}", doc.name, doc.notes.join(", "));
    }
}
