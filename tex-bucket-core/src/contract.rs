//! # contract: data model and collaborator interfaces
//!
//! This module holds the plain data passed between pipeline stages
//! ([`Payload`], [`ExtractedDocument`], [`SourceFile`], [`MergedDocument`]) and the
//! two traits behind which the external collaborators live:
//!
//! - [`Downloader`] fetches source bundles or bucket tarballs to local disk.
//! - [`TextConverter`] turns a merged source text into prose.
//!
//! ## Mocking & Testing
//! - Both traits are annotated for `mockall` so consumers can generate deterministic
//!   mocks for unit/integration tests (exported under the `test-export-mocks` feature).
//!
//! ## Adding New Collaborators
//! - Implement the trait for your backend.
//! - Convert all upstream errors into the trait's error type; the pipeline never
//!   retries, it only records the failure for the affected document.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mockall::automock;
use serde::Serialize;
use tracing::debug;

use crate::error::ConvertError;

/// One document's compressed source bundle, copied out of a bucket container.
///
/// Identity is the name the member had inside its container; the bytes live on
/// disk at `path` and are never modified once written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub name: String,
    pub path: PathBuf,
}

impl Payload {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// Payload for a file that already sits on disk, named after its file name.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self::new(name, path)
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// The directory holding one unpacked payload.
///
/// Owned by exactly one pipeline worker. Consuming [`ExtractedDocument::discard`]
/// removes the backing directory, so a document cannot be discarded twice.
#[derive(Debug, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub name: String,
    pub dir: PathBuf,
}

impl ExtractedDocument {
    pub fn discard(self) -> io::Result<()> {
        debug!(document = %self.name, path = %self.dir.display(), "Removing extracted document directory");
        fs::remove_dir_all(&self.dir)
    }
}

/// A source file of an extracted document.
///
/// `path` is relative to the document directory with `/` separators; `cleaned` is
/// empty until the file went through the tokenizer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: String,
    pub raw: String,
    pub cleaned: String,
}

impl SourceFile {
    pub fn new(path: impl Into<String>, raw: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            raw: raw.into(),
            cleaned: String::new(),
        }
    }
}

/// The single text produced by merging a document from its root file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MergedDocument {
    /// Path of the root (main) file the merge started from.
    pub root: String,
    pub text: String,
    /// Every file whose content was substituted into the text, root included.
    pub included: Vec<String>,
}

/// Error type for Downloader trait (simple boxed error for now)
pub type DownloadError = Box<dyn std::error::Error + Send + Sync>;

/// Manifest returned from a download operation, describing exactly what was downloaded and where.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadedManifest {
    pub files: Vec<DownloadedFile>,
    pub failures: Vec<FailedDownload>,
}

/// Describes a successfully downloaded file in the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct DownloadedFile {
    pub url: String,
    pub local_path: PathBuf,
    pub bytes: u64,
}

/// A source that could not be fetched; the run carries on without it.
#[derive(Debug, Clone, Serialize)]
pub struct FailedDownload {
    pub url: String,
    pub reason: String,
}

/// Trait for downloading all sources as specified in configuration.
/// Allows plugging in real, test, or mockable downloaders.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait Downloader: Send + Sync {
    /// Download all configured sources into the configured output directory,
    /// returning a manifest of what was downloaded and where.
    async fn download_all(&self) -> Result<DownloadedManifest, DownloadError>;
}

/// Downstream conversion of a merged source text into prose.
///
/// Implementations may run for an unbounded time on adversarial input. Callers
/// go through [`crate::convert::convert_with_deadline`], which drops the future on
/// expiry; implementations must release their resources when dropped.
#[cfg_attr(any(test, feature = "test-export-mocks"), automock)]
#[async_trait]
pub trait TextConverter: Send + Sync {
    async fn convert(&self, text: String) -> Result<String, ConvertError>;
}
