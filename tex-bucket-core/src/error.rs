//! Error types for the per-document pipeline.
//!
//! Every per-document failure is a [`PipelineError`]; the structural failures of an
//! inclusion graph are split out into [`StructureError`] so callers can match on
//! the four kinds directly. Only [`PipelineError::Bucket`] is fatal to a whole run.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Structural failures found while validating or merging an inclusion graph.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// Some inclusion directives point at files the document does not contain.
    #[error("Missing tex files to include: {}", .0.join(", "))]
    MissingInclusionTarget(Vec<String>),

    /// The inclusion directives form a cycle; the path ends where it started.
    #[error("Inclusion graph contains a cycle ({}), the structure is ambiguous", .0.join(" -> "))]
    CyclicInclusion(Vec<String>),

    /// Every file is included by some other file.
    #[error("No main tex file found, the structure is ambiguous")]
    NoRoot,

    /// More than one file is never included by any other file.
    #[error("Multiple potential main tex files found: {}", .0.join(", "))]
    AmbiguousRoot(Vec<String>),
}

impl StructureError {
    pub fn kind(&self) -> &'static str {
        match self {
            StructureError::MissingInclusionTarget(_) => "missing_inclusion_target",
            StructureError::CyclicInclusion(_) => "cyclic_inclusion",
            StructureError::NoRoot => "no_root",
            StructureError::AmbiguousRoot(_) => "ambiguous_root",
        }
    }
}

/// Main error type for processing one payload (and for opening a bucket).
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The payload is not a stream the sniffer recognises.
    #[error("Unrecognized payload format: {0}")]
    UnrecognizedFormat(String),

    /// I/O failure or corrupt stream while unpacking; the destination was removed.
    #[error("Failed to extract {payload}: {reason}")]
    ExtractionFailure { payload: String, reason: String },

    /// The per-document destination directory is already present.
    #[error("Extraction destination already exists: {}", .0.display())]
    DestinationExists(PathBuf),

    /// Extraction worked but nothing with the source extension came out.
    #[error("No source files found for {0}")]
    NoSourceFiles(String),

    #[error(transparent)]
    Structure(#[from] StructureError),

    /// The outer bucket container cannot be read.
    #[error("Bucket container {} is unreadable: {source}", .path.display())]
    Bucket {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Stable snake_case tag used in logs and in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::UnrecognizedFormat(_) => "unrecognized_format",
            PipelineError::ExtractionFailure { .. } => "extraction_failure",
            PipelineError::DestinationExists(_) => "destination_exists",
            PipelineError::NoSourceFiles(_) => "no_source_files",
            PipelineError::Structure(e) => e.kind(),
            PipelineError::Bucket { .. } => "bucket_unreadable",
            PipelineError::Io(_) => "io",
        }
    }

    /// Whether the error ends the whole run rather than a single document.
    pub fn is_fatal(&self) -> bool {
        matches!(self, PipelineError::Bucket { .. })
    }
}

/// Errors from the downstream text-conversion collaborator.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("Conversion exceeded its {0:?} budget")]
    Timeout(Duration),

    #[error("Converter failed: {0}")]
    Failed(String),

    #[error("Converter I/O error: {0}")]
    Io(#[from] std::io::Error),
}
