//! Per-bucket orchestration: split → unpack → clean → graph → validate → merge → (convert).
//!
//! [`run_bucket`] drives every payload of one bucket through the stages and
//! collects a [`BucketReport`]. The stages of one document are synchronous and run
//! on the blocking pool; documents themselves run `concurrency` at a time.
//!
//! # Error Handling
//! Every per-document failure is caught at the document boundary, logged with its
//! kind and recorded in the report; the run continues with the next document. Only
//! an unreadable bucket, or output/extraction roots that cannot be created, end the
//! run with an error.
//!
//! # Filesystem
//! Each document owns `<extract_dir>/<document>/` while it is processed and the
//! directory is removed once the document is merged or given up on. Document
//! names are claimed in bucket order before any work starts: a later payload with
//! an already claimed name fails with `DestinationExists`. Results go to
//! `<output_dir>/<document>.tex` (and `.txt` with a converter), and the report to
//! `<output_dir>/report.json`.

use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::bucket;
use crate::config::ProcessConfig;
use crate::contract::{MergedDocument, Payload, TextConverter};
use crate::convert::{convert_with_deadline, prepare_for_conversion, tidy_plain_text};
use crate::error::{ConvertError, PipelineError};
use crate::graph::InclusionGraph;
use crate::merge::merge_with;
use crate::sources::{load_source_files, prune_non_source};
use crate::tokenizer::Tokenizer;
use crate::unpack::{document_name, unpack};

pub const REPORT_FILE_NAME: &str = "report.json";
const MERGED_EXTENSION: &str = "tex";
const PROSE_EXTENSION: &str = "txt";

/// Optional prose conversion of every merged document.
#[derive(Clone, Copy)]
pub struct Conversion<'a> {
    pub converter: &'a dyn TextConverter,
    pub deadline: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    /// Merged text written.
    Merged,
    /// Structural failure: missing target, cycle, or no unique root.
    Rejected,
    /// The payload could not be recognised or unpacked.
    ExtractionFailed,
    /// Unpacked, but nothing to merge (no source files) or an I/O failure.
    Skipped,
}

impl DocumentStatus {
    fn for_error(error: &PipelineError) -> Self {
        match error {
            PipelineError::Structure(_) => DocumentStatus::Rejected,
            PipelineError::UnrecognizedFormat(_)
            | PipelineError::ExtractionFailure { .. }
            | PipelineError::DestinationExists(_) => DocumentStatus::ExtractionFailed,
            _ => DocumentStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentReport {
    pub name: String,
    pub status: DocumentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_kind: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prose_output: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prose_chars: Option<usize>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl DocumentReport {
    fn failed(name: String, error: &PipelineError) -> Self {
        Self {
            name,
            status: DocumentStatus::for_error(error),
            failure_kind: Some(error.kind().to_string()),
            message: Some(error.to_string()),
            root: None,
            output: None,
            prose_output: None,
            prose_chars: None,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BucketReport {
    pub run_id: String,
    pub bucket: String,
    pub documents: Vec<DocumentReport>,
    pub merged: usize,
    pub skipped: usize,
}

impl BucketReport {
    fn new(bucket: String, mut documents: Vec<DocumentReport>) -> Self {
        documents.sort_by(|a, b| a.name.cmp(&b.name));
        let merged = documents
            .iter()
            .filter(|d| d.status == DocumentStatus::Merged)
            .count();
        Self {
            run_id: Uuid::new_v4().to_string(),
            bucket,
            skipped: documents.len() - merged,
            documents,
            merged,
        }
    }

    pub fn document(&self, name: &str) -> Option<&DocumentReport> {
        self.documents.iter().find(|d| d.name == name)
    }
}

/// Process every payload of the bucket at `bucket_path`.
pub async fn run_bucket(
    config: &ProcessConfig,
    bucket_path: &Path,
    conversion: Option<Conversion<'_>>,
) -> Result<BucketReport, PipelineError> {
    info!(bucket = %bucket_path.display(), "[PIPELINE] Starting bucket run");
    for dir in [&config.archive_dir, &config.extract_dir, &config.output_dir] {
        if let Err(e) = fs::create_dir_all(dir) {
            error!(path = %dir.display(), error = ?e, "[PIPELINE] Failed to create working directory");
            return Err(e.into());
        }
    }

    let payloads = match bucket::split(bucket_path, &config.archive_dir, &config.payload_suffix) {
        Ok(payloads) => payloads,
        Err(e) => {
            error!(bucket = %bucket_path.display(), error = %e, kind = e.kind(), "[PIPELINE] Cannot split bucket");
            return Err(e);
        }
    };

    let (payloads, mut documents) = claim_document_names(config, payloads);
    let shared = Arc::new(config.clone());
    let processed: Vec<DocumentReport> = stream::iter(payloads)
        .map(|payload| process_document(Arc::clone(&shared), payload, conversion))
        .buffer_unordered(config.concurrency.max(1))
        .collect()
        .await;
    documents.extend(processed);

    let bucket = bucket_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| bucket_path.display().to_string());
    let report = BucketReport::new(bucket, documents);
    write_report(&config.output_dir, &report)?;
    info!(
        run_id = %report.run_id,
        merged = report.merged,
        skipped = report.skipped,
        "[PIPELINE] Bucket run finished"
    );
    Ok(report)
}

/// Keep the first payload for every document name. The others are reported as
/// failed without being unpacked, so no two documents share an output file.
fn claim_document_names(
    config: &ProcessConfig,
    payloads: Vec<Payload>,
) -> (Vec<Payload>, Vec<DocumentReport>) {
    let mut claimed = HashSet::new();
    let mut kept = Vec::with_capacity(payloads.len());
    let mut refused = Vec::new();
    for payload in payloads {
        let name = document_name(&payload.name);
        if claimed.insert(name.clone()) {
            kept.push(payload);
            continue;
        }
        let e = PipelineError::DestinationExists(
            config.output_dir.join(format!("{name}.{MERGED_EXTENSION}")),
        );
        warn!(document = %name, payload = %payload.name, "[PIPELINE] Document name already claimed in this bucket");
        refused.push(DocumentReport::failed(name, &e));
    }
    (kept, refused)
}

fn write_report(output_dir: &Path, report: &BucketReport) -> Result<(), PipelineError> {
    let path = output_dir.join(REPORT_FILE_NAME);
    let json = serde_json::to_vec_pretty(report).map_err(std::io::Error::other)?;
    fs::write(&path, json)?;
    debug!(path = %path.display(), "[PIPELINE] Report written");
    Ok(())
}

async fn process_document(
    config: Arc<ProcessConfig>,
    payload: Payload,
    conversion: Option<Conversion<'_>>,
) -> DocumentReport {
    let name = document_name(&payload.name);
    let blocking_config = Arc::clone(&config);
    let resolved = tokio::task::spawn_blocking(move || resolve_payload(&blocking_config, &payload))
        .await
        .map_err(|e| PipelineError::Io(std::io::Error::other(e)))
        .and_then(|r| r);

    let merged = match resolved {
        Ok(merged) => merged,
        Err(e) => {
            error!(document = %name, kind = e.kind(), error = %e, "[PIPELINE] Document skipped");
            return DocumentReport::failed(name, &e);
        }
    };

    let output = config.output_dir.join(format!("{name}.{MERGED_EXTENSION}"));
    if let Err(e) = fs::write(&output, &merged.text) {
        let e = PipelineError::Io(e);
        error!(document = %name, path = %output.display(), error = %e, "[PIPELINE] Failed to write merged document");
        return DocumentReport::failed(name, &e);
    }
    info!(document = %name, root = %merged.root, path = %output.display(), "[PIPELINE] Document merged");

    let mut report = DocumentReport {
        name,
        status: DocumentStatus::Merged,
        failure_kind: None,
        message: None,
        root: Some(merged.root.clone()),
        output: Some(output),
        prose_output: None,
        prose_chars: None,
        notes: Vec::new(),
    };
    if let Some(conversion) = conversion {
        convert_document(&config.output_dir, &merged, conversion, &mut report).await;
    }
    report
}

/// Convert a merged document into prose. A timeout or converter failure leaves an
/// empty prose file and a note; the merged text stays valid either way.
async fn convert_document(
    output_dir: &Path,
    merged: &MergedDocument,
    conversion: Conversion<'_>,
    report: &mut DocumentReport,
) {
    let prepared = prepare_for_conversion(&merged.text);
    let prose = match convert_with_deadline(conversion.converter, prepared, conversion.deadline).await {
        Ok(plain) => tidy_plain_text(&plain),
        Err(e) => {
            let note = match e {
                ConvertError::Timeout(_) => "conversion_timeout",
                _ => "conversion_failed",
            };
            warn!(document = %report.name, error = %e, "[CONVERT] Conversion gave no prose");
            report.notes.push(note.to_string());
            String::new()
        }
    };

    let path = output_dir.join(format!("{}.{PROSE_EXTENSION}", report.name));
    match fs::write(&path, &prose) {
        Ok(()) => {
            debug!(document = %report.name, chars = prose.chars().count(), "[CONVERT] Prose written");
            report.prose_chars = Some(prose.chars().count());
            report.prose_output = Some(path);
        }
        Err(e) => {
            error!(document = %report.name, path = %path.display(), error = ?e, "[CONVERT] Failed to write prose");
            report.notes.push("prose_write_failed".to_string());
        }
    }
}

/// Unpack one payload and merge it. The extracted directory is removed whatever
/// the outcome.
pub fn resolve_payload(
    config: &ProcessConfig,
    payload: &Payload,
) -> Result<MergedDocument, PipelineError> {
    let document = unpack(payload, &config.extract_dir, &config.unpack_options())?;
    let result = resolve_directory(
        &document.dir,
        &config.tokenizer(),
        &config.source_extension,
        !config.keep_non_source_files,
    );
    let name = document.name.clone();
    if let Err(e) = document.discard() {
        warn!(document = %name, error = ?e, "[PIPELINE] Failed to remove extracted directory");
    }
    result
}

/// Clean, validate and merge the source files of an extracted directory.
pub fn resolve_directory(
    dir: &Path,
    tokenizer: &Tokenizer,
    extension: &str,
    prune: bool,
) -> Result<MergedDocument, PipelineError> {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.display().to_string());
    if prune {
        prune_non_source(dir, extension)?;
    }

    let mut sources = load_source_files(dir, extension)?;
    if sources.is_empty() {
        return Err(PipelineError::NoSourceFiles(name));
    }
    let cleaned: BTreeMap<String, String> = sources
        .iter_mut()
        .map(|file| {
            tokenizer.clean_file(file);
            (file.path.clone(), std::mem::take(&mut file.cleaned))
        })
        .collect();

    let graph = InclusionGraph::build(&cleaned, extension, tokenizer);
    let root = graph.validate()?;
    debug!(document = %name, root = %root, files = graph.len(), "[PIPELINE] Inclusion graph validated");
    merge_with(cleaned, &root, extension, tokenizer).map_err(Into::into)
}
