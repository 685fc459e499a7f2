//! Per-payload extraction.
//!
//! A payload is decompressed once into memory. If the stream is a tar container
//! every member is materialised under `<extract_root>/<document>/`; otherwise the
//! stream is written as a single file named after the gzip header's original
//! file name, or after the configured fallback. The destination directory is
//! created exclusively and removed again on any failure.

use std::fs;
use std::io::{self, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use tracing::{debug, error, info, warn};

use crate::contract::{ExtractedDocument, Payload};
use crate::error::PipelineError;
use crate::sniff::{self, PayloadFormat};

pub const DEFAULT_SOURCE_EXTENSION: &str = ".tex";
pub const DEFAULT_FALLBACK_NAME: &str = "source.tex";

const STRIPPED_SUFFIXES: [&str; 3] = [".gz", ".tgz", ".tar"];

#[derive(Debug, Clone)]
pub struct UnpackOptions {
    pub source_extension: String,
    /// Name for a single-file payload whose gzip header carries no file name.
    pub fallback_name: String,
    /// Name nameless single-file payloads `<document><extension>` instead.
    pub salt_fallback_name: bool,
    /// Delete the payload archive after a successful extraction.
    pub remove_payload: bool,
}

impl Default for UnpackOptions {
    fn default() -> Self {
        Self {
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            fallback_name: DEFAULT_FALLBACK_NAME.to_string(),
            salt_fallback_name: false,
            remove_payload: false,
        }
    }
}

/// Document name for a payload: its name with compression and container suffixes stripped.
pub fn document_name(payload_name: &str) -> String {
    let mut name = payload_name;
    while let Some(stripped) = STRIPPED_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
    {
        name = stripped;
    }
    name.to_string()
}

/// Unpack `payload` into a fresh directory under `extract_root`.
pub fn unpack(
    payload: &Payload,
    extract_root: &Path,
    opts: &UnpackOptions,
) -> Result<ExtractedDocument, PipelineError> {
    let bytes = payload
        .read_bytes()
        .map_err(|e| extraction_failure(payload, format!("cannot read payload: {e}")))?;

    let format = sniff::classify(&bytes);
    debug!(payload = %payload.name, ?format, "[UNPACK] Classified payload");
    if format == PayloadFormat::Unknown {
        return Err(PipelineError::UnrecognizedFormat(payload.name.clone()));
    }

    let name = document_name(&payload.name);
    let dir = extract_root.join(&name);
    match fs::create_dir(&dir) {
        Ok(()) => {}
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
            error!(path = %dir.display(), "[UNPACK] Destination already exists, refusing to merge documents");
            return Err(PipelineError::DestinationExists(dir));
        }
        Err(e) => {
            return Err(extraction_failure(
                payload,
                format!("cannot create {}: {e}", dir.display()),
            ))
        }
    }

    match extract_into(&bytes, format, &dir, &name, opts) {
        Ok(files) => {
            info!(payload = %payload.name, path = %dir.display(), files, "[UNPACK] Extracted payload");
            if opts.remove_payload {
                if let Err(e) = fs::remove_file(&payload.path) {
                    warn!(path = %payload.path.display(), error = ?e, "[UNPACK] Failed to remove payload archive");
                }
            }
            Ok(ExtractedDocument { name, dir })
        }
        Err(e) => {
            error!(payload = %payload.name, error = ?e, "[UNPACK] Extraction failed, removing destination");
            if let Err(cleanup) = fs::remove_dir_all(&dir) {
                error!(path = %dir.display(), error = ?cleanup, "[UNPACK] Failed to remove partial destination");
            }
            Err(extraction_failure(payload, e.to_string()))
        }
    }
}

fn extraction_failure(payload: &Payload, reason: String) -> PipelineError {
    PipelineError::ExtractionFailure {
        payload: payload.name.clone(),
        reason,
    }
}

/// Returns the number of files written.
fn extract_into(
    bytes: &[u8],
    format: PayloadFormat,
    dir: &Path,
    document: &str,
    opts: &UnpackOptions,
) -> io::Result<usize> {
    let mut decoder = GzDecoder::new(bytes);
    let mut data = Vec::new();
    decoder.read_to_end(&mut data)?;
    let embedded_name = decoder
        .header()
        .and_then(|h| h.filename())
        .map(|raw| String::from_utf8_lossy(raw).into_owned());

    if format == PayloadFormat::CompressedContainer && is_container(&data) {
        return unpack_container(&data, dir);
    }

    let file_name = single_file_name(embedded_name.as_deref(), document, opts);
    debug!(file = %file_name, embedded = ?embedded_name, "[UNPACK] Writing single-file payload");
    fs::write(dir.join(&file_name), &data)?;
    Ok(1)
}

/// Walk every header without writing anything, so a broken container can still
/// fall back to the single-file interpretation.
fn is_container(data: &[u8]) -> bool {
    let mut archive = tar::Archive::new(data);
    let Ok(entries) = archive.entries() else {
        return false;
    };
    let mut members = 0usize;
    for entry in entries {
        if entry.is_err() {
            return false;
        }
        members += 1;
    }
    members > 0
}

fn unpack_container(data: &[u8], dir: &Path) -> io::Result<usize> {
    let mut archive = tar::Archive::new(data);
    let mut files = 0usize;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let member = entry.path()?.into_owned();
        let is_file = entry.header().entry_type().is_file();
        if entry.unpack_in(dir)? {
            if is_file {
                files += 1;
            }
            debug!(member = %member.display(), "[UNPACK] Extracted member");
        } else {
            warn!(member = %member.display(), "[UNPACK] Skipped member outside the destination");
        }
    }
    Ok(files)
}

fn single_file_name(embedded: Option<&str>, document: &str, opts: &UnpackOptions) -> String {
    let recovered = embedded
        .map(|name| name.rsplit(['/', '\\']).next().unwrap_or(name).trim())
        .filter(|name| !name.is_empty() && *name != "." && *name != "..");
    match recovered {
        Some(name) => name.to_string(),
        None if opts.salt_fallback_name => format!("{document}{}", opts.source_extension),
        None => opts.fallback_name.clone(),
    }
}
