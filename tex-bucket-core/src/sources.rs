//! Listing and loading the source files of an extracted document.

use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};
use walkdir::WalkDir;

use crate::contract::SourceFile;

/// Relative, `/`-separated paths of every file under `dir` ending in `extension`, sorted.
pub fn find_source_files(dir: &Path, extension: &str) -> io::Result<Vec<String>> {
    let mut found = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let Ok(relative) = entry.path().strip_prefix(dir) else {
            continue;
        };
        let relative: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let relative = relative.join("/");
        if relative.ends_with(extension) {
            found.push(relative);
        }
    }
    found.sort();
    debug!(path = %dir.display(), count = found.len(), "Found source files");
    Ok(found)
}

/// Read the source files of `dir`. Invalid UTF-8 is replaced, not rejected.
pub fn load_source_files(dir: &Path, extension: &str) -> io::Result<Vec<SourceFile>> {
    find_source_files(dir, extension)?
        .into_iter()
        .map(|relative| {
            let bytes = fs::read(dir.join(&relative))?;
            Ok(SourceFile::new(
                relative,
                String::from_utf8_lossy(&bytes).into_owned(),
            ))
        })
        .collect()
}

/// Delete every entry of `dir` that neither is a source file nor (recursively)
/// contains one. Returns whether any source file is left.
pub fn prune_non_source(dir: &Path, extension: &str) -> io::Result<bool> {
    let mut kept = 0usize;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            if prune_non_source(&path, extension)? {
                kept += 1;
            } else {
                fs::remove_dir_all(&path)?;
            }
        } else if file_type.is_file() && entry.file_name().to_string_lossy().ends_with(extension) {
            kept += 1;
        } else {
            debug!(path = %path.display(), "Removing non-source entry");
            fs::remove_file(&path)?;
        }
    }
    if kept == 0 {
        info!(path = %dir.display(), "No source files left after pruning");
    }
    Ok(kept > 0)
}
