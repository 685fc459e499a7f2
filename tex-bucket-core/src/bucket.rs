//! Splitting a bucket tarball into per-document payloads.
//!
//! A bucket is an uncompressed tar whose members are individually compressed
//! source bundles, mixed with rendered output (PDFs) that is skipped. Members are
//! copied byte for byte into the archive directory under their base name.
//! Duplicate base names overwrite each other; callers that care must check first.

use std::fs::{self, File};
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::contract::Payload;
use crate::error::PipelineError;

pub const DEFAULT_PAYLOAD_SUFFIX: &str = ".gz";

/// An opened bucket container.
pub struct BucketArchive {
    path: PathBuf,
    archive: tar::Archive<BufReader<File>>,
}

impl BucketArchive {
    pub fn open(path: &Path) -> Result<Self, PipelineError> {
        let file = File::open(path).map_err(|source| PipelineError::Bucket {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            archive: tar::Archive::new(BufReader::new(file)),
        })
    }

    /// Lazily copy out every member whose name ends with `suffix`.
    ///
    /// The sequence is one-shot: a second call on the same archive fails, the
    /// container has to be reopened.
    pub fn payloads<'a>(
        &'a mut self,
        destination: &'a Path,
        suffix: &'a str,
    ) -> Result<Payloads<'a>, PipelineError> {
        let bucket = self.path.as_path();
        let entries = self
            .archive
            .entries()
            .map_err(|source| PipelineError::Bucket {
                path: bucket.to_path_buf(),
                source,
            })?;
        Ok(Payloads {
            bucket,
            entries,
            destination,
            suffix,
        })
    }
}

/// Iterator over the payloads of a bucket, see [`BucketArchive::payloads`].
pub struct Payloads<'a> {
    bucket: &'a Path,
    entries: tar::Entries<'a, BufReader<File>>,
    destination: &'a Path,
    suffix: &'a str,
}

impl Payloads<'_> {
    fn bucket_error(&self, source: io::Error) -> PipelineError {
        PipelineError::Bucket {
            path: self.bucket.to_path_buf(),
            source,
        }
    }
}

impl Iterator for Payloads<'_> {
    type Item = Result<Payload, PipelineError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut entry = match self.entries.next()? {
                Ok(entry) => entry,
                Err(e) => return Some(Err(self.bucket_error(e))),
            };
            if !entry.header().entry_type().is_file() {
                continue;
            }
            let member = match entry.path() {
                Ok(path) => path.into_owned(),
                Err(e) => return Some(Err(self.bucket_error(e))),
            };
            let Some(base_name) = member
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
            else {
                continue;
            };
            if !base_name.ends_with(self.suffix) {
                debug!(member = %member.display(), "[BUCKET] Skipping member without payload suffix");
                continue;
            }

            let target = self.destination.join(&base_name);
            let copied = File::create(&target).and_then(|mut out| io::copy(&mut entry, &mut out));
            return Some(match copied {
                Ok(bytes) => {
                    debug!(member = %member.display(), bytes, "[BUCKET] Copied payload");
                    Ok(Payload::new(base_name, target))
                }
                Err(e) => Err(PipelineError::Io(e)),
            });
        }
    }
}

/// Copy every payload of the bucket at `bucket_path` into `destination`.
pub fn split(
    bucket_path: &Path,
    destination: &Path,
    suffix: &str,
) -> Result<Vec<Payload>, PipelineError> {
    fs::create_dir_all(destination)?;
    let mut archive = BucketArchive::open(bucket_path)?;
    let payloads = archive
        .payloads(destination, suffix)?
        .collect::<Result<Vec<_>, _>>()?;
    info!(
        bucket = %bucket_path.display(),
        count = payloads.len(),
        "[BUCKET] Extracted payloads from bucket"
    );
    Ok(payloads)
}
