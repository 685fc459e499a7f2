//! Content-based classification of payloads.
//!
//! File names in a bucket are unreliable: a `.gz` member may hold a tarball or a
//! single gzipped source file. Classification only looks at the gzip magic and at
//! the first decompressed block.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use flate2::read::GzDecoder;
use serde::Serialize;
use tracing::debug;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];
const GZIP_DEFLATE: u8 = 0x08;
const TAR_BLOCK: usize = 512;
const USTAR_MAGIC: &[u8] = b"ustar";
const USTAR_OFFSET: usize = 257;
const CHECKSUM_FIELD: std::ops::Range<usize> = 148..156;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PayloadFormat {
    /// Gzip stream holding one plain file.
    CompressedSingleFile,
    /// Gzip stream holding a tar container.
    CompressedContainer,
    Unknown,
}

/// Classify an in-memory payload.
pub fn classify(bytes: &[u8]) -> PayloadFormat {
    classify_reader(bytes)
}

/// Classify a payload on disk. Unreadable files are `Unknown`.
pub fn classify_path(path: &Path) -> PayloadFormat {
    match File::open(path) {
        Ok(file) => classify_reader(BufReader::new(file)),
        Err(e) => {
            debug!(path = %path.display(), error = ?e, "Cannot open payload for sniffing");
            PayloadFormat::Unknown
        }
    }
}

fn classify_reader<R: Read>(mut reader: R) -> PayloadFormat {
    let mut header = [0u8; 3];
    if reader.read_exact(&mut header).is_err() {
        return PayloadFormat::Unknown;
    }
    if header[..2] != GZIP_MAGIC || header[2] != GZIP_DEFLATE {
        return PayloadFormat::Unknown;
    }

    let decoder = GzDecoder::new((&header[..]).chain(reader));
    let mut block = Vec::with_capacity(TAR_BLOCK);
    if let Err(e) = decoder.take(TAR_BLOCK as u64).read_to_end(&mut block) {
        debug!(error = ?e, "Gzip magic present but stream does not inflate");
        return PayloadFormat::Unknown;
    }

    if looks_like_tar_header(&block) {
        PayloadFormat::CompressedContainer
    } else {
        PayloadFormat::CompressedSingleFile
    }
}

/// A tar header block carries either the POSIX `ustar` magic or, for pre-POSIX
/// archives, a checksum that matches the block.
pub fn looks_like_tar_header(block: &[u8]) -> bool {
    if block.len() < TAR_BLOCK {
        return false;
    }
    if block[USTAR_OFFSET..USTAR_OFFSET + USTAR_MAGIC.len()] == *USTAR_MAGIC {
        return true;
    }
    header_checksum_matches(&block[..TAR_BLOCK])
}

fn header_checksum_matches(block: &[u8]) -> bool {
    let field: String = block[CHECKSUM_FIELD]
        .iter()
        .take_while(|b| **b != 0)
        .map(|b| *b as char)
        .collect();
    let Ok(expected) = u32::from_str_radix(field.trim(), 8) else {
        return false;
    };
    // The checksum is computed with its own field read as spaces.
    let actual: u32 = block
        .iter()
        .enumerate()
        .map(|(i, b)| {
            if CHECKSUM_FIELD.contains(&i) {
                u32::from(b' ')
            } else {
                u32::from(*b)
            }
        })
        .sum();
    expected == actual
}
