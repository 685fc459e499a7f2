use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info};

use crate::bucket::DEFAULT_PAYLOAD_SUFFIX;
use crate::tokenizer::{Tokenizer, DEFAULT_INLINE_LITERAL_COMMANDS, DEFAULT_LITERAL_ENVIRONMENTS};
use crate::unpack::{UnpackOptions, DEFAULT_FALLBACK_NAME, DEFAULT_SOURCE_EXTENSION};

/// Processing configuration for one bucket run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessConfig {
    /// Where payloads copied out of the bucket are stored.
    pub archive_dir: PathBuf,
    /// Root under which every payload gets its own extraction directory.
    pub extract_dir: PathBuf,
    /// Where merged documents, prose and `report.json` are written.
    pub output_dir: PathBuf,
    pub payload_suffix: String,
    pub source_extension: String,
    pub fallback_name: String,
    pub salt_fallback_name: bool,
    pub literal_environments: Vec<String>,
    pub inline_literal_commands: Vec<String>,
    /// Documents processed at the same time; 1 is sequential.
    pub concurrency: usize,
    /// When false, non-source files are deleted right after extraction.
    pub keep_non_source_files: bool,
    pub remove_payloads: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            archive_dir: PathBuf::from("work/archives"),
            extract_dir: PathBuf::from("work/extracted"),
            output_dir: PathBuf::from("work/merged"),
            payload_suffix: DEFAULT_PAYLOAD_SUFFIX.to_string(),
            source_extension: DEFAULT_SOURCE_EXTENSION.to_string(),
            fallback_name: DEFAULT_FALLBACK_NAME.to_string(),
            salt_fallback_name: false,
            literal_environments: DEFAULT_LITERAL_ENVIRONMENTS.iter().map(|s| s.to_string()).collect(),
            inline_literal_commands: DEFAULT_INLINE_LITERAL_COMMANDS.iter().map(|s| s.to_string()).collect(),
            concurrency: 1,
            keep_non_source_files: true,
            remove_payloads: true,
        }
    }
}

impl ProcessConfig {
    pub fn trace_loaded(&self) {
        info!(
            archive_dir = %self.archive_dir.display(),
            extract_dir = %self.extract_dir.display(),
            output_dir = %self.output_dir.display(),
            concurrency = self.concurrency,
            "Loaded ProcessConfig"
        );
        debug!(?self, "ProcessConfig loaded (full debug)");
    }

    pub fn tokenizer(&self) -> Tokenizer {
        Tokenizer::new(
            self.literal_environments.iter().cloned(),
            self.inline_literal_commands.iter().cloned(),
        )
    }

    pub fn unpack_options(&self) -> UnpackOptions {
        UnpackOptions {
            source_extension: self.source_extension.clone(),
            fallback_name: self.fallback_name.clone(),
            salt_fallback_name: self.salt_fallback_name,
            remove_payload: self.remove_payloads,
        }
    }
}

/// External converter turning merged source into prose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

impl ConvertConfig {
    pub fn deadline(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
