use std::fs;
use std::io::Write;
use std::path::PathBuf;

use reqwest::Client;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, warn};

use crate::contract::{
    DownloadError, DownloadedFile, DownloadedManifest, Downloader, FailedDownload,
};

/// Download configuration - which source bundles or buckets to fetch and where.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DownloadConfig {
    pub output_dir: PathBuf,
    pub sources: Vec<DownloadSource>,
}

/// One URL to fetch, optionally with the local file name to store it under.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct DownloadSource {
    pub url: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Local file name for a source.
///
/// An explicit name wins. Otherwise a `/src/<id>` URL yields the identifier
/// (old-style identifiers such as `hep-th/9901001` have `/` replaced by `_`) with
/// `.gz` appended; any other URL yields its last path segment.
pub fn local_file_name(source: &DownloadSource) -> String {
    if let Some(name) = source.name.as_deref().filter(|n| !n.trim().is_empty()) {
        return name.trim().replace('/', "_");
    }
    let path = source
        .url
        .split(['?', '#'])
        .next()
        .unwrap_or_default()
        .trim_end_matches('/');
    let path = path.split_once("://").map_or(path, |(_, rest)| rest);
    if let Some((_, id)) = path.split_once("/src/") {
        let id = id.replace('/', "_");
        return if id.ends_with(".gz") { id } else { format!("{id}.gz") };
    }
    path.rsplit('/')
        .next()
        .filter(|s| !s.is_empty())
        .unwrap_or("download")
        .to_string()
}

/// Fetches every configured URL with a plain GET. No authentication or retries;
/// a failed source is recorded in the manifest and the rest carry on.
pub struct HttpDownloader {
    config: DownloadConfig,
    client: Client,
}

impl HttpDownloader {
    pub fn new(config: DownloadConfig) -> Self {
        Self {
            config,
            client: Client::new(),
        }
    }

    async fn fetch(&self, source: &DownloadSource) -> Result<DownloadedFile, DownloadError> {
        let url = &source.url;
        info!(url = %url, "Fetching source");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("server returned {status}").into());
        }
        let bytes = response.bytes().await?;

        // Write next to the destination and rename, so a partial body never
        // shows up under the final name.
        let local_path = self.config.output_dir.join(local_file_name(source));
        let mut tmp = NamedTempFile::new_in(&self.config.output_dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(&local_path).map_err(|e| e.error)?;
        debug!(url = %url, path = %local_path.display(), bytes = bytes.len(), "Stored source");

        Ok(DownloadedFile {
            url: url.clone(),
            local_path,
            bytes: bytes.len() as u64,
        })
    }
}

#[async_trait::async_trait]
impl Downloader for HttpDownloader {
    async fn download_all(&self) -> Result<DownloadedManifest, DownloadError> {
        if let Err(e) = fs::create_dir_all(&self.config.output_dir) {
            error!(
                error = ?e,
                path = %self.config.output_dir.display(),
                "Failed to create output directory"
            );
            return Err(e.into());
        }

        let mut manifest = DownloadedManifest::default();
        for source in &self.config.sources {
            match self.fetch(source).await {
                Ok(file) => manifest.files.push(file),
                Err(e) => {
                    warn!(url = %source.url, error = %e, "Download failed, skipping source");
                    manifest.failures.push(FailedDownload {
                        url: source.url.clone(),
                        reason: e.to_string(),
                    });
                }
            }
        }
        info!(
            downloaded = manifest.files.len(),
            failed = manifest.failures.len(),
            "All sources processed"
        );
        Ok(manifest)
    }
}
