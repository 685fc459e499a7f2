/// `load_config` module: Loads a static YAML config and applies environment overrides.
///
/// This module is the only place where user-supplied YAML is parsed and mapped to the
/// strongly-typed configs of `tex-bucket-core`.
///
/// # Responsibilities
/// - Parse the YAML file into [`CliConfig`] (`download`, `process`, `convert` sections)
/// - Apply `TEX_BUCKET_CONCURRENCY` and `TEX_BUCKET_CONVERSION_TIMEOUT_SECS` overrides
/// - Ensure clear diagnostics: any failure in loading must say what went wrong and where.
///
/// # Errors
/// All errors in this module use `anyhow::Error` and are surfaced at the CLI boundary.
use anyhow::Result;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use tex_bucket_core::config::{ConvertConfig, ProcessConfig};
use tex_bucket_core::download::DownloadConfig;
use tracing::{error, info, warn};

pub const CONCURRENCY_ENV: &str = "TEX_BUCKET_CONCURRENCY";
pub const CONVERSION_TIMEOUT_ENV: &str = "TEX_BUCKET_CONVERSION_TIMEOUT_SECS";

#[derive(Debug, Deserialize)]
pub struct CliConfig {
    #[serde(default)]
    pub download: Option<DownloadConfig>,
    #[serde(default)]
    pub process: ProcessConfig,
    #[serde(default)]
    pub convert: Option<ConvertConfig>,
}

/// Loads a static YAML config file, then applies environment overrides.
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<CliConfig> {
    let path_ref = path.as_ref();
    info!(config_path = ?path_ref, "Loading configuration from file");

    let config_content = match fs::read_to_string(path_ref) {
        Ok(content) => {
            info!(config_path = ?path_ref, "Config file read successfully");
            content
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to read config file");
            return Err(anyhow::anyhow!(
                "Failed to read config file {:?}: {}",
                path_ref,
                e
            ));
        }
    };

    let mut config: CliConfig = match serde_yaml::from_str(&config_content) {
        Ok(conf) => {
            info!(config_path = ?path_ref, "Parsed config YAML successfully");
            conf
        }
        Err(e) => {
            error!(error = ?e, config_path = ?path_ref, "Failed to parse config YAML");
            return Err(anyhow::anyhow!("Failed to parse config YAML: {e}"));
        }
    };

    if let Some(concurrency) = env_override::<usize>(CONCURRENCY_ENV)? {
        config.process.concurrency = concurrency;
    }
    if let Some(timeout_secs) = env_override::<u64>(CONVERSION_TIMEOUT_ENV)? {
        match config.convert.as_mut() {
            Some(convert) => convert.timeout_secs = timeout_secs,
            None => warn!(
                var = CONVERSION_TIMEOUT_ENV,
                "Conversion timeout override set but no convert section configured"
            ),
        }
    }

    if config.process.concurrency == 0 {
        return Err(anyhow::anyhow!("process.concurrency must be at least 1"));
    }
    config.process.trace_loaded();
    Ok(config)
}

fn env_override<T>(var: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(var) {
        Ok(raw) => match raw.trim().parse::<T>() {
            Ok(value) => {
                info!(var, value = %raw.trim(), "Applying environment override");
                Ok(Some(value))
            }
            Err(e) => {
                error!(var, value = %raw, error = %e, "Invalid environment override");
                Err(anyhow::anyhow!("Invalid value for {var}: {e}"))
            }
        },
        Err(_) => Ok(None),
    }
}
