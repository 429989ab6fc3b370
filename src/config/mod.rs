//! Configuration module for Kappa Upload
//!
//! Handles loading and parsing of YAML configuration files with support for
//! environment variable expansion and comprehensive validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

mod loader;

pub use loader::ConfigLoader;

// ============================================================================
// Environment Variable Expansion
// ============================================================================

/// Expand environment variables in a string.
///
/// Supports two syntaxes:
/// - `${VAR_NAME}` - Simple expansion, keeps placeholder if var not found
/// - `${VAR_NAME:-default}` - Expansion with default value
///
/// Variable names must start with a letter or underscore and contain only
/// uppercase letters, digits, and underscores.
fn expand_env_vars(s: &str) -> String {
    let re = regex_lite::Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
    let mut last_match = 0;
    let mut result = String::with_capacity(s.len());

    for cap in re.captures_iter(s) {
        let full_match = cap.get(0).unwrap();
        let var_name = cap.get(1).unwrap().as_str();

        result.push_str(&s[last_match..full_match.start()]);

        let value = match std::env::var(var_name) {
            Ok(val) => val,
            Err(_) => {
                if let Some(default) = cap.get(2) {
                    default.as_str().to_string()
                } else {
                    // No env var and no default. Keep the original placeholder.
                    full_match.as_str().to_string()
                }
            }
        };
        result.push_str(&value);

        last_match = full_match.end();
    }

    result.push_str(&s[last_match..]);

    result
}

/// Custom deserializer for strings with environment variable expansion.
fn deserialize_with_env<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::de::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Ok(expand_env_vars(&s))
}

// ============================================================================
// Validation Helpers
// ============================================================================

/// Validate that a URL starts with http:// or https://
fn is_valid_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Origin of the control plane that hands out pre-signed URLs and
    /// accepts file records, e.g. `https://api.example.org`.
    #[serde(deserialize_with = "deserialize_with_env")]
    pub api_origin: String,

    /// Origin of the proxying edge worker. Required when `transport` is
    /// `proxied`, unused otherwise.
    #[serde(default)]
    pub uploader_origin: Option<String>,

    /// Which path the object bytes take to the store.
    #[serde(default)]
    pub transport: TransportMode,

    #[serde(default)]
    pub upload: UploadTuning,

    #[serde(default)]
    pub retry: RetryTuning,
}

impl Config {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        ConfigLoader::load(path)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_http_url(&self.api_origin) {
            return Err(ConfigError::ValidationError(
                "Invalid api_origin: must start with http:// or https://".into(),
            ));
        }

        if self.transport == TransportMode::Proxied {
            match self.uploader_origin.as_deref() {
                Some(origin) if is_valid_http_url(origin) => {}
                Some(_) => {
                    return Err(ConfigError::ValidationError(
                        "Invalid uploader_origin: must start with http:// or https://".into(),
                    ))
                }
                None => {
                    return Err(ConfigError::ValidationError(
                        "uploader_origin is required when transport is 'proxied'".into(),
                    ))
                }
            }
        }

        if self.upload.part_size < crate::upload::multipart::MIN_PART_SIZE {
            return Err(ConfigError::ValidationError(format!(
                "part_size {} is below the 5MiB minimum the object store accepts",
                self.upload.part_size
            )));
        }

        if self.upload.concurrent_parts == 0 {
            return Err(ConfigError::ValidationError(
                "concurrent_parts must be at least 1".into(),
            ));
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ValidationError(
                "retry.max_attempts must be at least 1".into(),
            ));
        }

        Ok(())
    }
}

/// Transport selection
///
/// Whether uploads go straight to the pre-signed URL or via the edge worker
/// is decided per deployment; nothing inside the upload flow branches on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportMode {
    #[default]
    Direct,
    Proxied,
}

impl TransportMode {
    /// Label used for metrics and log fields
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportMode::Direct => "direct",
            TransportMode::Proxied => "proxied",
        }
    }
}

/// Upload tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadTuning {
    /// Objects at or above this size go through the multipart flow.
    #[serde(default = "default_multipart_threshold")]
    pub multipart_threshold: usize,
    /// Size of each multipart part except possibly the last.
    #[serde(default = "default_part_size")]
    pub part_size: usize,
    /// How many part PUTs may be in flight at once.
    #[serde(default = "default_concurrent_parts")]
    pub concurrent_parts: usize,
}

impl Default for UploadTuning {
    fn default() -> Self {
        Self {
            multipart_threshold: default_multipart_threshold(),
            part_size: default_part_size(),
            concurrent_parts: default_concurrent_parts(),
        }
    }
}

fn default_multipart_threshold() -> usize {
    52428800 // 50MB
}

fn default_part_size() -> usize {
    20971520 // 20MB
}

fn default_concurrent_parts() -> usize {
    4
}

/// Retry tuning
///
/// The delay ladder is indexed by attempt number; attempts past the end of
/// the ladder reuse the last entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryTuning {
    /// Total attempts per request, including the first one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// Waits between attempts, in milliseconds.
    #[serde(default = "default_retry_delays_ms")]
    pub delays_ms: Vec<u64>,
}

impl Default for RetryTuning {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delays_ms: default_retry_delays_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    4
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![2000, 5000, 10000]
}
