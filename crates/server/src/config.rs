//! Command line, environment and config file handling.

use crate::error::{Result, ServerError};
use clap::{Parser, ValueEnum};
use erp_mcp_client::ClientOptions;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Parser)]
#[command(
    name = "erp-mcp-server",
    version,
    about = "MCP stdio server for NetSuite record metadata and SuiteQL"
)]
pub struct Cli {
    /// JSON file with connection settings (camelCase keys). Flags and env vars override it.
    #[arg(long, env = "NETSUITE_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "NETSUITE_ACCOUNT_ID")]
    pub account_id: Option<String>,

    #[arg(long, env = "NETSUITE_CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "NETSUITE_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: Option<String>,

    #[arg(long, env = "NETSUITE_CERTIFICATE_ID")]
    pub certificate_id: Option<String>,

    /// PEM file with the RSA private key of the integration certificate.
    #[arg(long, env = "NETSUITE_PRIVATE_KEY_PATH")]
    pub private_key_path: Option<PathBuf>,

    /// Record types to load into the metadata cache at startup (comma separated).
    #[arg(long, env = "NETSUITE_RECORD_TYPES", value_delimiter = ',')]
    pub record_types: Vec<String>,

    /// Overrides the account-derived REST base URL.
    #[arg(long, env = "NETSUITE_BASE_URL")]
    pub base_url: Option<String>,

    #[arg(long, env = "NETSUITE_TIMEOUT_SECS")]
    pub timeout_secs: Option<u64>,

    /// Log filter directives (`info`, `erp_mcp_client=debug`, ...). Logs go to stderr.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    pub log_level: String,

    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

/// Contents of the `--config` file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileConfig {
    #[serde(default)]
    pub account_id: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub certificate_id: Option<String>,
    #[serde(default)]
    pub private_key_path: Option<PathBuf>,
    /// Inline key, used when no key path is configured anywhere.
    #[serde(default)]
    pub private_key_pem: Option<String>,
    #[serde(default)]
    pub record_types: Vec<String>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Everything the server needs after merging flags, env and the config file.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub options: ClientOptions,
    pub record_types: Vec<String>,
}

/// # Errors
///
/// Returns a config error if the file cannot be read or is not valid JSON.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    let bytes = std::fs::read(path)
        .map_err(|e| ServerError::Config(format!("read config {}: {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ServerError::Config(format!("parse {}: {e}", path.display())))
}

impl Cli {
    /// Merge flags and env vars over the optional config file.
    ///
    /// # Errors
    ///
    /// Returns a config error for a missing required setting, an unreadable key or config
    /// file, or options the client rejects.
    pub fn resolve(&self) -> Result<ServerConfig> {
        let file = match &self.config {
            Some(path) => load_config(path)?,
            None => FileConfig::default(),
        };

        let key_path = self
            .private_key_path
            .as_deref()
            .or(file.private_key_path.as_deref());
        let private_key_pem = match key_path {
            Some(path) => std::fs::read_to_string(path).map_err(|e| {
                ServerError::Config(format!("read private key {}: {e}", path.display()))
            })?,
            None => file.private_key_pem.clone().ok_or_else(|| {
                ServerError::Config(
                    "a private key is required (NETSUITE_PRIVATE_KEY_PATH)".to_string(),
                )
            })?,
        };

        let mut options = ClientOptions::new(
            required(
                "NETSUITE_ACCOUNT_ID",
                self.account_id.as_deref(),
                file.account_id.as_deref(),
            )?,
            required(
                "NETSUITE_CLIENT_ID",
                self.client_id.as_deref(),
                file.client_id.as_deref(),
            )?,
            required(
                "NETSUITE_CERTIFICATE_ID",
                self.certificate_id.as_deref(),
                file.certificate_id.as_deref(),
            )?,
            private_key_pem,
        );
        options.client_secret = non_empty(self.client_secret.as_deref())
            .or_else(|| non_empty(file.client_secret.as_deref()));
        options.base_url =
            non_empty(self.base_url.as_deref()).or_else(|| non_empty(file.base_url.as_deref()));
        if let Some(secs) = self.timeout_secs.or(file.timeout_secs) {
            options.timeout_secs = secs;
        }
        options.validate().map_err(|e| ServerError::Config(e.to_string()))?;

        let record_types = if self.record_types.is_empty() {
            &file.record_types
        } else {
            &self.record_types
        };

        Ok(ServerConfig {
            options,
            record_types: parse_record_types(record_types),
        })
    }
}

/// Trim entries and drop empties and duplicates, keeping first-seen order.
#[must_use]
pub fn parse_record_types<S: AsRef<str>>(raw: &[S]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for entry in raw.iter().flat_map(|s| s.as_ref().split(',')) {
        let entry = entry.trim();
        if !entry.is_empty() && !out.iter().any(|seen| seen == entry) {
            out.push(entry.to_string());
        }
    }
    out
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn required(env: &str, flag: Option<&str>, file: Option<&str>) -> Result<String> {
    non_empty(flag)
        .or_else(|| non_empty(file))
        .ok_or_else(|| ServerError::Config(format!("{env} is required")))
}
