//! MCP server exposing NetSuite record metadata and SuiteQL over stdio.

pub mod config;
pub mod error;
pub mod stdio;
pub mod tools;

use crate::config::ServerConfig;
use crate::error::Result;
use crate::stdio::McpServer;
use crate::tools::ErpTools;
use erp_mcp_client::{ErpClient, MetadataCache, MetadataService};
use std::sync::Arc;

pub use config::{Cli, LogFormat};
pub use error::ServerError;

/// Metadata service over a fresh cache; the cache lives as long as the service.
///
/// # Errors
///
/// Returns an error if the client cannot be constructed from the configured options.
pub fn metadata_service(config: &ServerConfig) -> Result<MetadataService> {
    let client = ErpClient::new(&config.options)?;
    Ok(MetadataService::new(client, Arc::new(MetadataCache::new())))
}

/// Pre-warm the configured record types, then serve stdin/stdout until stdin closes.
///
/// # Errors
///
/// Returns an error if the client cannot be built or stdio fails.
pub async fn run(config: ServerConfig) -> Result<()> {
    let metadata = metadata_service(&config)?;

    if !config.record_types.is_empty() {
        let loaded = metadata.prewarm(&config.record_types).await;
        tracing::info!(
            requested = config.record_types.len(),
            loaded,
            "metadata cache pre-warmed"
        );
    }

    let server = McpServer::new(ErpTools::new(metadata));
    tracing::info!(base_url = %config.options.base_url()?, "serving MCP over stdio");
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    stdio::serve(&server, stdin, tokio::io::stdout()).await
}
