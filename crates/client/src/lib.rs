//! NetSuite REST client used by the MCP server.
//!
//! - [`auth`]: OAuth 2.0 client credentials with a PS256 client assertion
//! - [`client`]: metadata catalog and SuiteQL calls
//! - [`metadata`]: cached record schemas with a schemaless fallback

pub mod auth;
pub mod client;
pub mod config;
pub mod error;
pub mod metadata;

pub use auth::{ClientCredentials, StaticToken, TokenProvider};
pub use client::{ErpClient, QueryPage};
pub use config::ClientOptions;
pub use error::{ClientError, Result};
pub use metadata::{MetadataCache, MetadataService, SchemaSummary};
