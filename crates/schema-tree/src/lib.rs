//! JSON-Schema tree processing for the ERP MCP bridge.
//!
//! This crate is used by:
//! - `erp-mcp-client` (metadata catalog parsing, `$ref` resolution, schemaless fallback)
//! - `erp-mcp-server` (serializing resolved schemas back to callers)
//!
//! Nodes live in a [`SchemaArena`] and are addressed by [`NodeId`]. Resolution never overwrites
//! a node that other parents may share: it allocates a new resolved node and rewires the slot of
//! the parent being walked. Nodes below a resolved referent are copied before any of their slots
//! change.

pub mod document;
pub mod dummy;
pub mod error;
pub mod model;
pub mod resolve;
pub mod types;
pub mod walk;

pub use document::{SchemaDocument, SchemaView, parse_schema};
pub use dummy::{dummy_record_schema, prepare_dummy_schema};
pub use error::{Result, SchemaTreeError};
pub use model::{NodeId, PathSegment, SchemaArena, SchemaNode, SchemaPath, SchemaTree};
pub use resolve::{LocalResolver, ReferenceResolver, ReferenceResolvingVisitor, resolve_references};
pub use types::{TypeSet, base_type};
pub use walk::{SchemaVisitor, Visit, walk};
