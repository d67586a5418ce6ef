//! The MCP tools: record metadata lookup and SuiteQL execution.

use crate::error::{Result, ServerError};
use erp_mcp_client::{MetadataService, QueryPage, SchemaSummary};
use rmcp::model::{CallToolResult, Content, JsonObject, Tool};
use serde_json::{Map, Value, json};
use std::sync::Arc;

pub const GET_METADATA: &str = "netsuite_get_metadata";
pub const RUN_SUITEQL: &str = "netsuite_run_suiteql";

const DEFAULT_LIMIT: u64 = 100;
const MAX_LIMIT: u64 = 1000;
const SAMPLE_FIELDS: usize = 10;

#[derive(Clone)]
pub struct ErpTools {
    metadata: MetadataService,
}

impl ErpTools {
    #[must_use]
    pub fn new(metadata: MetadataService) -> Self {
        Self { metadata }
    }

    #[must_use]
    pub fn list_tools(&self) -> Vec<Tool> {
        vec![
            tool(
                GET_METADATA,
                "Get the JSON schema of a NetSuite record type. Uses the REST metadata catalog \
                 and, for records without one, infers string/null columns from a sample row.",
                json!({
                    "type": "object",
                    "properties": {
                        "record_type": {
                            "type": "string",
                            "description": "Record type, e.g. customer, salesorder, customrecord_x"
                        },
                        "included_fields": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Extra fields to include when the schema is inferred"
                        }
                    },
                    "required": ["record_type"]
                }),
            ),
            tool(
                RUN_SUITEQL,
                "Run a read-only SuiteQL query and return one page of rows.",
                json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "SuiteQL statement"},
                        "limit": {
                            "type": "integer",
                            "description": "Rows per page (default 100, max 1000)",
                            "default": DEFAULT_LIMIT,
                            "maximum": MAX_LIMIT
                        },
                        "offset": {
                            "type": "integer",
                            "description": "Rows to skip (default 0)",
                            "default": 0
                        }
                    },
                    "required": ["query"]
                }),
            ),
        ]
    }

    /// Execute one tool.
    ///
    /// Failures of the tool itself (bad arguments, NetSuite errors) come back as results with
    /// `is_error` set.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::UnknownTool`] for a name not in [`ErpTools::list_tools`].
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<CallToolResult> {
        let outcome = match name {
            GET_METADATA => self.get_metadata(arguments).await,
            RUN_SUITEQL => self.run_suiteql(arguments).await,
            other => return Err(ServerError::UnknownTool(other.to_string())),
        };

        Ok(match outcome {
            Ok(body) => {
                let text =
                    serde_json::to_string_pretty(&body).unwrap_or_else(|_| body.to_string());
                CallToolResult::success(vec![Content::text(text)])
            }
            Err(message) => {
                tracing::warn!(tool = name, error = %message, "tool call failed");
                CallToolResult::error(vec![Content::text(message)])
            }
        })
    }

    async fn get_metadata(&self, args: &Map<String, Value>) -> std::result::Result<Value, String> {
        let record_type = required_str(args, "record_type")
            .map_err(|e| format!("Invalid record_type parameter: {e}"))?;
        let included_fields = string_list(args, "included_fields");

        let schema = self
            .metadata
            .metadata(record_type, &included_fields)
            .await
            .map_err(|e| {
                format!("Failed to get metadata for record type '{record_type}': {e}")
            })?;

        Ok(json!({
            "record_type": record_type,
            "included_fields": included_fields,
            "metadata_schema": schema.as_ref(),
            "metadata_summary": SchemaSummary::of(&schema),
        }))
    }

    async fn run_suiteql(&self, args: &Map<String, Value>) -> std::result::Result<Value, String> {
        let query =
            required_str(args, "query").map_err(|e| format!("Invalid query parameter: {e}"))?;
        let limit = non_negative(args, "limit")
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        let offset = non_negative(args, "offset").unwrap_or(0);

        let page = self
            .metadata
            .client()
            .suiteql(query, limit, offset)
            .await
            .map_err(|e| format!("Failed to execute SuiteQL query: {e}"))?;

        let summary = query_summary(&page);
        Ok(json!({
            "query": query,
            "limit": limit,
            "offset": offset,
            "count": page.count,
            "totalResults": page.total_results,
            "hasMore": page.has_more,
            "items": page.items,
            "summary": summary,
        }))
    }
}

fn tool(name: &'static str, description: &'static str, schema: Value) -> Tool {
    let schema = match schema {
        Value::Object(obj) => obj,
        _ => JsonObject::new(),
    };
    Tool::new(name, description, Arc::new(schema))
}

fn required_str<'a>(
    args: &'a Map<String, Value>,
    key: &str,
) -> std::result::Result<&'a str, String> {
    match args.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.as_str()),
        Some(Value::String(_)) => Err(format!("\"{key}\" must not be empty")),
        Some(other) => Err(format!("\"{key}\" must be a string, got {other}")),
        None => Err(format!("required argument \"{key}\" not found")),
    }
}

/// String entries of an array argument; anything else is ignored.
fn string_list(args: &Map<String, Value>, key: &str) -> Vec<String> {
    args.get(key)
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A numeric argument truncated to an integer and clamped at zero; non-numbers are ignored.
fn non_negative(args: &Map<String, Value>, key: &str) -> Option<u64> {
    let n = args.get(key)?.as_f64()?;
    if n.is_nan() || n <= 0.0 {
        return Some(0);
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let n = n.trunc() as u64;
    Some(n)
}

fn query_summary(page: &QueryPage) -> Value {
    let mut summary = json!({
        "description": "NetSuite SuiteQL query results",
        "count": page.count,
        "offset": page.offset,
        "total": page.total_results,
        "hasMore": page.has_more,
    });

    if !page.items.is_empty() {
        let columns = page.first_row_columns();
        let total = columns.len();
        summary["total_fields"] = json!(total);
        let sample: Vec<String> = columns.into_iter().take(SAMPLE_FIELDS).collect();
        summary["sample_fields"] = json!(sample);
        if total > SAMPLE_FIELDS {
            summary["note"] = json!(format!(
                "Showing first {SAMPLE_FIELDS} fields out of {total} total fields"
            ));
        }
    }
    summary
}
