//! Record metadata lookup with a schemaless fallback.
//!
//! Standard records describe themselves in the metadata catalog. Custom and analytics-only
//! records often do not, so their shape is inferred from one SuiteQL row instead.

use crate::client::ErpClient;
use crate::error::{ClientError, Result};
use erp_mcp_schema_tree::{SchemaTree, SchemaTreeError, TypeSet, dummy_record_schema};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

const SAMPLE_FIELDS: usize = 10;

/// Resolved schemas by record type. Entries are never invalidated.
#[derive(Debug, Default)]
pub struct MetadataCache {
    entries: RwLock<HashMap<String, Arc<SchemaTree>>>,
}

impl MetadataCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, record_type: &str) -> Option<Arc<SchemaTree>> {
        self.entries.read().get(record_type).cloned()
    }

    /// Insert unless already present; returns the cached entry either way.
    pub fn insert(&self, record_type: impl Into<String>, tree: SchemaTree) -> Arc<SchemaTree> {
        self.entries
            .write()
            .entry(record_type.into())
            .or_insert_with(|| Arc::new(tree))
            .clone()
    }

    #[must_use]
    pub fn contains(&self, record_type: &str) -> bool {
        self.entries.read().contains_key(record_type)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Cached record types, sorted.
    #[must_use]
    pub fn record_types(&self) -> Vec<String> {
        let mut names: Vec<String> = self.entries.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[derive(Clone)]
pub struct MetadataService {
    client: ErpClient,
    cache: Arc<MetadataCache>,
}

impl MetadataService {
    #[must_use]
    pub fn new(client: ErpClient, cache: Arc<MetadataCache>) -> Self {
        Self { client, cache }
    }

    #[must_use]
    pub fn client(&self) -> &ErpClient {
        &self.client
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<MetadataCache> {
        &self.cache
    }

    /// Schema of `record_type`, from cache, the metadata catalog, or one sample row.
    ///
    /// `included_fields` only matter for the schemaless fallback, where they are added as
    /// properties next to the sampled columns.
    ///
    /// # Errors
    ///
    /// Returns the fallback's error when neither the catalog nor a sample row yields a schema.
    pub async fn metadata(
        &self,
        record_type: &str,
        included_fields: &[String],
    ) -> Result<Arc<SchemaTree>> {
        if let Some(hit) = self.cache.get(record_type) {
            tracing::debug!(record_type, "metadata cache hit");
            return Ok(hit);
        }

        match self.from_catalog(record_type).await {
            Ok(tree) => Ok(tree),
            Err(e) => {
                tracing::warn!(
                    record_type,
                    error = %e,
                    "metadata catalog unusable; inferring schema from a sample row"
                );
                self.schemaless(record_type, included_fields).await
            }
        }
    }

    /// Load each record type into the cache, logging failures. Returns how many are cached.
    pub async fn prewarm(&self, record_types: &[String]) -> usize {
        for record_type in record_types {
            match self.metadata(record_type, &[]).await {
                Ok(_) => tracing::info!(record_type = %record_type, "pre-warmed metadata"),
                Err(e) => tracing::warn!(
                    record_type = %record_type,
                    error = %e,
                    "failed to pre-warm metadata"
                ),
            }
        }
        record_types
            .iter()
            .filter(|r| self.cache.contains(r))
            .count()
    }

    async fn from_catalog(&self, record_type: &str) -> Result<Arc<SchemaTree>> {
        let document = self.client.metadata_catalog(record_type).await?;
        if !document.contains(record_type) {
            return Err(ClientError::Schema(SchemaTreeError::unresolved(
                record_type,
                "record type missing from metadata catalog",
            )));
        }

        let requested = self.cache.insert(record_type, document.resolve(record_type)?);

        let others: Vec<String> = document
            .names()
            .filter(|name| *name != record_type)
            .map(str::to_string)
            .collect();
        for name in others {
            match document.resolve(&name) {
                Ok(tree) => {
                    self.cache.insert(name, tree);
                }
                Err(e) => tracing::debug!(schema = %name, error = %e, "skipping schema"),
            }
        }
        Ok(requested)
    }

    async fn schemaless(
        &self,
        record_type: &str,
        included_fields: &[String],
    ) -> Result<Arc<SchemaTree>> {
        let row = self.client.single_row(record_type).await?;
        let mut fields: BTreeSet<String> = included_fields.iter().cloned().collect();
        if let Some(row) = row {
            fields.extend(row.into_iter().map(|(column, _)| column));
        } else {
            tracing::debug!(record_type, "no sample row; using included fields only");
        }
        Ok(self.cache.insert(record_type, dummy_record_schema(fields)))
    }
}

/// Human-oriented digest of a record schema.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchemaSummary {
    pub description: &'static str,
    pub total_fields: usize,
    /// Up to the first ten property names, sorted.
    pub sample_fields: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema_type: Option<TypeSet>,
}

impl SchemaSummary {
    #[must_use]
    pub fn of(tree: &SchemaTree) -> Self {
        let names = tree.property_names();
        let total_fields = names.len();
        let sample_fields = names
            .into_iter()
            .take(SAMPLE_FIELDS)
            .map(str::to_string)
            .collect();
        let types = &tree.root_node().types;

        Self {
            description: "NetSuite record metadata schema",
            total_fields,
            sample_fields,
            note: (total_fields > SAMPLE_FIELDS).then(|| {
                format!("Showing first {SAMPLE_FIELDS} fields out of {total_fields} total fields")
            }),
            schema_type: (!types.is_empty()).then(|| types.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticToken;
    use axum::Json;
    use axum::Router;
    use axum::extract::{Path, State};
    use axum::http::StatusCode;
    use axum::routing::{get, post};
    use erp_mcp_test_support::MockServer;
    use serde_json::{Value, json};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use url::Url;

    #[derive(Default)]
    struct Erp {
        catalog_calls: AtomicUsize,
        query_calls: AtomicUsize,
    }

    async fn catalog(
        State(erp): State<Arc<Erp>>,
        Path(record_type): Path<String>,
    ) -> (StatusCode, Json<Value>) {
        erp.catalog_calls.fetch_add(1, Ordering::SeqCst);
        match record_type.as_str() {
            "customer" => (
                StatusCode::OK,
                Json(json!({"components": {"schemas": {
                    "customer": {
                        "type": "object",
                        "properties": {
                            "id": {"type": "string"},
                            "subsidiary": {"$ref": "#/components/schemas/nsLink"}
                        }
                    },
                    "nsLink": {
                        "type": "object",
                        "properties": {"id": {"type": "string"}}
                    },
                    "broken": {"type": "object", "properties": {"x": {"type": "array"}}}
                }}})),
            ),
            "broken" => (
                StatusCode::OK,
                Json(json!({"components": {"schemas": {
                    "broken": {"properties": {"x": {"$ref": "#/components/schemas/missing"}}}
                }}})),
            ),
            _ => (
                StatusCode::NOT_FOUND,
                Json(json!({"title": "Record type not found"})),
            ),
        }
    }

    async fn suiteql(
        State(erp): State<Arc<Erp>>,
        Json(body): Json<Value>,
    ) -> (StatusCode, Json<Value>) {
        erp.query_calls.fetch_add(1, Ordering::SeqCst);
        let q = body["q"].as_str().unwrap_or_default();
        if q.ends_with("customrecord_empty") {
            return (StatusCode::OK, Json(json!({"count": 0, "items": []})));
        }
        if q.ends_with("customrecord_widget") || q.ends_with("broken") {
            return (
                StatusCode::OK,
                Json(json!({
                    "count": 1,
                    "items": [{"links": [], "id": "1", "weight": "3"}]
                })),
            );
        }
        (
            StatusCode::BAD_REQUEST,
            Json(json!({"title": "Invalid search query"})),
        )
    }

    async fn service() -> (MockServer, Arc<Erp>, MetadataService) {
        let erp = Arc::new(Erp::default());
        let app = Router::new()
            .route(
                "/services/rest/record/v1/metadata-catalog/{record_type}",
                get(catalog),
            )
            .route("/services/rest/query/v1/suiteql", post(suiteql))
            .with_state(erp.clone());
        let server = MockServer::start(app).await.unwrap();
        let client = ErpClient::with_token_provider(
            reqwest::Client::new(),
            Url::parse(&format!("{}/services/rest", server.base_url())).unwrap(),
            Arc::new(StaticToken::new("t")),
        );
        let service = MetadataService::new(client, Arc::new(MetadataCache::new()));
        (server, erp, service)
    }

    #[tokio::test]
    async fn catalog_schema_is_resolved_and_cached_with_siblings() {
        let (server, erp, service) = service().await;

        let tree = service.metadata("customer", &[]).await.unwrap();
        assert!(tree.references().is_empty());
        assert_eq!(
            tree.to_value()["properties"]["subsidiary"]["properties"]["id"],
            json!({"type": "string"})
        );

        // nsLink resolved cleanly; the walk of `broken` fails so it is not cached.
        assert_eq!(service.cache().record_types(), vec!["customer", "nsLink"]);

        let again = service.metadata("customer", &[]).await.unwrap();
        assert!(Arc::ptr_eq(&tree, &again));
        assert_eq!(erp.catalog_calls.load(Ordering::SeqCst), 1);
        assert_eq!(erp.query_calls.load(Ordering::SeqCst), 0);

        server.stop().await;
    }

    #[tokio::test]
    async fn missing_catalog_falls_back_to_sample_row() {
        let (server, erp, service) = service().await;

        let tree = service
            .metadata("customrecord_widget", &["color".to_string()])
            .await
            .unwrap();
        assert_eq!(tree.property_names(), vec!["color", "id", "weight"]);
        assert_eq!(
            tree.to_value()["properties"]["weight"],
            json!({"type": ["null", "string"]})
        );
        assert_eq!(erp.query_calls.load(Ordering::SeqCst), 1);
        assert!(service.cache().contains("customrecord_widget"));

        server.stop().await;
    }

    #[tokio::test]
    async fn unresolvable_catalog_schema_falls_back() {
        let (server, _erp, service) = service().await;

        let tree = service.metadata("broken", &[]).await.unwrap();
        assert_eq!(tree.property_names(), vec!["id", "weight"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn empty_table_uses_included_fields_only() {
        let (server, _erp, service) = service().await;

        let tree = service
            .metadata("customrecord_empty", &["memo".to_string()])
            .await
            .unwrap();
        assert_eq!(tree.property_names(), vec!["memo"]);

        server.stop().await;
    }

    #[tokio::test]
    async fn fallback_failure_is_returned() {
        let (server, _erp, service) = service().await;

        let err = service.metadata("nosuchrecord", &[]).await.unwrap_err();
        assert!(err.is_http(), "unexpected error: {err}");
        assert!(service.cache().is_empty());

        server.stop().await;
    }

    #[tokio::test]
    async fn prewarm_is_best_effort() {
        let (server, _erp, service) = service().await;

        let loaded = service
            .prewarm(&["customer".to_string(), "nosuchrecord".to_string()])
            .await;
        assert_eq!(loaded, 1);
        assert!(service.cache().contains("customer"));

        server.stop().await;
    }

    #[test]
    fn summary_samples_first_ten_sorted_fields() {
        let fields: Vec<String> = (0..12).map(|i| format!("field{i:02}")).collect();
        let summary = SchemaSummary::of(&dummy_record_schema(fields));

        assert_eq!(summary.total_fields, 12);
        assert_eq!(summary.sample_fields.len(), 10);
        assert_eq!(summary.sample_fields[0], "field00");
        assert_eq!(
            summary.note.as_deref(),
            Some("Showing first 10 fields out of 12 total fields")
        );

        let value = serde_json::to_value(&summary).unwrap();
        assert_eq!(value["schema_type"], json!("object"));
    }

    #[test]
    fn small_summary_has_no_note() {
        let summary = SchemaSummary::of(&dummy_record_schema(["id"]));
        assert_eq!(summary.sample_fields, vec!["id"]);
        assert!(summary.note.is_none());
        let value = serde_json::to_value(&summary).unwrap();
        assert!(value.get("note").is_none());
    }
}
