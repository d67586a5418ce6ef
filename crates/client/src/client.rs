//! REST calls against one NetSuite account.

use crate::auth::{ClientCredentials, TokenProvider};
use crate::config::{ClientOptions, endpoint};
use crate::error::{ClientError, Result};
use erp_mcp_schema_tree::SchemaDocument;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::sync::Arc;
use url::Url;

const SWAGGER_JSON: &str = "application/swagger+json";
/// Hypermedia field NetSuite attaches to every SuiteQL row; not a column.
const LINKS_FIELD: &str = "links";

/// One page of SuiteQL results.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPage {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub total_results: u64,
    #[serde(default)]
    pub has_more: bool,
    #[serde(default)]
    pub items: Vec<Value>,
}

impl QueryPage {
    /// Column names of the first row, sorted, without the `links` field.
    #[must_use]
    pub fn first_row_columns(&self) -> Vec<String> {
        let Some(Value::Object(row)) = self.items.first() else {
            return Vec::new();
        };
        let mut columns: Vec<String> = row
            .keys()
            .filter(|k| k.as_str() != LINKS_FIELD)
            .cloned()
            .collect();
        columns.sort();
        columns
    }
}

#[derive(Clone)]
pub struct ErpClient {
    inner: Arc<Inner>,
}

struct Inner {
    http: reqwest::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl ErpClient {
    /// Client authenticating with the OAuth 2.0 client credentials flow.
    ///
    /// # Errors
    ///
    /// Returns a config or auth error for invalid options, or a transport error if the HTTP
    /// client cannot be built.
    pub fn new(options: &ClientOptions) -> Result<Self> {
        options.validate()?;
        let http = reqwest::Client::builder()
            .timeout(options.timeout())
            .build()?;
        let tokens = Arc::new(ClientCredentials::new(http.clone(), options)?);
        Ok(Self::with_token_provider(http, options.base_url()?, tokens))
    }

    #[must_use]
    pub fn with_token_provider(
        http: reqwest::Client,
        base_url: Url,
        tokens: Arc<dyn TokenProvider>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                http,
                base_url,
                tokens,
            }),
        }
    }

    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.inner.base_url
    }

    /// Fetch the metadata catalog (OpenAPI 3 flavoured JSON schemas) of one record type.
    ///
    /// # Errors
    ///
    /// Returns an HTTP error for non-success statuses, a transport error when no response
    /// arrives, and a schema parse error for a malformed catalog.
    pub async fn metadata_catalog(&self, record_type: &str) -> Result<SchemaDocument> {
        let url = endpoint(
            &self.inner.base_url,
            &["record", "v1", "metadata-catalog", record_type],
        )?;
        let request = self
            .inner
            .http
            .get(url)
            .header(ACCEPT, HeaderValue::from_static(SWAGGER_JSON));

        let body = self.send(request).await?;
        let document = SchemaDocument::from_json_str(&body)?;
        tracing::debug!(
            record_type,
            schemas = document.len(),
            "fetched metadata catalog"
        );
        Ok(document)
    }

    /// Run a SuiteQL query. `limit` and `offset` are only sent when non-zero.
    ///
    /// # Errors
    ///
    /// Returns an HTTP error for non-success statuses, a transport error when no response
    /// arrives, and a decode error if the body is not a SuiteQL result page.
    pub async fn suiteql(&self, query: &str, limit: u64, offset: u64) -> Result<QueryPage> {
        let mut url = endpoint(&self.inner.base_url, &["query", "v1", "suiteql"])?;
        {
            let mut pairs = url.query_pairs_mut();
            if limit != 0 {
                pairs.append_pair("limit", &limit.to_string());
            }
            if offset != 0 {
                pairs.append_pair("offset", &offset.to_string());
            }
        }
        if url.query() == Some("") {
            url.set_query(None);
        }

        let request = self
            .inner
            .http
            .post(url)
            .header("Prefer", "transient")
            .json(&json!({ "q": query }));

        let body = self.send(request).await?;
        let page: QueryPage = serde_json::from_str(&body)
            .map_err(|e| ClientError::Decode(format!("invalid SuiteQL response: {e}")))?;
        tracing::debug!(
            count = page.count,
            total_results = page.total_results,
            has_more = page.has_more,
            "SuiteQL page"
        );
        Ok(page)
    }

    /// First row of `record_type`, or `None` when the table is empty.
    ///
    /// # Errors
    ///
    /// Returns a config error unless `record_type` is a plain identifier, otherwise whatever
    /// [`ErpClient::suiteql`] returns.
    pub async fn single_row(&self, record_type: &str) -> Result<Option<Map<String, Value>>> {
        if !is_identifier(record_type) {
            return Err(ClientError::Config(format!(
                "record type '{record_type}' is not a valid SuiteQL table name"
            )));
        }
        let page = self
            .suiteql(&format!("SELECT * FROM {record_type}"), 1, 0)
            .await?;
        Ok(page.items.into_iter().find_map(|row| match row {
            Value::Object(mut map) => {
                map.remove(LINKS_FIELD);
                Some(map)
            }
            _ => None,
        }))
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<String> {
        let token = self.inner.tokens.access_token().await?;
        let response = request.bearer_auth(token).send().await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            tracing::warn!(status = status.as_u16(), "NetSuite request failed");
            return Err(ClientError::Http {
                status: status.as_u16(),
                body,
            });
        }
        Ok(body)
    }
}

fn is_identifier(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}
