//! Access tokens for the REST API.
//!
//! NetSuite's machine-to-machine flow is OAuth 2.0 client credentials where the client proves
//! itself with a JWT signed by the certificate's private key (PS256).

use crate::config::ClientOptions;
use crate::error::{ClientError, Result, sanitize_reqwest_error};
use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use url::Url;

const CLIENT_ASSERTION_TYPE: &str = "urn:ietf:params:oauth:client-assertion-type:jwt-bearer";
const SCOPE: &str = "rest_webservices";
const ASSERTION_LIFETIME_SECS: u64 = 3600;
/// Refresh this long before the server-reported expiry.
const EXPIRY_SKEW: Duration = Duration::from_secs(60);

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// A bearer token valid for at least the next request.
    ///
    /// # Errors
    ///
    /// Returns an auth error if no token can be produced.
    async fn access_token(&self) -> Result<String>;
}

/// A fixed, externally managed bearer token.
#[derive(Clone)]
pub struct StaticToken(String);

impl StaticToken {
    #[must_use]
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Debug, Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: [&'a str; 1],
    aud: &'a str,
    iat: u64,
    exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    refresh_at: Instant,
}

/// OAuth 2.0 client credentials grant with a signed JWT client assertion.
pub struct ClientCredentials {
    http: reqwest::Client,
    token_url: Url,
    client_id: String,
    client_secret: Option<String>,
    certificate_id: String,
    key: EncodingKey,
    cache: RwLock<Option<CachedToken>>,
}

impl ClientCredentials {
    /// # Errors
    ///
    /// Returns a config error for invalid options and an auth error if the private key is not
    /// an RSA PEM key.
    pub fn new(http: reqwest::Client, options: &ClientOptions) -> Result<Self> {
        options.validate()?;
        let key = EncodingKey::from_rsa_pem(options.private_key_pem.as_bytes())
            .map_err(|e| ClientError::Auth(format!("invalid RSA private key: {e}")))?;
        Ok(Self {
            http,
            token_url: options.token_url()?,
            client_id: options.client_id.clone(),
            client_secret: options
                .client_secret
                .clone()
                .filter(|s| !s.trim().is_empty()),
            certificate_id: options.certificate_id.clone(),
            key,
            cache: RwLock::new(None),
        })
    }

    #[must_use]
    pub fn token_url(&self) -> &Url {
        &self.token_url
    }

    /// Sign a fresh client assertion.
    ///
    /// # Errors
    ///
    /// Returns an auth error if signing fails.
    pub fn client_assertion(&self) -> Result<String> {
        let iat = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        let claims = AssertionClaims {
            iss: &self.client_id,
            scope: [SCOPE],
            aud: self.token_url.as_str(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };
        let mut header = Header::new(Algorithm::PS256);
        header.kid = Some(self.certificate_id.clone());

        jsonwebtoken::encode(&header, &claims, &self.key)
            .map_err(|e| ClientError::Auth(format!("sign client assertion: {e}")))
    }

    async fn fetch_token(&self) -> Result<CachedToken> {
        let assertion = self.client_assertion()?;
        let form = [
            ("grant_type", "client_credentials"),
            ("client_assertion_type", CLIENT_ASSERTION_TYPE),
            ("client_assertion", assertion.as_str()),
        ];

        let mut request = self.http.post(self.token_url.clone()).form(&form);
        if let Some(secret) = &self.client_secret {
            request = request.basic_auth(&self.client_id, Some(secret));
        }

        let response = request.send().await.map_err(|e| {
            ClientError::Auth(format!("token request: {}", sanitize_reqwest_error(&e)))
        })?;
        let status = response.status();
        let body = response.text().await.map_err(|e| {
            ClientError::Auth(format!("token response: {}", sanitize_reqwest_error(&e)))
        })?;
        if !status.is_success() {
            return Err(ClientError::Auth(format!(
                "token endpoint returned {}: {body}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| ClientError::Auth(format!("invalid token response: {e}")))?;
        if parsed.access_token.is_empty() {
            return Err(ClientError::Auth(
                "token endpoint returned an empty access_token".to_string(),
            ));
        }

        let lifetime = Duration::from_secs(parsed.expires_in.unwrap_or(ASSERTION_LIFETIME_SECS));
        tracing::debug!(expires_in = lifetime.as_secs(), "obtained access token");
        Ok(CachedToken {
            token: parsed.access_token,
            refresh_at: Instant::now() + lifetime.saturating_sub(EXPIRY_SKEW),
        })
    }
}

#[async_trait]
impl TokenProvider for ClientCredentials {
    async fn access_token(&self) -> Result<String> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && Instant::now() < cached.refresh_at
            {
                return Ok(cached.token.clone());
            }
        }

        let mut cache = self.cache.write().await;
        // Another caller may have refreshed while we waited for the write lock.
        if let Some(cached) = cache.as_ref()
            && Instant::now() < cached.refresh_at
        {
            return Ok(cached.token.clone());
        }

        let fresh = self.fetch_token().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Form, Json, Router};
    use erp_mcp_test_support::{MockServer, TEST_RSA_PRIVATE_KEY, TEST_RSA_PUBLIC_KEY};
    use jsonwebtoken::{DecodingKey, Validation};
    use serde_json::{Value, json};
    use std::collections::HashMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TokenEndpoint {
        calls: AtomicUsize,
        last_form: parking_lot::Mutex<HashMap<String, String>>,
        last_authorization: parking_lot::Mutex<Option<String>>,
    }

    async fn token_handler(
        State(state): State<Arc<TokenEndpoint>>,
        headers: HeaderMap,
        Form(form): Form<HashMap<String, String>>,
    ) -> Json<Value> {
        let n = state.calls.fetch_add(1, Ordering::SeqCst) + 1;
        *state.last_form.lock() = form;
        *state.last_authorization.lock() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        Json(json!({ "access_token": format!("token-{n}"), "expires_in": 3600 }))
    }

    async fn start(state: Arc<TokenEndpoint>) -> MockServer {
        let app = Router::new()
            .route("/services/rest/auth/oauth2/v1/token", post(token_handler))
            .with_state(state);
        MockServer::start(app).await.expect("start mock token endpoint")
    }

    fn options(base: &str) -> ClientOptions {
        let mut opts = ClientOptions::new("123", "my-client", "cert-kid", TEST_RSA_PRIVATE_KEY);
        opts.base_url = Some(format!("{base}/services/rest"));
        opts
    }

    #[tokio::test]
    async fn static_token_is_returned_verbatim() {
        assert_eq!(StaticToken::new("abc").access_token().await.unwrap(), "abc");
    }

    #[test]
    fn rejects_non_rsa_key() {
        let opts = ClientOptions::new("123", "c", "k", "not a key");
        let err = ClientCredentials::new(reqwest::Client::new(), &opts)
            .err()
            .expect("invalid key must fail");
        assert!(matches!(err, ClientError::Auth(_)));
    }

    #[test]
    fn assertion_carries_kid_and_claims() {
        let opts = options("https://erp.example.com");
        let creds = ClientCredentials::new(reqwest::Client::new(), &opts).unwrap();
        let jwt = creds.client_assertion().unwrap();

        let header = jsonwebtoken::decode_header(&jwt).unwrap();
        assert_eq!(header.alg, Algorithm::PS256);
        assert_eq!(header.kid.as_deref(), Some("cert-kid"));

        let aud = "https://erp.example.com/services/rest/auth/oauth2/v1/token";
        let mut validation = Validation::new(Algorithm::PS256);
        validation.set_audience(&[aud]);
        validation.set_issuer(&["my-client"]);
        let key = DecodingKey::from_rsa_pem(TEST_RSA_PUBLIC_KEY.as_bytes()).unwrap();
        let claims = jsonwebtoken::decode::<Value>(&jwt, &key, &validation)
            .unwrap()
            .claims;
        assert_eq!(claims["scope"], json!(["rest_webservices"]));
        assert_eq!(
            claims["exp"].as_u64().unwrap() - claims["iat"].as_u64().unwrap(),
            3600
        );
    }

    #[tokio::test]
    async fn client_credentials_posts_grant_and_caches_token() {
        let state = Arc::new(TokenEndpoint::default());
        let server = start(state.clone()).await;
        let creds =
            ClientCredentials::new(reqwest::Client::new(), &options(server.base_url())).unwrap();

        assert_eq!(creds.access_token().await.unwrap(), "token-1");
        assert_eq!(creds.access_token().await.unwrap(), "token-1");
        assert_eq!(state.calls.load(Ordering::SeqCst), 1);

        let form = state.last_form.lock().clone();
        assert_eq!(form["grant_type"], "client_credentials");
        assert_eq!(form["client_assertion_type"], CLIENT_ASSERTION_TYPE);
        assert_eq!(form["client_assertion"].split('.').count(), 3);
        assert!(state.last_authorization.lock().is_none());

        server.stop().await;
    }

    #[tokio::test]
    async fn client_secret_is_sent_as_basic_auth() {
        let state = Arc::new(TokenEndpoint::default());
        let server = start(state.clone()).await;
        let mut opts = options(server.base_url());
        opts.client_secret = Some("s3cret".to_string());
        let creds = ClientCredentials::new(reqwest::Client::new(), &opts).unwrap();

        creds.access_token().await.unwrap();
        let auth = state.last_authorization.lock().clone().unwrap();
        assert!(auth.starts_with("Basic "), "unexpected header: {auth}");

        server.stop().await;
    }

    #[tokio::test]
    async fn token_endpoint_failure_is_an_auth_error() {
        let app = Router::new().route(
            "/services/rest/auth/oauth2/v1/token",
            post(|| async {
                (
                    axum::http::StatusCode::UNAUTHORIZED,
                    Json(json!({"error": "invalid_client"})),
                )
            }),
        );
        let server = MockServer::start(app).await.unwrap();
        let creds =
            ClientCredentials::new(reqwest::Client::new(), &options(server.base_url())).unwrap();

        let err = creds.access_token().await.unwrap_err();
        assert!(
            matches!(&err, ClientError::Auth(msg) if msg.contains("401") && msg.contains("invalid_client")),
            "unexpected error: {err}"
        );

        server.stop().await;
    }
}
