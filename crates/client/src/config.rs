//! Connection options for one NetSuite account.

use crate::error::{ClientError, Result};
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use url::Url;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientOptions {
    pub account_id: String,
    pub client_id: String,
    /// Sent as HTTP basic auth on the token request when set.
    #[serde(default)]
    pub client_secret: Option<String>,
    /// Key id of the certificate uploaded for the integration; becomes the JWT `kid`.
    pub certificate_id: String,
    /// RSA private key (PEM) matching the certificate.
    pub private_key_pem: String,
    /// Overrides the account-derived REST base URL.
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl fmt::Debug for ClientOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientOptions")
            .field("account_id", &self.account_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("certificate_id", &self.certificate_id)
            .field("private_key_pem", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl ClientOptions {
    #[must_use]
    pub fn new(
        account_id: impl Into<String>,
        client_id: impl Into<String>,
        certificate_id: impl Into<String>,
        private_key_pem: impl Into<String>,
    ) -> Self {
        Self {
            account_id: account_id.into(),
            client_id: client_id.into(),
            client_secret: None,
            certificate_id: certificate_id.into(),
            private_key_pem: private_key_pem.into(),
            base_url: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }

    /// # Errors
    ///
    /// Returns a config error naming the first required value that is empty, or an invalid
    /// base URL override.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("accountId", &self.account_id),
            ("clientId", &self.client_id),
            ("certificateId", &self.certificate_id),
            ("privateKeyPem", &self.private_key_pem),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(ClientError::Config(format!("{name} is required")));
            }
        }
        if self.timeout_secs == 0 {
            return Err(ClientError::Config("timeoutSecs must be positive".to_string()));
        }
        self.base_url()?;
        Ok(())
    }

    /// REST root, e.g. `https://1234567-sb1.suitetalk.api.netsuite.com/services/rest`.
    ///
    /// # Errors
    ///
    /// Returns a config error if the resulting URL is invalid or cannot carry a path.
    pub fn base_url(&self) -> Result<Url> {
        let raw = match self.base_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url.to_string(),
            _ => format!(
                "https://{}.suitetalk.api.netsuite.com/services/rest",
                account_host_label(&self.account_id)
            ),
        };
        let url = Url::parse(&raw)?;
        if url.cannot_be_a_base() {
            return Err(ClientError::Config(format!("base URL '{raw}' cannot carry a path")));
        }
        Ok(url)
    }

    /// # Errors
    ///
    /// See [`ClientOptions::base_url`].
    pub fn token_url(&self) -> Result<Url> {
        endpoint(&self.base_url()?, &["auth", "oauth2", "v1", "token"])
    }

    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Account ids appear in hostnames lowercased, with `_` (sandbox suffixes) as `-`.
fn account_host_label(account_id: &str) -> String {
    account_id.trim().to_lowercase().replace('_', "-")
}

/// Append percent-encoded path segments to `base`.
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| ClientError::Config(format!("base URL '{base}' cannot carry a path")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
