use std::sync::Arc;
use std::time::Duration;

use fetchbox_reqwest::{CredentialSource, DEFAULT_TIMEOUT, HttpClient};
use http::header::{HeaderMap, HeaderName, HeaderValue};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

fn default_timeout() -> Option<Duration> {
    Some(DEFAULT_TIMEOUT)
}

/// HTTP client section of a catalog.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigClient {
    /// Prepended to every relative endpoint URL.
    #[serde(default)]
    pub base_url: String,
    /// Overall timeout of each call (e.g. "30s", "10m").
    #[serde(default = "default_timeout", with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Default headers, applied on top of a JSON `Content-Type`.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    /// Header the credential token is written to. Defaults to `Authorization`.
    #[serde(default)]
    pub authorization_header: Option<String>,
    /// Named variants of this client, e.g. one sending forms.
    #[serde(default)]
    pub transports: IndexMap<String, ConfigTransport>,
}

impl Default for ConfigClient {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            timeout: default_timeout(),
            headers: IndexMap::new(),
            authorization_header: None,
            transports: IndexMap::new(),
        }
    }
}

/// A named transport inheriting every unset field from the client section.
///
/// Headers are merged per name, the transport's value winning.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigTransport {
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ConfigClient {
    /// Builds the default client.
    pub fn build_client(
        &self,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<HttpClient, ConfigError> {
        self.build(&ConfigTransport::default(), credentials)
    }

    /// Builds the client for one named transport.
    pub fn build_transport(
        &self,
        transport: &ConfigTransport,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<HttpClient, ConfigError> {
        self.build(transport, credentials)
    }

    fn build(
        &self,
        transport: &ConfigTransport,
        credentials: Arc<dyn CredentialSource>,
    ) -> Result<HttpClient, ConfigError> {
        let mut builder = HttpClient::builder()
            .base_url(transport.base_url.as_deref().unwrap_or(&self.base_url))
            .shared_credentials(credentials);
        if let Some(timeout) = transport.timeout.or(self.timeout) {
            builder = builder.timeout(timeout);
        }
        for headers in [&self.headers, &transport.headers] {
            for (name, value) in &header_map(headers)? {
                builder = builder.header(name.clone(), value.clone());
            }
        }
        if let Some(authorization) = &self.authorization_header {
            builder = builder.authorization_header(header_name(authorization)?);
        }
        Ok(builder.build()?)
    }
}

fn header_name(name: &str) -> Result<HeaderName, ConfigError> {
    HeaderName::from_bytes(name.as_bytes())
        .map_err(|_| ConfigError::InvalidHeaderName(name.to_owned()))
}

/// Parses configured headers.
pub(crate) fn header_map(headers: &IndexMap<String, String>) -> Result<HeaderMap, ConfigError> {
    let mut map = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let value = HeaderValue::from_str(value)
            .map_err(|_| ConfigError::InvalidHeaderValue(name.clone()))?;
        map.insert(header_name(name)?, value);
    }
    Ok(map)
}

#[cfg(test)]
mod tests {
    use fetchbox_reqwest::NoCredentials;
    use http::header::CONTENT_TYPE;
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_defaults() {
        let client: ConfigClient = serde_saphyr::from_str("base_url: /api/admin\n").unwrap();

        assert_eq!(client.base_url, "/api/admin");
        assert_eq!(client.timeout, Some(Duration::from_secs(600)));
        assert!(client.transports.is_empty());
    }

    #[test]
    fn test_transport_inherits_and_overrides() {
        let yaml = r#"
base_url: http://localhost:8080/api/admin
timeout: 30s
headers:
  X-Client: admin
transports:
  form:
    headers:
      Content-Type: application/x-www-form-urlencoded
"#;
        let client: ConfigClient = serde_saphyr::from_str(yaml).unwrap();
        let form = client
            .build_transport(&client.transports["form"], Arc::new(NoCredentials))
            .unwrap();

        assert_eq!(form.base_url(), "http://localhost:8080/api/admin");
        assert_eq!(form.headers()[CONTENT_TYPE], "application/x-www-form-urlencoded");
        assert_eq!(form.headers()["x-client"], "admin");
    }

    #[test]
    fn test_invalid_header_name() {
        let mut headers = IndexMap::new();
        headers.insert("bad header".to_owned(), "x".to_owned());

        let error = header_map(&headers).unwrap_err();

        assert!(matches!(error, ConfigError::InvalidHeaderName(name) if name == "bad header"));
    }

    #[test]
    fn test_invalid_header_value() {
        let mut headers = IndexMap::new();
        headers.insert("X-Token".to_owned(), "line\nbreak".to_owned());

        let error = header_map(&headers).unwrap_err();

        assert!(matches!(error, ConfigError::InvalidHeaderValue(name) if name == "X-Token"));
    }
}
