use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use fetchbox::RequestBuilder;
use fetchbox_core::QueryCache;
use fetchbox_moka::{DEFAULT_GC_TIME, DEFAULT_STALE_TIME, MokaQueryClient};
use fetchbox_reqwest::{CredentialSource, HttpClient};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::ConfigClient;
use crate::endpoint::ConfigEndpoint;
use crate::error::ConfigError;

fn default_max_capacity() -> u64 {
    10_000
}

/// In-memory query cache shared by every endpoint of a catalog.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigCache {
    #[serde(default = "default_max_capacity")]
    pub max_capacity: u64,
    #[serde(default, with = "humantime_serde")]
    pub stale_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub gc_time: Option<Duration>,
}

impl ConfigCache {
    pub fn build(&self) -> MokaQueryClient {
        MokaQueryClient::builder(self.max_capacity)
            .stale_time(self.stale_time.unwrap_or(DEFAULT_STALE_TIME))
            .gc_time(self.gc_time.unwrap_or(DEFAULT_GC_TIME))
            .build()
    }
}

/// Top-level catalog document.
///
/// ```yaml
/// client:
///   base_url: http://localhost:8080/api/admin
///   timeout: 600s
///   transports:
///     form:
///       headers:
///         Content-Type: application/x-www-form-urlencoded
/// cache:
///   max_capacity: 1000
/// endpoints:
///   config_prompt_list:
///     url: /config/prompt/list
///   config_prompt_delete:
///     url: /config/prompt/delete
///     method: post
///     transport: form
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigCatalog {
    #[serde(default)]
    pub client: ConfigClient,
    #[serde(default)]
    pub cache: Option<ConfigCache>,
    #[serde(default)]
    pub endpoints: IndexMap<String, ConfigEndpoint>,
}

impl ConfigCatalog {
    /// Parses a catalog from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        serde_saphyr::from_str(yaml).map_err(|error| ConfigError::Yaml(error.to_string()))
    }

    /// Builds the HTTP clients, the optional cache and one
    /// [`RequestBuilder`] per endpoint.
    ///
    /// Every client reads its token from `credentials` on each call.
    pub fn build(&self, credentials: Arc<dyn CredentialSource>) -> Result<Catalog, ConfigError> {
        let client = self.client.build_client(credentials.clone())?;
        let transports = self
            .client
            .transports
            .iter()
            .map(|(name, transport)| {
                let http = self.client.build_transport(transport, credentials.clone())?;
                Ok((name.clone(), http))
            })
            .collect::<Result<IndexMap<_, _>, ConfigError>>()?;
        let query_client: Option<Arc<dyn QueryCache>> = self
            .cache
            .as_ref()
            .map(|cache| Arc::new(cache.build()) as Arc<dyn QueryCache>);

        let mut endpoints = IndexMap::with_capacity(self.endpoints.len());
        for (name, endpoint) in &self.endpoints {
            let http = match endpoint.transport.as_deref() {
                None => client.clone(),
                Some(transport) => transports.get(transport).cloned().ok_or_else(|| {
                    ConfigError::UnknownTransport {
                        endpoint: name.clone(),
                        transport: transport.to_owned(),
                    }
                })?,
            };
            let mut descriptor = endpoint.to_descriptor()?.transport(http);
            if let Some(query_client) = &query_client {
                descriptor = descriptor.query_client(query_client.clone());
            }
            endpoints.insert(name.clone(), RequestBuilder::new(descriptor));
        }
        debug!(
            endpoints = endpoints.len(),
            transports = transports.len(),
            "catalog built"
        );

        Ok(Catalog {
            client,
            transports,
            query_client,
            endpoints,
        })
    }
}

/// Request builders built from a [`ConfigCatalog`].
pub struct Catalog {
    client: HttpClient,
    transports: IndexMap<String, HttpClient>,
    query_client: Option<Arc<dyn QueryCache>>,
    endpoints: IndexMap<String, RequestBuilder>,
}

impl Catalog {
    /// Builder of the named endpoint.
    pub fn get(&self, name: &str) -> Option<&RequestBuilder> {
        self.endpoints.get(name)
    }

    /// Endpoint names in document order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.endpoints.keys().map(String::as_str)
    }

    /// The default HTTP client.
    pub fn client(&self) -> &HttpClient {
        &self.client
    }

    /// A named transport.
    pub fn transport(&self, name: &str) -> Option<&HttpClient> {
        self.transports.get(name)
    }

    /// The shared query cache, when the document configured one.
    pub fn query_client(&self) -> Option<&Arc<dyn QueryCache>> {
        self.query_client.as_ref()
    }
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Catalog")
            .field("client", &self.client)
            .field("transports", &self.transports)
            .field("query_client", &self.query_client.as_ref().map(|_| "..."))
            .field("endpoints", &self.endpoints)
            .finish()
    }
}
