use std::time::Duration;

use fetchbox::{Descriptor, MutationOptions, QueryOptions};
use fetchbox_core::Method;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::client::header_map;
use crate::error::ConfigError;

/// One endpoint of a catalog.
///
/// ```yaml
/// url: /config/prompt/{id}
/// method: delete
/// url_path_params: [id]
/// transport: form
/// ```
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigEndpoint {
    pub url: String,
    #[serde(default)]
    pub method: Method,
    #[serde(default)]
    pub url_path_params: Vec<String>,
    /// Named transport; the client's default transport when absent.
    #[serde(default)]
    pub transport: Option<String>,
    #[serde(default)]
    pub query: ConfigQueryOptions,
    #[serde(default)]
    pub mutation: ConfigMutationOptions,
}

/// Query option defaults of an endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigQueryOptions {
    #[serde(default, with = "humantime_serde")]
    pub stale_time: Option<Duration>,
    #[serde(default, with = "humantime_serde")]
    pub gc_time: Option<Duration>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub revalidate_if_stale: Option<bool>,
}

impl From<&ConfigQueryOptions> for QueryOptions {
    fn from(config: &ConfigQueryOptions) -> Self {
        let mut options = QueryOptions::new();
        options.stale_time = config.stale_time;
        options.gc_time = config.gc_time;
        options.enabled = config.enabled;
        options.revalidate_if_stale = config.revalidate_if_stale;
        options
    }
}

/// Mutation option defaults of an endpoint.
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct ConfigMutationOptions {
    /// Headers sent with every mutation.
    #[serde(default)]
    pub headers: IndexMap<String, String>,
}

impl ConfigMutationOptions {
    fn to_options(&self) -> Result<MutationOptions, ConfigError> {
        let mut options = MutationOptions::new();
        options.headers = header_map(&self.headers)?;
        Ok(options)
    }
}

impl ConfigEndpoint {
    /// Descriptor carrying the URL, method, path parameters and option
    /// defaults. Transport and query cache are attached by the catalog.
    pub fn to_descriptor(&self) -> Result<Descriptor, ConfigError> {
        Ok(Descriptor::new(self.url.as_str())
            .method(self.method)
            .url_path_params(self.url_path_params.iter().cloned())
            .query_options(QueryOptions::from(&self.query))
            .mutation_options(self.mutation.to_options()?))
    }
}
