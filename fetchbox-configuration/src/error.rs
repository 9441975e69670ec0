use thiserror::Error;

/// Errors raised while loading or building a catalog.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid YAML for a catalog.
    #[error("invalid catalog: {0}")]
    Yaml(String),

    /// An endpoint names a transport the client section does not define.
    #[error("endpoint '{endpoint}' uses unknown transport '{transport}'")]
    UnknownTransport { endpoint: String, transport: String },

    #[error("invalid header name '{0}'")]
    InvalidHeaderName(String),

    #[error("invalid value for header '{0}'")]
    InvalidHeaderValue(String),

    /// The HTTP client could not be initialized.
    #[error("failed to build HTTP client: {0}")]
    Client(#[from] reqwest::Error),
}
