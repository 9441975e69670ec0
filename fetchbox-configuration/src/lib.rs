//! YAML endpoint catalogs for fetchbox.
//!
//! A catalog document describes one HTTP client (base URL, timeout, default
//! headers, named transport variants), an optional in-memory query cache and a
//! set of named endpoints. [`ConfigCatalog::build`] turns it into a [`Catalog`]
//! of ready [`RequestBuilder`](fetchbox::RequestBuilder)s.
//!
//! ```
//! use std::sync::Arc;
//!
//! use fetchbox_configuration::ConfigCatalog;
//! use fetchbox_reqwest::StaticToken;
//!
//! let catalog = ConfigCatalog::from_yaml(
//!     r#"
//! client:
//!   base_url: http://localhost:8080/api/admin
//! endpoints:
//!   config_prompt_list:
//!     url: /config/prompt/list
//! "#,
//! )
//! .unwrap()
//! .build(Arc::new(StaticToken::new("admin-token")))
//! .unwrap();
//!
//! let list = catalog.get("config_prompt_list").unwrap();
//! assert_eq!(list.url(), "/config/prompt/list");
//! ```

mod catalog;
mod client;
mod endpoint;
mod error;

pub use catalog::{Catalog, ConfigCache, ConfigCatalog};
pub use client::{ConfigClient, ConfigTransport};
pub use endpoint::{ConfigEndpoint, ConfigMutationOptions, ConfigQueryOptions};
pub use error::ConfigError;
