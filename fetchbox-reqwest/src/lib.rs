//! # fetchbox-reqwest
//!
//! HTTP client factory for fetchbox, built on [`reqwest`].
//!
//! [`HttpClient`] implements [`Transport`](fetchbox_core::Transport): it
//! resolves request URLs against a base URL, merges default and per-call
//! headers, overwrites the authorization header from a
//! [`CredentialSource`] on every call, and classifies responses into an
//! [`Outcome`](fetchbox_core::Outcome):
//!
//! - success status with `{ "success": true, "data": ... }` → `Data(data)`
//! - any other success response → `Rejected(body)`
//! - error status, network failure, timeout or abort → `Failed(..)`
//!
//! ```no_run
//! use fetchbox_core::{InvocationConfig, Method, Transport, params};
//! use fetchbox_reqwest::{HttpClient, StaticToken};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let http = HttpClient::builder()
//!     .base_url("http://localhost:8080/api/admin")
//!     .credentials(StaticToken::new("admin-token"))
//!     .build()
//!     .unwrap();
//!
//! let outcome = http
//!     .call(InvocationConfig {
//!         url: "/config/prompt/list".into(),
//!         method: Method::Get,
//!         params: Some(params! { "pageNum": 1 }),
//!         ..Default::default()
//!     })
//!     .await;
//! println!("{outcome:?}");
//! # }
//! ```

mod client;
mod credentials;
mod response;

pub use client::{
    DEFAULT_TIMEOUT, FORM_CONTENT_TYPE, HttpClient, HttpClientBuilder, JSON_CONTENT_TYPE,
};
pub use credentials::{CookieToken, CredentialSource, NoCredentials, SharedToken, StaticToken};
pub use response::{DATA_FIELD, SUCCESS_FIELD, classify_success};

/// Re-export of reqwest's cookie jar for use with [`CookieToken`].
pub use reqwest::cookie::Jar as CookieJar;
