//! Classified transport results.
//!
//! A transport never fails with an error. Every exchange ends in one of three
//! [`Outcome`] variants:
//!
//! | variant                         | when                                              |
//! |---------------------------------|---------------------------------------------------|
//! | [`Data`](Outcome::Data)         | success status and the body's `success` flag set  |
//! | [`Rejected`](Outcome::Rejected) | success status but the application reported failure |
//! | [`Failed`](Outcome::Failed)     | error status, network failure, timeout or abort   |
//!
//! ```
//! use fetchbox_core::{ErrorResponse, Outcome};
//! use serde_json::json;
//!
//! fn describe(outcome: &Outcome) -> String {
//!     match outcome {
//!         Outcome::Data(payload) => format!("ok: {payload}"),
//!         Outcome::Rejected(body) => format!("rejected: {}", body["message"]),
//!         Outcome::Failed(error) => format!("failed: {:?}", error.status),
//!     }
//! }
//!
//! assert_eq!(describe(&Outcome::Data(json!({ "x": 1 }))), r#"ok: {"x":1}"#);
//! assert_eq!(describe(&Outcome::Failed(ErrorResponse::network("refused"))), "failed: None");
//! ```

use http::{HeaderMap, StatusCode};
use serde_json::Value;

/// Result of a single transport call.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Unwrapped payload of a successful call.
    Data(Value),
    /// Full body of a call the application refused.
    Rejected(Value),
    /// Error response of a call that did not complete successfully.
    Failed(ErrorResponse),
}

impl Outcome {
    /// Returns the payload of a [`Data`](Outcome::Data) outcome.
    pub fn data(&self) -> Option<&Value> {
        match self {
            Outcome::Data(payload) => Some(payload),
            _ => None,
        }
    }

    /// Consumes the outcome and returns the payload of a `Data` outcome.
    pub fn into_data(self) -> Option<Value> {
        match self {
            Outcome::Data(payload) => Some(payload),
            _ => None,
        }
    }

    /// Returns `true` for [`Outcome::Data`].
    #[inline]
    pub fn is_data(&self) -> bool {
        matches!(self, Outcome::Data(_))
    }

    /// Returns `true` for [`Outcome::Rejected`].
    #[inline]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Outcome::Rejected(_))
    }

    /// Returns `true` for [`Outcome::Failed`].
    #[inline]
    pub fn is_failed(&self) -> bool {
        matches!(self, Outcome::Failed(_))
    }

    /// Returns whatever body the outcome carries, regardless of variant.
    pub fn body(&self) -> &Value {
        match self {
            Outcome::Data(payload) => payload,
            Outcome::Rejected(body) => body,
            Outcome::Failed(error) => &error.body,
        }
    }
}

/// Response of a failed exchange.
///
/// `status` is `None` when no response arrived at all (connection refused,
/// timeout, abort).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ErrorResponse {
    /// HTTP status, if a response was received.
    pub status: Option<StatusCode>,
    /// Response headers, empty if no response was received.
    pub headers: HeaderMap,
    /// Decoded response body, `Null` if there was none.
    pub body: Value,
    /// Human-readable cause for failures without a response.
    pub message: Option<String>,
}

impl ErrorResponse {
    /// Error response for a received non-success status.
    pub fn status(status: StatusCode, headers: HeaderMap, body: Value) -> Self {
        Self {
            status: Some(status),
            headers,
            body,
            message: None,
        }
    }

    /// Error response for a failure before any response arrived.
    pub fn network(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Error response for a call aborted through its signal.
    pub fn aborted() -> Self {
        Self::network("request aborted")
    }
}
