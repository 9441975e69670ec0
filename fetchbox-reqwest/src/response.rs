//! Response classification.

use fetchbox_core::{ErrorResponse, Outcome};
use serde_json::{Map, Value};
use tracing::warn;

/// Name of the application-level success flag in response bodies.
pub const SUCCESS_FIELD: &str = "success";

/// Name of the wrapped payload in successful response bodies.
pub const DATA_FIELD: &str = "data";

/// Classifies a response that arrived with a success status.
///
/// Bodies of the form `{ "success": true, "data": ... }` are unwrapped to
/// their payload, with an absent or `null` payload becoming `{}`. Anything
/// else is returned whole as [`Outcome::Rejected`].
///
/// ```
/// use fetchbox_core::Outcome;
/// use fetchbox_reqwest::classify_success;
/// use serde_json::json;
///
/// assert_eq!(
///     classify_success(json!({ "success": true, "data": { "x": 1 } })),
///     Outcome::Data(json!({ "x": 1 })),
/// );
/// assert_eq!(
///     classify_success(json!({ "success": false, "data": "nope" })),
///     Outcome::Rejected(json!({ "success": false, "data": "nope" })),
/// );
/// ```
pub fn classify_success(body: Value) -> Outcome {
    match body {
        Value::Object(mut map) if map.get(SUCCESS_FIELD) == Some(&Value::Bool(true)) => {
            match map.remove(DATA_FIELD) {
                None | Some(Value::Null) => Outcome::Data(Value::Object(Map::new())),
                Some(payload) => Outcome::Data(payload),
            }
        }
        other => Outcome::Rejected(other),
    }
}

/// Reads and classifies a received response.
pub(crate) async fn classify(response: reqwest::Response) -> Outcome {
    let status = response.status();
    let headers = response.headers().clone();
    let bytes = match response.bytes().await {
        Ok(bytes) => bytes,
        Err(error) => return Outcome::Failed(ErrorResponse::network(error.to_string())),
    };
    let body = decode_body(&bytes);
    if status.is_success() {
        classify_success(body)
    } else {
        Outcome::Failed(ErrorResponse::status(status, headers, body))
    }
}

/// Decodes a body as JSON, keeping non-JSON text as a string.
fn decode_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| {
        warn!(len = bytes.len(), "response body is not JSON, keeping it as text");
        Value::String(String::from_utf8_lossy(bytes).into_owned())
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_null_payload_becomes_empty_object() {
        assert_eq!(
            classify_success(json!({ "success": true, "data": null })),
            Outcome::Data(json!({}))
        );
        assert_eq!(classify_success(json!({ "success": true })), Outcome::Data(json!({})));
    }

    #[test]
    fn test_falsy_payload_is_kept() {
        assert_eq!(
            classify_success(json!({ "success": true, "data": 0 })),
            Outcome::Data(json!(0))
        );
    }

    #[test]
    fn test_truthy_but_not_true_flag_is_rejected() {
        let body = json!({ "success": "yes", "data": 1 });
        assert_eq!(classify_success(body.clone()), Outcome::Rejected(body));
    }

    #[test]
    fn test_non_object_body_is_rejected() {
        assert_eq!(classify_success(json!("plain")), Outcome::Rejected(json!("plain")));
    }

    #[test]
    fn test_decode_body() {
        assert_eq!(decode_body(b""), Value::Null);
        assert_eq!(decode_body(br#"{"a":1}"#), json!({ "a": 1 }));
        assert_eq!(decode_body(b"<html>"), json!("<html>"));
    }
}
