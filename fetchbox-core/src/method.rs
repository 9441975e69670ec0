//! HTTP method of an endpoint.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// HTTP method bound to a request descriptor.
///
/// The method decides where logical parameters travel: [`Get`](Method::Get),
/// [`Head`](Method::Head) and [`Options`](Method::Options) put them in the
/// query string, every other method sends them as the request body.
///
/// ```
/// use fetchbox_core::Method;
///
/// assert_eq!(Method::default(), Method::Get);
/// assert!(Method::Head.sends_query());
/// assert!(!Method::Post.sends_query());
/// assert_eq!("DELETE".parse::<Method>().unwrap(), Method::Delete);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    /// `GET`
    #[default]
    #[serde(alias = "GET")]
    Get,
    /// `POST`
    #[serde(alias = "POST")]
    Post,
    /// `PUT`
    #[serde(alias = "PUT")]
    Put,
    /// `PATCH`
    #[serde(alias = "PATCH")]
    Patch,
    /// `DELETE`
    #[serde(alias = "DELETE")]
    Delete,
    /// `HEAD`
    #[serde(alias = "HEAD")]
    Head,
    /// `OPTIONS`
    #[serde(alias = "OPTIONS")]
    Options,
}

impl Method {
    /// Returns the lowercase method name used in query keys.
    #[inline]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "get",
            Method::Post => "post",
            Method::Put => "put",
            Method::Patch => "patch",
            Method::Delete => "delete",
            Method::Head => "head",
            Method::Options => "options",
        }
    }

    /// Whether parameters for this method go into the query string.
    #[inline]
    pub const fn sends_query(&self) -> bool {
        matches!(self, Method::Get | Method::Head | Method::Options)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown method name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unsupported HTTP method: {0}")]
pub struct ParseMethodError(String);

impl FromStr for Method {
    type Err = ParseMethodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::Get),
            "post" => Ok(Method::Post),
            "put" => Ok(Method::Put),
            "patch" => Ok(Method::Patch),
            "delete" => Ok(Method::Delete),
            "head" => Ok(Method::Head),
            "options" => Ok(Method::Options),
            _ => Err(ParseMethodError(s.to_owned())),
        }
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => http::Method::GET,
            Method::Post => http::Method::POST,
            Method::Put => http::Method::PUT,
            Method::Patch => http::Method::PATCH,
            Method::Delete => http::Method::DELETE,
            Method::Head => http::Method::HEAD,
            Method::Options => http::Method::OPTIONS,
        }
    }
}
