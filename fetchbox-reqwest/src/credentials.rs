//! Credential sources consulted before every outbound call.
//!
//! The value a source returns is written verbatim into the authorization
//! header; include a scheme such as `Bearer ` in the token if the server
//! expects one.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use reqwest::Url;
use reqwest::cookie::{CookieStore, Jar};

/// Synchronous lookup of the current authorization token.
///
/// Implemented for any `Fn() -> Option<String>` closure.
pub trait CredentialSource: Send + Sync {
    /// Current token, or `None` to send no authorization header.
    fn token(&self) -> Option<String>;
}

impl<F> CredentialSource for F
where
    F: Fn() -> Option<String> + Send + Sync,
{
    fn token(&self) -> Option<String> {
        self()
    }
}

/// Source that never yields a token.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCredentials;

impl CredentialSource for NoCredentials {
    fn token(&self) -> Option<String> {
        None
    }
}

/// Source that always yields the same token.
#[derive(Debug, Clone)]
pub struct StaticToken(String);

impl StaticToken {
    /// Creates a source for a fixed token.
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }
}

impl CredentialSource for StaticToken {
    fn token(&self) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Token slot shared between the transport and the code that logs in and out.
///
/// ```
/// use fetchbox_reqwest::{CredentialSource, SharedToken};
///
/// let token = SharedToken::default();
/// assert_eq!(token.token(), None);
///
/// token.set("secret");
/// assert_eq!(token.token().as_deref(), Some("secret"));
///
/// token.clear();
/// assert_eq!(token.token(), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SharedToken(Arc<RwLock<Option<String>>>);

impl SharedToken {
    /// Stores a new token.
    pub fn set(&self, token: impl Into<String>) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = Some(token.into());
    }

    /// Removes the stored token.
    pub fn clear(&self) {
        *self.0.write().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl CredentialSource for SharedToken {
    fn token(&self) -> Option<String> {
        self.0.read().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Reads the token from a named cookie in a reqwest cookie jar.
///
/// Useful when the login endpoint sets the token as a cookie that has to be
/// echoed back in the authorization header.
pub struct CookieToken {
    jar: Arc<Jar>,
    url: Url,
    name: String,
}

impl CookieToken {
    /// Looks up cookie `name` as it would be sent to `url`.
    pub fn new(jar: Arc<Jar>, url: Url, name: impl Into<String>) -> Self {
        Self {
            jar,
            url,
            name: name.into(),
        }
    }
}

impl CredentialSource for CookieToken {
    fn token(&self) -> Option<String> {
        let header = self.jar.cookies(&self.url)?;
        let cookies = header.to_str().ok()?;
        cookies.split(';').find_map(|pair| {
            let (name, value) = pair.trim().split_once('=')?;
            (name == self.name).then(|| value.to_owned())
        })
    }
}

impl fmt::Debug for CookieToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieToken")
            .field("url", &self.url.as_str())
            .field("name", &self.name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closure_source() {
        let source = || Some("from-closure".to_owned());
        assert_eq!(source.token().as_deref(), Some("from-closure"));
    }

    #[test]
    fn test_cookie_token_picks_named_cookie() {
        let url: Url = "http://localhost/api/admin".parse().unwrap();
        let jar = Arc::new(Jar::default());
        jar.add_cookie_str("theme=dark", &url);
        jar.add_cookie_str("adminToken=abc123", &url);

        let source = CookieToken::new(jar, url, "adminToken");
        assert_eq!(source.token().as_deref(), Some("abc123"));
    }

    #[test]
    fn test_cookie_token_missing_cookie() {
        let url: Url = "http://localhost/".parse().unwrap();
        let source = CookieToken::new(Arc::new(Jar::default()), url, "adminToken");
        assert_eq!(source.token(), None);
    }
}
