//! Query key types.
//!
//! A [`QueryKey`] identifies one cacheable fetch. It is the ordered tuple
//! `(url, method, params?)`:
//!
//! - `[url, method]` when the caller supplied no parameters at all
//! - `[url, method, params]` otherwise, even when `params` is empty
//!
//! The two shapes never compare equal, so "no parameters" and "empty
//! parameters" can be cached separately.
//!
//! ```
//! use fetchbox_core::{Method, Params, QueryKey};
//!
//! let bare = QueryKey::new("/items", Method::Get, None);
//! let empty = QueryKey::new("/items", Method::Get, Some(Params::new()));
//! assert_ne!(bare, empty);
//! assert_eq!(bare.to_string(), r#"["/items","get"]"#);
//! assert_eq!(empty.to_string(), r#"["/items","get",{}]"#);
//! ```
//!
//! ## Matching
//!
//! [`QueryKey::matches`] treats another key as a filter: a two-element key
//! matches every key of the same endpoint, a three-element key matches keys
//! whose parameters contain the filter's parameters. Invalidation and refetch
//! use it to address groups of cached queries.
//!
//! ## Performance
//!
//! `QueryKey` wraps its data in an `Arc`, so clones only bump a reference
//! count. Keys are cloned into the cache, the in-flight map and every fetch
//! context.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use serde::ser::SerializeSeq;
use serde::{Serialize, Serializer};
use smol_str::SmolStr;

use crate::method::Method;
use crate::params::Params;

#[derive(Debug, PartialEq, Eq, Hash)]
struct QueryKeyInner {
    url: SmolStr,
    method: Method,
    params: Option<Params>,
}

/// Structural identity of a cacheable fetch.
#[derive(Clone)]
pub struct QueryKey {
    inner: Arc<QueryKeyInner>,
}

impl QueryKey {
    /// Creates a key from its three components.
    pub fn new(url: impl Into<SmolStr>, method: Method, params: Option<Params>) -> Self {
        QueryKey {
            inner: Arc::new(QueryKeyInner {
                url: url.into(),
                method,
                params,
            }),
        }
    }

    /// URL template of the endpoint.
    #[inline]
    pub fn url(&self) -> &str {
        &self.inner.url
    }

    /// Method of the endpoint.
    #[inline]
    pub fn method(&self) -> Method {
        self.inner.method
    }

    /// Parameters, when the key carries a third element.
    #[inline]
    pub fn params(&self) -> Option<&Params> {
        self.inner.params.as_ref()
    }

    /// Number of tuple elements: 2 or 3.
    #[inline]
    pub fn len(&self) -> usize {
        if self.inner.params.is_some() { 3 } else { 2 }
    }

    /// Always `false`; a key has at least url and method.
    #[inline]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Returns `true` if this key is selected by `filter`.
    ///
    /// ```
    /// use fetchbox_core::{Method, QueryKey, params};
    ///
    /// let key = QueryKey::new("/items", Method::Get, Some(params! { "id": 1, "page": 2 }));
    /// assert!(key.matches(&QueryKey::new("/items", Method::Get, None)));
    /// assert!(key.matches(&QueryKey::new("/items", Method::Get, Some(params! { "id": 1 }))));
    /// assert!(!key.matches(&QueryKey::new("/items", Method::Post, None)));
    /// ```
    pub fn matches(&self, filter: &QueryKey) -> bool {
        if Arc::ptr_eq(&self.inner, &filter.inner) {
            return true;
        }
        if self.inner.url != filter.inner.url || self.inner.method != filter.inner.method {
            return false;
        }
        match (&self.inner.params, &filter.inner.params) {
            (_, None) => true,
            (Some(params), Some(subset)) => params.contains(subset),
            (None, Some(_)) => false,
        }
    }
}

impl PartialEq for QueryKey {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for QueryKey {}

impl Hash for QueryKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl fmt::Debug for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "QueryKey({self})")
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match serde_json::to_string(self) {
            Ok(json) => f.write_str(&json),
            Err(_) => Err(fmt::Error),
        }
    }
}

impl Serialize for QueryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        seq.serialize_element(self.inner.url.as_str())?;
        seq.serialize_element(&self.inner.method)?;
        if let Some(params) = &self.inner.params {
            seq.serialize_element(params)?;
        }
        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::params;

    #[test]
    fn test_distinct_params_distinct_keys() {
        let a = QueryKey::new("/items", Method::Get, Some(params! { "id": 1 }));
        let b = QueryKey::new("/items", Method::Get, Some(params! { "id": 2 }));
        let c = QueryKey::new("/items", Method::Get, Some(params! { "id": 1 }));
        assert_ne!(a, b);
        assert_eq!(a, c);

        let set: HashSet<_> = [a, b, c].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_method_is_part_of_identity() {
        let get = QueryKey::new("/items", Method::Get, None);
        let post = QueryKey::new("/items", Method::Post, None);
        assert_ne!(get, post);
    }

    #[test]
    fn test_bare_and_empty_are_distinct() {
        let bare = QueryKey::new("/items", Method::Get, None);
        let empty = QueryKey::new("/items", Method::Get, Some(Params::new()));
        assert_ne!(bare, empty);
        assert_eq!(bare.len(), 2);
        assert_eq!(empty.len(), 3);
    }

    #[test]
    fn test_bare_filter_matches_everything_on_endpoint() {
        let filter = QueryKey::new("/items", Method::Get, None);
        assert!(QueryKey::new("/items", Method::Get, None).matches(&filter));
        assert!(QueryKey::new("/items", Method::Get, Some(Params::new())).matches(&filter));
        assert!(!QueryKey::new("/other", Method::Get, None).matches(&filter));
    }

    #[test]
    fn test_params_filter_needs_params() {
        let filter = QueryKey::new("/items", Method::Get, Some(params! { "id": 1 }));
        assert!(!QueryKey::new("/items", Method::Get, None).matches(&filter));
        assert!(!QueryKey::new("/items", Method::Get, Some(params! { "id": 2 })).matches(&filter));
    }

    #[test]
    fn test_display_as_json_tuple() {
        let key = QueryKey::new("/items/{id}", Method::Delete, Some(params! { "id": 7 }));
        assert_eq!(key.to_string(), r#"["/items/{id}","delete",{"id":7}]"#);
    }
}
