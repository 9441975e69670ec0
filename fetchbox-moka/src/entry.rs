//! Stored query results and their expiration policy.

use std::time::{Duration, Instant};

use fetchbox_core::{QueryData, QueryKey};
use moka::Expiry;

/// A query result as stored in the Moka cache.
#[derive(Debug, Clone)]
pub(crate) struct CachedQuery {
    pub(crate) data: QueryData,
    pub(crate) updated_at: Instant,
    pub(crate) invalidated: bool,
    pub(crate) gc_time: Duration,
}

impl CachedQuery {
    pub(crate) fn new(data: QueryData, gc_time: Duration) -> Self {
        Self {
            data,
            updated_at: Instant::now(),
            invalidated: false,
            gc_time,
        }
    }

    /// Returns `true` if the entry was invalidated or is older than `stale_time`.
    pub(crate) fn is_stale(&self, stale_time: Duration) -> bool {
        self.invalidated || self.updated_at.elapsed() >= stale_time
    }
}

/// Expires each entry `gc_time` after its last write.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct GcExpiry;

impl Expiry<QueryKey, CachedQuery> for GcExpiry {
    fn expire_after_create(
        &self,
        _key: &QueryKey,
        value: &CachedQuery,
        _created_at: Instant,
    ) -> Option<Duration> {
        Some(value.gc_time)
    }

    fn expire_after_update(
        &self,
        _key: &QueryKey,
        value: &CachedQuery,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        // Moka keeps the previous deadline by default; a rewrite restarts the clock.
        Some(value.gc_time)
    }
}

#[cfg(test)]
mod tests {
    use fetchbox_core::Outcome;
    use serde_json::json;

    use super::*;

    #[test]
    fn test_zero_stale_time_is_always_stale() {
        let entry = CachedQuery::new(QueryData::from(json!(1)), Duration::from_secs(60));
        assert!(entry.is_stale(Duration::ZERO));
        assert!(!entry.is_stale(Duration::from_secs(60)));
    }

    #[test]
    fn test_invalidated_entry_is_stale() {
        let mut entry = CachedQuery::new(
            QueryData::Single(Outcome::Data(json!(1))),
            Duration::from_secs(60),
        );
        entry.invalidated = true;
        assert!(entry.is_stale(Duration::MAX));
    }
}
