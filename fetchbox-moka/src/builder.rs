//! Builder for configuring [`MokaQueryClient`].

use std::sync::Arc;
use std::time::Duration;

use moka::future::CacheBuilder;
use moka::notification::RemovalCause;
use moka::policy::EvictionPolicy;
use smol_str::SmolStr;

use crate::client::{MokaQueryClient, QueryDefaults, StateMap, forget_evicted};
use crate::entry::GcExpiry;

/// Default time a stored result counts as fresh.
pub const DEFAULT_STALE_TIME: Duration = Duration::ZERO;

/// Default time a result stays cached after its last write.
pub const DEFAULT_GC_TIME: Duration = Duration::from_secs(5 * 60);

/// Builder for creating and configuring a [`MokaQueryClient`].
///
/// Use [`MokaQueryClient::builder`] to create a new builder instance.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use fetchbox_moka::{EvictionPolicy, MokaQueryClient};
///
/// let client = MokaQueryClient::builder(10_000)
///     .name("admin")
///     .stale_time(Duration::from_secs(30))
///     .eviction_policy(EvictionPolicy::lru())
///     .build();
/// ```
pub struct MokaQueryClientBuilder {
    max_capacity: u64,
    defaults: QueryDefaults,
    eviction_policy: Option<EvictionPolicy>,
    name: SmolStr,
}

impl MokaQueryClientBuilder {
    /// Creates a builder for a cache holding at most `max_capacity` queries.
    pub fn new(max_capacity: u64) -> Self {
        Self {
            max_capacity,
            defaults: QueryDefaults {
                stale_time: DEFAULT_STALE_TIME,
                gc_time: DEFAULT_GC_TIME,
            },
            eviction_policy: None,
            name: SmolStr::new_static("fetchbox"),
        }
    }

    /// Sets how long a stored result counts as fresh when the query does not
    /// say otherwise.
    ///
    /// # Default
    ///
    /// Zero: every fetch goes to the network, with concurrent fetches of the
    /// same key still sharing one call.
    pub fn stale_time(mut self, stale_time: Duration) -> Self {
        self.defaults.stale_time = stale_time;
        self
    }

    /// Sets how long a result stays cached after its last write when the
    /// query does not say otherwise.
    ///
    /// # Default
    ///
    /// Five minutes.
    pub fn gc_time(mut self, gc_time: Duration) -> Self {
        self.defaults.gc_time = gc_time;
        self
    }

    /// Sets the eviction policy applied once `max_capacity` is reached.
    ///
    /// # Default
    ///
    /// [`EvictionPolicy::tiny_lfu()`]
    pub fn eviction_policy(mut self, policy: EvictionPolicy) -> Self {
        self.eviction_policy = Some(policy);
        self
    }

    /// Sets the cache name shown in debug output and logs.
    pub fn name(mut self, name: impl Into<SmolStr>) -> Self {
        self.name = name.into();
        self
    }

    /// Builds the client.
    pub fn build(self) -> MokaQueryClient {
        let policy = self
            .eviction_policy
            .unwrap_or_else(EvictionPolicy::tiny_lfu);
        let states = Arc::new(StateMap::new());
        let listener_states = Arc::clone(&states);
        let cache = CacheBuilder::new(self.max_capacity)
            .name(&self.name)
            .eviction_policy(policy)
            .expire_after(GcExpiry)
            .eviction_listener(move |key, value, cause: RemovalCause| {
                if cause.was_evicted() {
                    forget_evicted(&listener_states, &key, &value);
                }
            })
            .build();
        MokaQueryClient::from_parts(cache, self.defaults, self.name, states)
    }
}
