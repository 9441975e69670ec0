//! Process-wide fallbacks for the transport and the query cache.
//!
//! Builders consult this registry last, after call options and their
//! descriptor. It is meant to be filled once at start-up; writes are
//! last-write-wins.

use std::sync::{Arc, PoisonError, RwLock};

use fetchbox_core::{QueryCache, Transport};
use lazy_static::lazy_static;
use tracing::debug;

#[derive(Default)]
struct Defaults {
    transport: Option<Arc<dyn Transport>>,
    query_client: Option<Arc<dyn QueryCache>>,
}

lazy_static! {
    static ref DEFAULTS: RwLock<Defaults> = RwLock::new(Defaults::default());
}

/// Sets the process-wide default transport.
pub fn set_transport(transport: Arc<dyn Transport>) {
    debug!("default transport replaced");
    DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .transport = Some(transport);
}

/// Returns the process-wide default transport.
pub fn transport() -> Option<Arc<dyn Transport>> {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .transport
        .clone()
}

/// Sets the process-wide default query cache.
pub fn set_query_client(query_client: Arc<dyn QueryCache>) {
    debug!("default query client replaced");
    DEFAULTS
        .write()
        .unwrap_or_else(PoisonError::into_inner)
        .query_client = Some(query_client);
}

/// Returns the process-wide default query cache.
pub fn query_client() -> Option<Arc<dyn QueryCache>> {
    DEFAULTS
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .query_client
        .clone()
}

/// Removes both defaults.
pub fn clear() {
    *DEFAULTS.write().unwrap_or_else(PoisonError::into_inner) = Defaults::default();
}
