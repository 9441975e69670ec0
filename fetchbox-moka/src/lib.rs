#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

mod builder;
mod client;
mod entry;

pub use builder::{DEFAULT_GC_TIME, DEFAULT_STALE_TIME, MokaQueryClientBuilder};
pub use client::MokaQueryClient;
pub use moka::policy::EvictionPolicy;
