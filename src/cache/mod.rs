//! Generic caching layer for GraphQL content.
//!
//! This module is CMS-agnostic. It provides:
//! - A normalized in-memory store keyed by entity identity, with deep merge
//! - Cached query roots that reference entities (appended for paginated roots)
//! - Freshness windows per entity type and per root
//! - A fetch policy engine (cache-first, cache-and-network, network-only)

mod connection;
mod policy;
mod store;
mod traits;

pub use connection::{Connection, Edge, PageInfo};
pub use policy::{CacheEvent, FetchPolicy, FetchPolicyEngine};
pub use store::{CacheStore, CachedEntity, CachedRoot, RootWrite, StoreConfig};
pub use traits::{
  is_fresh, CacheResult, CacheSource, Cacheable, EntityKey, Fetched, Normalized, QueryKey, RootId,
};
