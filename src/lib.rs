//! Client-side content layer for a headless-CMS blog: a normalized GraphQL
//! cache with fetch policies, a retrying transport with endpoint failover,
//! cursor and offset paginators, and a homepage aggregator.

pub mod cache;
pub mod cms;
pub mod config;
pub mod context;
pub mod error;
pub mod homepage;
pub mod logging;
pub mod paginate;
pub mod query;
pub mod transport;

#[cfg(test)]
mod testing;

pub use cache::{CacheResult, CacheSource, CacheStore, FetchPolicy, FetchPolicyEngine};
pub use config::Config;
pub use context::CmsContext;
pub use error::{Error, Result};
pub use homepage::{Branch, HomepageAggregator, HomepageSnapshot};
pub use paginate::{CursorPaginator, OffsetPaginator, PageOutcome, PageRedirect};
