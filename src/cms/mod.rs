//! Headless-CMS content API: domain types, query documents, and the typed
//! (and cached) clients built on the transport.

pub mod api_types;
pub mod cache;
pub mod cached_client;
pub mod client;
pub mod queries;
pub mod types;

pub use cache::{with_cms_entities, CmsQueryKey, FeedScope};
pub use cached_client::{CachedCmsClient, OneShotSizes};
pub use client::{validate_page_size, CmsClient, MAX_PAGE_SIZE};
pub use types::{Article, Author, Category, MediaAsset};
