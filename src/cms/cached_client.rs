//! CMS client that routes every read through the fetch policy engine.

use crate::cache::{CacheResult, Connection, FetchPolicy, FetchPolicyEngine};
use crate::error::Result;

use super::cache::{CmsQueryKey, FeedScope};
use super::client::{validate_page_size, CmsClient};
use super::types::{Article, Category};

/// How many items the one-shot homepage queries ask for.
#[derive(Debug, Clone, Copy)]
pub struct OneShotSizes {
  pub featured: u32,
  pub recent: u32,
}

impl Default for OneShotSizes {
  fn default() -> Self {
    Self {
      featured: 3,
      recent: 5,
    }
  }
}

/// CMS client with transparent caching.
///
/// This wraps the underlying CmsClient and provides the same reads, but each
/// one is resolved against the cache according to a fetch policy.
#[derive(Clone)]
pub struct CachedCmsClient {
  inner: CmsClient,
  engine: FetchPolicyEngine,
  sizes: OneShotSizes,
}

impl CachedCmsClient {
  pub fn new(inner: CmsClient, engine: FetchPolicyEngine) -> Self {
    Self {
      inner,
      engine,
      sizes: OneShotSizes::default(),
    }
  }

  pub fn with_sizes(mut self, sizes: OneShotSizes) -> Self {
    self.sizes = sizes;
    self
  }

  pub fn engine(&self) -> &FetchPolicyEngine {
    &self.engine
  }

  /// First page of a feed (replaces the cached root on fetch).
  pub async fn feed_first_page(
    &self,
    scope: &FeedScope,
    first: u32,
    policy: FetchPolicy,
  ) -> Result<CacheResult<Connection<Article>>> {
    validate_page_size(first)?;
    let key = CmsQueryKey::Feed {
      scope: scope.clone(),
    };

    self
      .engine
      .resolve(&key, policy, None, || {
        let inner = self.inner.clone();
        let scope = scope.clone();
        async move { inner.feed_page(&scope, first, None).await }
      })
      .await
  }

  /// Page after `after` (always from the network). Appended to the cached root
  /// only while the root still ends at `after`.
  pub async fn feed_next_page(
    &self,
    scope: &FeedScope,
    first: u32,
    after: &str,
  ) -> Result<CacheResult<Connection<Article>>> {
    validate_page_size(first)?;
    let key = CmsQueryKey::Feed {
      scope: scope.clone(),
    };

    self
      .engine
      .resolve(&key, FetchPolicy::NetworkOnly, Some(after), || {
        let inner = self.inner.clone();
        let scope = scope.clone();
        let after = after.to_string();
        async move { inner.feed_page(&scope, first, Some(&after)).await }
      })
      .await
  }

  pub async fn posts_with_offset(
    &self,
    first: u32,
    skip: u32,
    policy: FetchPolicy,
  ) -> Result<CacheResult<Connection<Article>>> {
    validate_page_size(first)?;
    let key = CmsQueryKey::PostsOffset { first, skip };

    self
      .engine
      .resolve(&key, policy, None, || {
        let inner = self.inner.clone();
        async move { inner.posts_with_offset(first, skip).await }
      })
      .await
  }

  pub async fn total_posts_count(&self, policy: FetchPolicy) -> Result<CacheResult<u64>> {
    let result = self
      .engine
      .resolve(&CmsQueryKey::TotalPostsCount, policy, None, || {
        let inner = self.inner.clone();
        async move { inner.total_posts_count().await }
      })
      .await?;

    Ok(result.map(|c: Connection<Article>| c.total_count))
  }

  pub async fn featured_posts(&self, policy: FetchPolicy) -> Result<CacheResult<Vec<Article>>> {
    let first = self.sizes.featured;
    let result = self
      .engine
      .resolve(&CmsQueryKey::FeaturedPosts, policy, None, || {
        let inner = self.inner.clone();
        async move { inner.featured_posts(first).await }
      })
      .await?;

    Ok(result.map(Connection::into_nodes))
  }

  pub async fn recent_posts(&self, policy: FetchPolicy) -> Result<CacheResult<Vec<Article>>> {
    let first = self.sizes.recent;
    let result = self
      .engine
      .resolve(&CmsQueryKey::RecentPosts, policy, None, || {
        let inner = self.inner.clone();
        async move { inner.recent_posts(first).await }
      })
      .await?;

    Ok(result.map(Connection::into_nodes))
  }

  pub async fn categories(&self, policy: FetchPolicy) -> Result<CacheResult<Vec<Category>>> {
    let result = self
      .engine
      .resolve(&CmsQueryKey::Categories, policy, None, || {
        let inner = self.inner.clone();
        async move { inner.categories().await }
      })
      .await?;

    Ok(result.map(Connection::into_nodes))
  }

  /// Get a single article by slug with caching.
  pub async fn post(&self, slug: &str, policy: FetchPolicy) -> Result<CacheResult<Option<Article>>> {
    self
      .engine
      .resolve_entity(slug, policy, || {
        let inner = self.inner.clone();
        let slug = slug.to_string();
        async move { inner.post_by_slug(&slug).await }
      })
      .await
  }

  /// Drop the cached roots behind the given keys.
  pub fn evict(&self, keys: &[CmsQueryKey]) -> Result<()> {
    for key in keys {
      self.engine.evict(key)?;
    }
    Ok(())
  }
}
