//! Explicit wiring of the store, engine, transports and clients.

use std::sync::Arc;

use crate::cache::{CacheStore, FetchPolicy, FetchPolicyEngine};
use crate::cms::{CachedCmsClient, CmsClient, FeedScope, OneShotSizes};
use crate::config::Config;
use crate::error::Result;
use crate::homepage::HomepageAggregator;
use crate::paginate::{CursorPaginator, OffsetPaginator};
use crate::transport::{GraphqlTransport, HttpTransport, Transport};

/// Everything a page needs to talk to the CMS. Cheap to clone; clones share
/// the cache.
#[derive(Clone)]
pub struct CmsContext {
  pub store: Arc<CacheStore>,
  pub engine: FetchPolicyEngine,
  pub client: CachedCmsClient,
  pub policy: FetchPolicy,
  pub page_size: u32,
  pub per_page: u32,
}

impl CmsContext {
  /// Build from configuration: CDN replica as primary, and the content API as
  /// failover target when both its URL and a token are available.
  pub fn from_config(config: &Config) -> Result<Self> {
    let timeout = config.timeout();
    let primary = HttpTransport::new("cdn", config.cdn_url()?, None, timeout)?;
    let mut transport = GraphqlTransport::new(Arc::new(primary), config.retry_policy());

    match (config.content_url()?, Config::content_token()) {
      (Some(url), Some(token)) => {
        let secondary = HttpTransport::new("content", url, Some(&token), timeout)?;
        transport = transport.with_secondary(Arc::new(secondary));
      }
      (Some(_), None) => {
        tracing::warn!("Content endpoint configured without a token; failover disabled");
      }
      _ => {}
    }

    let store = Arc::new(CacheStore::new(config.store_config()));
    let mut context = Self::with_transport(Arc::new(transport), store)
      .with_one_shot_sizes(config.pagination.one_shot_sizes());
    context.policy = config.cache.default_policy;
    context.page_size = config.pagination.page_size;
    context.per_page = config.pagination.per_page;
    Ok(context)
  }

  /// Build around an existing transport and store.
  pub fn with_transport(transport: Arc<dyn Transport>, store: Arc<CacheStore>) -> Self {
    let engine = FetchPolicyEngine::new(Arc::clone(&store));
    let client = CachedCmsClient::new(CmsClient::new(transport), engine.clone());

    Self {
      store,
      engine,
      client,
      policy: FetchPolicy::CacheFirst,
      page_size: crate::paginate::DEFAULT_PAGE_SIZE,
      per_page: crate::paginate::DEFAULT_PER_PAGE,
    }
  }

  /// Sizes of the featured and recent homepage sections.
  pub fn with_one_shot_sizes(mut self, sizes: OneShotSizes) -> Self {
    self.client = self.client.with_sizes(sizes);
    self
  }

  pub fn feed(&self, scope: FeedScope) -> CursorPaginator {
    CursorPaginator::new(self.client.clone(), scope)
      .with_page_size(self.page_size)
      .with_policy(self.policy)
  }

  pub fn archive(&self) -> OffsetPaginator {
    OffsetPaginator::new(self.client.clone()).with_policy(self.policy)
  }

  pub fn homepage(&self) -> HomepageAggregator {
    HomepageAggregator::new(self.client.clone(), self.page_size)
  }
}
