//! Fetch policy engine: decides per request whether to serve from the cache,
//! go to the network, or both.

use chrono::Utc;
use serde::Deserialize;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::connection::Connection;
use super::store::{CacheStore, RootWrite};
use super::traits::{CacheResult, Cacheable, EntityKey, Fetched, QueryKey, RootId};
use crate::error::Result;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FetchPolicy {
  /// Serve fresh cache, otherwise fetch and write.
  #[default]
  CacheFirst,
  /// Serve any cached value now and refetch in the background.
  CacheAndNetwork,
  /// Always fetch.
  NetworkOnly,
}

/// Notifications sent to subscribers when the cache changes underneath them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheEvent {
  RootUpdated { hash: String, description: String },
  EntityUpdated { key: EntityKey },
  /// `None` means the whole store was cleared.
  Evicted { hash: Option<String> },
}

/// Orchestrates cache reads, network fetches, and cache writes.
#[derive(Clone)]
pub struct FetchPolicyEngine {
  store: Arc<CacheStore>,
  events: broadcast::Sender<CacheEvent>,
}

impl FetchPolicyEngine {
  pub fn new(store: Arc<CacheStore>) -> Self {
    let (events, _) = broadcast::channel(64);
    Self { store, events }
  }

  pub fn store(&self) -> &Arc<CacheStore> {
    &self.store
  }

  pub fn subscribe(&self) -> broadcast::Receiver<CacheEvent> {
    self.events.subscribe()
  }

  /// Resolve a connection-shaped query root.
  ///
  /// `after` marks a "next page" request: it always goes to the network (the
  /// cached root holds the accumulated list, not the requested page) and is
  /// appended when the root accumulates and still ends at `after`.
  pub async fn resolve<T, K, F, Fut>(
    &self,
    key: &K,
    policy: FetchPolicy,
    after: Option<&str>,
    fetcher: F,
  ) -> Result<CacheResult<Connection<T>>>
  where
    T: Cacheable,
    K: QueryKey,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<Connection<T>>>> + Send + 'static,
  {
    let root = key.root_id();

    if let Some(after) = after {
      return self.fetch_root(&root, RootWrite::Append { after }, fetcher).await;
    }
    if policy == FetchPolicy::NetworkOnly {
      return self.fetch_root(&root, RootWrite::Replace, fetcher).await;
    }

    let Some(cached) = self.store.read_root::<T>(&root.hash, Utc::now())? else {
      tracing::debug!(query = %root.description, "Cache miss");
      return self.fetch_root(&root, RootWrite::Replace, fetcher).await;
    };

    if policy == FetchPolicy::CacheAndNetwork {
      tracing::debug!(query = %root.description, fresh = cached.fresh, "Serving cache, revalidating");
      self.revalidate_root(root, fetcher);
      return Ok(CacheResult::from_cache(
        cached.connection,
        cached.cached_at,
        !cached.fresh,
      ));
    }

    if cached.fresh {
      tracing::debug!(query = %root.description, "Cache hit");
      return Ok(CacheResult::from_cache(
        cached.connection,
        cached.cached_at,
        false,
      ));
    }

    match self.fetch_root(&root, RootWrite::Replace, fetcher).await {
      Ok(result) => Ok(result),
      Err(e) => {
        tracing::warn!(query = %root.description, error = %e, "Refetch failed, serving stale cache");
        Ok(CacheResult::offline(cached.connection, cached.cached_at))
      }
    }
  }

  async fn fetch_root<T, F, Fut>(
    &self,
    root: &RootId,
    mode: RootWrite<'_>,
    fetcher: F,
  ) -> Result<CacheResult<Connection<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<Connection<T>>>>,
  {
    let fetched = fetcher().await?;
    if !fetched.errors.is_empty() {
      tracing::warn!(
        query = %root.description,
        errors = fetched.errors.len(),
        "Partial data returned"
      );
    }
    self.store.write_root(root, &fetched.data, mode)?;
    let _ = self.events.send(CacheEvent::RootUpdated {
      hash: root.hash.clone(),
      description: root.description.clone(),
    });
    Ok(CacheResult::from_network(fetched))
  }

  fn revalidate_root<T, F, Fut>(&self, root: RootId, fetcher: F)
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<Connection<T>>>> + Send + 'static,
  {
    let store = Arc::clone(&self.store);
    let events = self.events.clone();
    let fut = fetcher();

    tokio::spawn(async move {
      let result = fut
        .await
        .and_then(|fetched| store.write_root(&root, &fetched.data, RootWrite::Revalidate));
      match result {
        Ok(()) => {
          let _ = events.send(CacheEvent::RootUpdated {
            hash: root.hash,
            description: root.description,
          });
        }
        Err(e) => {
          tracing::warn!(query = %root.description, error = %e, "Background revalidation failed");
        }
      }
    });
  }

  /// Resolve a single entity against its own record freshness. A `None`
  /// from the network (not found) is returned as-is and not cached.
  pub async fn resolve_entity<T, F, Fut>(
    &self,
    id: &str,
    policy: FetchPolicy,
    fetcher: F,
  ) -> Result<CacheResult<Option<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<Option<T>>>> + Send + 'static,
  {
    let cached = match policy {
      FetchPolicy::NetworkOnly => None,
      _ => self.store.read_cached::<T>(id, Utc::now())?,
    };

    let Some(cached) = cached else {
      return self.fetch_entity(fetcher).await;
    };

    match policy {
      FetchPolicy::CacheFirst if cached.fresh => Ok(CacheResult::from_cache(
        Some(cached.entity),
        cached.cached_at,
        false,
      )),
      FetchPolicy::CacheAndNetwork => {
        let store = Arc::clone(&self.store);
        let events = self.events.clone();
        let fut = fetcher();
        tokio::spawn(async move {
          match fut.await {
            Ok(Fetched { data: Some(entity), .. }) => match store.write(&entity) {
              Ok(()) => {
                let _ = events.send(CacheEvent::EntityUpdated {
                  key: entity.entity_key(),
                });
              }
              Err(e) => tracing::warn!(error = %e, "Failed to write revalidated entity"),
            },
            Ok(_) => {}
            Err(e) => tracing::warn!(error = %e, "Background revalidation failed"),
          }
        });
        Ok(CacheResult::from_cache(
          Some(cached.entity),
          cached.cached_at,
          !cached.fresh,
        ))
      }
      _ => match self.fetch_entity(fetcher).await {
        Ok(result) => Ok(result),
        Err(e) => {
          tracing::warn!(entity = id, error = %e, "Refetch failed, serving stale cache");
          Ok(CacheResult::offline(Some(cached.entity), cached.cached_at))
        }
      },
    }
  }

  async fn fetch_entity<T, F, Fut>(&self, fetcher: F) -> Result<CacheResult<Option<T>>>
  where
    T: Cacheable,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<Fetched<Option<T>>>>,
  {
    let fetched = fetcher().await?;
    if let Some(entity) = &fetched.data {
      self.store.write(entity)?;
      let _ = self.events.send(CacheEvent::EntityUpdated {
        key: entity.entity_key(),
      });
    }
    Ok(CacheResult::from_network(fetched))
  }

  /// Drop one cached root.
  pub fn evict<K: QueryKey>(&self, key: &K) -> Result<()> {
    let hash = key.cache_hash();
    if self.store.evict_root(&hash)? {
      let _ = self.events.send(CacheEvent::Evicted { hash: Some(hash) });
    }
    Ok(())
  }

  /// Drop everything.
  pub fn evict_all(&self) -> Result<()> {
    self.store.evict_all()?;
    let _ = self.events.send(CacheEvent::Evicted { hash: None });
    Ok(())
  }
}
