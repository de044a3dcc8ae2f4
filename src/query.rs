//! Async query state for independently loading page sections.
//!
//! A `Query<T>` is a shared cell holding the state of one fetch: idle,
//! loading, loaded, or failed. Clones share the cell, so a section can be
//! loaded on one task and rendered from another.
//!
//! # Example
//!
//! ```ignore
//! let featured = Query::new();
//! let client = cms.clone();
//! featured.run(async move { client.featured_posts(FetchPolicy::CacheFirst).await }).await;
//!
//! match featured.state() {
//!     QueryState::Loading => render_spinner(),
//!     QueryState::Success(posts) => render_posts(&posts),
//!     QueryState::Error(e) => render_error(&e),
//!     QueryState::Idle => {}
//! }
//! ```

use chrono::{DateTime, Utc};
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::cache::{CacheResult, CacheSource};
use crate::error::Result;

/// The state of a query
#[derive(Debug, Clone, PartialEq)]
pub enum QueryState<T> {
  /// Query has not been started
  Idle,
  /// Query is currently fetching data
  Loading,
  /// Query completed successfully
  Success(T),
  /// Query failed with an error
  Error(String),
}

impl<T> QueryState<T> {
  pub fn is_loading(&self) -> bool {
    matches!(self, QueryState::Loading)
  }

  pub fn is_success(&self) -> bool {
    matches!(self, QueryState::Success(_))
  }

  pub fn is_error(&self) -> bool {
    matches!(self, QueryState::Error(_))
  }

  pub fn data(&self) -> Option<&T> {
    match self {
      QueryState::Success(data) => Some(data),
      _ => None,
    }
  }

  pub fn error(&self) -> Option<&str> {
    match self {
      QueryState::Error(e) => Some(e),
      _ => None,
    }
  }
}

#[derive(Debug)]
struct Slot<T> {
  state: QueryState<T>,
  generation: u64,
  source: Option<CacheSource>,
  fetched_at: Option<DateTime<Utc>>,
}

/// Shared, generation-stamped query cell.
#[derive(Debug)]
pub struct Query<T> {
  slot: Arc<Mutex<Slot<T>>>,
}

impl<T> Clone for Query<T> {
  fn clone(&self) -> Self {
    Self {
      slot: Arc::clone(&self.slot),
    }
  }
}

impl<T> Default for Query<T> {
  fn default() -> Self {
    Self::new()
  }
}

impl<T> Query<T> {
  pub fn new() -> Self {
    Self {
      slot: Arc::new(Mutex::new(Slot {
        state: QueryState::Idle,
        generation: 0,
        source: None,
        fetched_at: None,
      })),
    }
  }

  // State is plain data, so a panic elsewhere can't leave it half-written.
  fn lock(&self) -> MutexGuard<'_, Slot<T>> {
    self.slot.lock().unwrap_or_else(|e| e.into_inner())
  }

  pub fn is_loading(&self) -> bool {
    self.lock().state.is_loading()
  }

  pub fn is_success(&self) -> bool {
    self.lock().state.is_success()
  }

  pub fn error(&self) -> Option<String> {
    self.lock().state.error().map(str::to_string)
  }

  /// Where the last successful result came from.
  pub fn source(&self) -> Option<CacheSource> {
    self.lock().source
  }

  pub fn fetched_at(&self) -> Option<DateTime<Utc>> {
    self.lock().fetched_at
  }

  /// Back to `Idle`. A fetch still in flight is discarded when it resolves.
  pub fn reset(&self) {
    let mut slot = self.lock();
    slot.generation += 1;
    slot.state = QueryState::Idle;
    slot.source = None;
    slot.fetched_at = None;
  }

  /// Drive `fetch` to completion and record its outcome.
  ///
  /// Returns `false` when a newer `run` or `reset` superseded this one.
  pub async fn run<Fut>(&self, fetch: Fut) -> bool
  where
    Fut: Future<Output = Result<CacheResult<T>>>,
  {
    let generation = {
      let mut slot = self.lock();
      slot.generation += 1;
      slot.state = QueryState::Loading;
      slot.generation
    };

    let result = fetch.await;

    let mut slot = self.lock();
    if slot.generation != generation {
      return false;
    }
    match result {
      Ok(result) => {
        slot.state = QueryState::Success(result.data);
        slot.source = Some(result.source);
        slot.fetched_at = Some(result.cached_at.unwrap_or_else(Utc::now));
      }
      Err(e) => {
        slot.state = QueryState::Error(e.to_string());
      }
    }
    true
  }
}

impl<T: Clone> Query<T> {
  /// Snapshot of the current state.
  pub fn state(&self) -> QueryState<T> {
    self.lock().state.clone()
  }

  pub fn data(&self) -> Option<T> {
    self.lock().state.data().cloned()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::Fetched;
  use crate::error::Error;
  use std::time::Duration;

  fn ok<T>(data: T) -> Result<CacheResult<T>> {
    Ok(CacheResult::from_network(Fetched::new(data)))
  }

  #[tokio::test]
  async fn test_query_success() {
    let query = Query::new();
    assert_eq!(query.state(), QueryState::Idle);

    assert!(query.run(async { ok(vec![1, 2, 3]) }).await);

    assert!(query.is_success());
    assert_eq!(query.data(), Some(vec![1, 2, 3]));
    assert_eq!(query.source(), Some(CacheSource::Network));
    assert!(query.fetched_at().is_some());
  }

  #[tokio::test]
  async fn test_query_error() {
    let query: Query<i32> = Query::new();

    query
      .run(async { Err(Error::Validation("Something went wrong".to_string())) })
      .await;

    assert!(query.state().is_error());
    assert!(query.error().unwrap().contains("Something went wrong"));
  }

  #[tokio::test]
  async fn test_loading_is_visible_to_clones() {
    let query = Query::new();
    let handle = {
      let query = query.clone();
      tokio::spawn(async move {
        query
          .run(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ok(42)
          })
          .await
      })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert!(query.is_loading());

    assert!(handle.await.unwrap());
    assert_eq!(query.data(), Some(42));
  }

  #[tokio::test]
  async fn test_reset_discards_pending() {
    let query = Query::new();
    let handle = {
      let query = query.clone();
      tokio::spawn(async move {
        query
          .run(async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            ok(1)
          })
          .await
      })
    };

    tokio::time::sleep(Duration::from_millis(10)).await;
    query.reset();

    assert!(!handle.await.unwrap());
    assert_eq!(query.state(), QueryState::Idle);
  }
}
