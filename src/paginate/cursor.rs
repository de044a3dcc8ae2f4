//! Cursor-based pagination for infinite-scroll feeds.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;

use crate::cache::{Cacheable, Connection, FetchPolicy, QueryKey};
use crate::cms::{Article, CachedCmsClient, CmsQueryKey, FeedScope};
use crate::error::{Error, Result};

/// Page size used when none is configured.
pub const DEFAULT_PAGE_SIZE: u32 = 7;

/// Lifecycle of a paginated view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaginatorStatus {
  Empty,
  Loading,
  Loaded,
  LoadingMore,
  /// Everything the server has was loaded
  Exhausted,
  Error,
}

impl PaginatorStatus {
  pub fn is_loading(self) -> bool {
    matches!(self, PaginatorStatus::Loading | PaginatorStatus::LoadingMore)
  }
}

/// What a load call ended up doing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
  /// The page was applied; `added` new items after dedup
  Applied { added: usize },
  /// The call was a no-op (already loading, nothing more, or no cursor)
  Skipped,
  /// The result arrived after a reset and was dropped
  Discarded,
}

/// Snapshot handed to the rendering layer.
#[derive(Debug, Clone)]
pub struct FeedView {
  pub items: Vec<Article>,
  pub status: PaginatorStatus,
  pub loading: bool,
  pub error: Option<String>,
  pub has_more: bool,
  pub total_count: u64,
}

/// Client-held view state. Items are identity keys into the cache store.
#[derive(Debug)]
struct ViewState {
  scope: FeedScope,
  status: PaginatorStatus,
  keys: Vec<String>,
  seen: HashSet<String>,
  end_cursor: Option<String>,
  has_more: bool,
  total_count: u64,
  error: Option<String>,
  generation: u64,
}

impl ViewState {
  fn new(scope: FeedScope) -> Self {
    Self {
      scope,
      status: PaginatorStatus::Empty,
      keys: Vec::new(),
      seen: HashSet::new(),
      end_cursor: None,
      has_more: false,
      total_count: 0,
      error: None,
      generation: 0,
    }
  }

  fn clear(&mut self) {
    self.status = PaginatorStatus::Empty;
    self.keys.clear();
    self.seen.clear();
    self.end_cursor = None;
    self.has_more = false;
    self.total_count = 0;
    self.error = None;
  }

  /// Append nodes in server order, skipping identities already present.
  fn append(&mut self, page: &Connection<Article>) -> usize {
    let before = self.keys.len();
    for node in page.nodes() {
      let key = node.cache_key();
      if self.seen.insert(key.clone()) {
        self.keys.push(key);
      }
    }
    self.keys.len() - before
  }

  /// Replace the accumulated items with `page`.
  fn replace(&mut self, page: &Connection<Article>) -> usize {
    self.keys.clear();
    self.seen.clear();
    self.end_cursor = None;
    let added = self.append(page);
    self.apply_page_info(page);
    added
  }

  fn apply_page_info(&mut self, page: &Connection<Article>) {
    // An empty page keeps the previous cursor so a retry can resume.
    if page.page_info.end_cursor.is_some() {
      self.end_cursor = page.page_info.end_cursor.clone();
    }
    self.has_more = page.page_info.has_next_page;
    self.total_count = page.total_count;
    self.status = if self.has_more {
      PaginatorStatus::Loaded
    } else {
      PaginatorStatus::Exhausted
    };
    self.error = None;
  }
}

/// Cursor paginator for one view (homepage feed, category page, tag page).
///
/// Cloning yields another handle to the same view, so a load can run on a
/// spawned task while the owner keeps reading state.
#[derive(Clone)]
pub struct CursorPaginator {
  client: CachedCmsClient,
  state: Arc<Mutex<ViewState>>,
  page_size: u32,
  policy: FetchPolicy,
}

impl CursorPaginator {
  pub fn new(client: CachedCmsClient, scope: FeedScope) -> Self {
    Self {
      client,
      state: Arc::new(Mutex::new(ViewState::new(scope))),
      page_size: DEFAULT_PAGE_SIZE,
      policy: FetchPolicy::CacheFirst,
    }
  }

  pub fn with_page_size(mut self, page_size: u32) -> Self {
    self.page_size = page_size;
    self
  }

  /// Policy for the first page. Continuation pages always use the network.
  pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
    self.policy = policy;
    self
  }

  fn lock(&self) -> Result<MutexGuard<'_, ViewState>> {
    self
      .state
      .lock()
      .map_err(|e| Error::Cache(format!("Lock poisoned: {}", e)))
  }

  /// Fetch the first page and replace whatever was accumulated.
  ///
  /// A newer `load_initial` or a `reset` supersedes this call; its result is
  /// then discarded.
  pub async fn load_initial(&self) -> Result<LoadOutcome> {
    let (scope, generation) = {
      let mut state = self.lock()?;
      state.generation += 1;
      state.status = PaginatorStatus::Loading;
      state.error = None;
      (state.scope.clone(), state.generation)
    };

    let result = self
      .client
      .feed_first_page(&scope, self.page_size, self.policy)
      .await;

    let mut state = self.lock()?;
    if state.generation != generation {
      tracing::debug!(?scope, "Discarding superseded initial page");
      return Ok(LoadOutcome::Discarded);
    }

    match result {
      Ok(page) => {
        if page.is_partial() {
          tracing::warn!(?scope, errors = page.errors.len(), "Feed loaded with partial errors");
        }
        let added = state.replace(&page.data);
        tracing::debug!(?scope, added, has_more = state.has_more, "Loaded initial page");
        Ok(LoadOutcome::Applied { added })
      }
      Err(e) => {
        state.status = PaginatorStatus::Error;
        state.error = Some(e.to_string());
        Err(e)
      }
    }
  }

  /// Fetch the page after the current cursor and append it.
  ///
  /// No-op while another load is in flight, when the feed is exhausted, or
  /// before any cursor is known. On failure the accumulated items stay.
  pub async fn load_more(&self, first: Option<u32>) -> Result<LoadOutcome> {
    let first = first.unwrap_or(self.page_size);
    if self.policy == FetchPolicy::CacheAndNetwork {
      self.sync_with_cache()?;
    }

    let (scope, cursor, generation, previous) = {
      let mut state = self.lock()?;
      if state.status.is_loading() || !state.has_more {
        return Ok(LoadOutcome::Skipped);
      }
      let Some(cursor) = state.end_cursor.clone() else {
        return Ok(LoadOutcome::Skipped);
      };
      let previous = state.status;
      state.status = PaginatorStatus::LoadingMore;
      (state.scope.clone(), cursor, state.generation, previous)
    };

    let result = self.client.feed_next_page(&scope, first, &cursor).await;

    let mut state = self.lock()?;
    if state.generation != generation {
      tracing::debug!(?scope, "Discarding page that resolved after reset");
      return Ok(LoadOutcome::Discarded);
    }

    match result {
      Ok(page) => {
        let added = state.append(&page.data);
        state.apply_page_info(&page.data);
        tracing::debug!(?scope, added, has_more = state.has_more, "Appended page");
        Ok(LoadOutcome::Applied { added })
      }
      Err(Error::Validation(msg)) => {
        // Bad arguments are a caller bug; the view itself is unchanged.
        state.status = previous;
        Err(Error::Validation(msg))
      }
      Err(e) => {
        state.status = PaginatorStatus::Error;
        state.error = Some(e.to_string());
        Err(e)
      }
    }
  }

  /// Adopt the cached feed root when it no longer matches the view, as after
  /// a background revalidation found a changed first page. Only settled
  /// views are touched. Returns whether the view changed.
  pub fn sync_with_cache(&self) -> Result<bool> {
    let mut state = self.lock()?;
    if !matches!(state.status, PaginatorStatus::Loaded | PaginatorStatus::Exhausted) {
      return Ok(false);
    }
    let hash = CmsQueryKey::Feed {
      scope: state.scope.clone(),
    }
    .cache_hash();
    let Some(cached) = self
      .client
      .engine()
      .store()
      .read_root::<Article>(&hash, Utc::now())?
    else {
      return Ok(false);
    };

    let keys: Vec<String> = cached.connection.nodes().map(|a| a.cache_key()).collect();
    if keys == state.keys {
      return Ok(false);
    }
    state.replace(&cached.connection);
    tracing::debug!(scope = ?state.scope, items = state.keys.len(), "View synced with cached root");
    Ok(true)
  }

  /// Clear back to `Empty`. In-flight loads are discarded when they resolve.
  pub fn reset(&self) -> Result<()> {
    let mut state = self.lock()?;
    state.generation += 1;
    state.clear();
    Ok(())
  }

  /// Switch to another scope (e.g., a different category) and reset.
  pub fn set_scope(&self, scope: FeedScope) -> Result<()> {
    let mut state = self.lock()?;
    state.generation += 1;
    state.clear();
    state.scope = scope;
    Ok(())
  }

  /// Drop the cached root for this view and reload from the network.
  pub async fn refresh(&self) -> Result<LoadOutcome> {
    let scope = self.scope()?;
    self.reset()?;
    self.client.evict(&[CmsQueryKey::Feed { scope }])?;
    self.load_initial().await
  }

  pub fn scope(&self) -> Result<FeedScope> {
    Ok(self.lock()?.scope.clone())
  }

  pub fn status(&self) -> Result<PaginatorStatus> {
    Ok(self.lock()?.status)
  }

  pub fn has_more(&self) -> Result<bool> {
    Ok(self.lock()?.has_more)
  }

  pub fn total_count(&self) -> Result<u64> {
    Ok(self.lock()?.total_count)
  }

  pub fn error(&self) -> Result<Option<String>> {
    Ok(self.lock()?.error.clone())
  }

  pub fn len(&self) -> Result<usize> {
    Ok(self.lock()?.keys.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Hydrate the accumulated items from the cache store, in order. Items
  /// evicted from the store since they were loaded are skipped.
  pub fn items(&self) -> Result<Vec<Article>> {
    let keys = self.lock()?.keys.clone();
    let store = self.client.engine().store();
    let mut items = Vec::with_capacity(keys.len());
    for key in &keys {
      if let Some(article) = store.read::<Article>(key)? {
        items.push(article);
      }
    }
    Ok(items)
  }

  /// Snapshot for rendering. Cache-and-network views first pick up any
  /// revalidated root.
  pub fn view(&self) -> Result<FeedView> {
    if self.policy == FetchPolicy::CacheAndNetwork {
      self.sync_with_cache()?;
    }
    let items = self.items()?;
    let state = self.lock()?;
    Ok(FeedView {
      items,
      status: state.status,
      loading: state.status.is_loading(),
      error: state.error.clone(),
      has_more: state.has_more,
      total_count: state.total_count,
    })
  }
}
