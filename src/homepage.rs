//! Homepage aggregation: four sections that load concurrently and fail
//! independently.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::cache::FetchPolicy;
use crate::cms::{Article, CachedCmsClient, Category, CmsQueryKey, FeedScope};
use crate::error::Result;
use crate::paginate::{CursorPaginator, LoadOutcome, PaginatorStatus};
use crate::query::{Query, QueryState};

/// One independently loading homepage section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Branch {
  MainPosts,
  Featured,
  Recent,
  Categories,
}

impl Branch {
  pub const ALL: [Branch; 4] = [
    Branch::MainPosts,
    Branch::Featured,
    Branch::Recent,
    Branch::Categories,
  ];
}

impl fmt::Display for Branch {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      Branch::MainPosts => "main posts",
      Branch::Featured => "featured posts",
      Branch::Recent => "recent posts",
      Branch::Categories => "categories",
    };
    f.write_str(name)
  }
}

#[derive(Debug, Clone, Default)]
pub struct HomepageData {
  pub main_posts: Vec<Article>,
  pub has_more_main_posts: bool,
  pub total_posts: u64,
  pub featured: Vec<Article>,
  pub recent: Vec<Article>,
  pub categories: Vec<Category>,
}

/// Everything a homepage renderer needs in one read.
#[derive(Debug, Clone)]
pub struct HomepageSnapshot {
  pub data: HomepageData,
  pub loading: BTreeSet<Branch>,
  pub errors: BTreeMap<Branch, String>,
  pub is_fully_loaded: bool,
  pub is_any_loading: bool,
}

/// Loads the homepage sections concurrently with all-settled semantics: a
/// failing section records its error and the others still render.
#[derive(Clone)]
pub struct HomepageAggregator {
  client: CachedCmsClient,
  main: CursorPaginator,
  featured: Query<Vec<Article>>,
  recent: Query<Vec<Article>>,
  categories: Query<Vec<Category>>,
}

impl HomepageAggregator {
  pub fn new(client: CachedCmsClient, page_size: u32) -> Self {
    let main = CursorPaginator::new(client.clone(), FeedScope::All)
      .with_page_size(page_size)
      .with_policy(FetchPolicy::CacheAndNetwork);

    Self {
      client,
      main,
      featured: Query::new(),
      recent: Query::new(),
      categories: Query::new(),
    }
  }

  pub fn main_feed(&self) -> &CursorPaginator {
    &self.main
  }

  /// Load all four sections and wait for every one of them to settle.
  pub async fn load(&self) -> HomepageSnapshot {
    let featured_client = self.client.clone();
    let recent_client = self.client.clone();
    let categories_client = self.client.clone();

    let (main, _, _, _) = futures::join!(
      self.main.load_initial(),
      self.featured.run(async move {
        featured_client.featured_posts(FetchPolicy::CacheFirst).await
      }),
      self.recent.run(async move { recent_client.recent_posts(FetchPolicy::CacheFirst).await }),
      self.categories.run(async move {
        categories_client.categories(FetchPolicy::CacheFirst).await
      }),
    );

    if let Err(e) = main {
      tracing::warn!(error = %e, "Main feed failed to load");
    }
    for (branch, error) in self.errors() {
      tracing::warn!(%branch, %error, "Homepage section failed");
    }

    self.get_state()
  }

  /// Drop every section and its cached root, then load again from scratch.
  pub async fn refresh(&self) -> Result<HomepageSnapshot> {
    self.main.reset()?;
    self.featured.reset();
    self.recent.reset();
    self.categories.reset();

    self.client.evict(&[
      CmsQueryKey::Feed {
        scope: FeedScope::All,
      },
      CmsQueryKey::FeaturedPosts,
      CmsQueryKey::RecentPosts,
      CmsQueryKey::Categories,
    ])?;

    Ok(self.load().await)
  }

  pub async fn load_more_main_posts(&self) -> Result<LoadOutcome> {
    self.main.load_more(None).await
  }

  /// The page-level error: the main feed failed and there is nothing to show.
  pub fn page_error(&self) -> Option<String> {
    let status = self.main.status().ok()?;
    let empty = self.main.is_empty().ok()?;
    if status == PaginatorStatus::Error && empty {
      self.main.error().ok().flatten()
    } else {
      None
    }
  }

  fn errors(&self) -> BTreeMap<Branch, String> {
    let mut errors = BTreeMap::new();
    if let Ok(Some(e)) = self.main.error() {
      errors.insert(Branch::MainPosts, e);
    }
    if let Some(e) = self.featured.error() {
      errors.insert(Branch::Featured, e);
    }
    if let Some(e) = self.recent.error() {
      errors.insert(Branch::Recent, e);
    }
    if let Some(e) = self.categories.error() {
      errors.insert(Branch::Categories, e);
    }
    errors
  }

  pub fn get_state(&self) -> HomepageSnapshot {
    let mut data = HomepageData::default();
    let mut loading = BTreeSet::new();
    let mut loaded = BTreeSet::new();
    let mut errors = BTreeMap::new();

    match self.main.view() {
      Ok(view) => {
        if view.loading {
          loading.insert(Branch::MainPosts);
        }
        if matches!(view.status, PaginatorStatus::Loaded | PaginatorStatus::Exhausted) {
          loaded.insert(Branch::MainPosts);
        }
        if let Some(e) = view.error {
          errors.insert(Branch::MainPosts, e);
        }
        data.main_posts = view.items;
        data.has_more_main_posts = view.has_more;
        data.total_posts = view.total_count;
      }
      Err(e) => {
        errors.insert(Branch::MainPosts, e.to_string());
      }
    }

    let mut settle = |branch: Branch, state: QueryState<()>| match state {
      QueryState::Loading => {
        loading.insert(branch);
      }
      QueryState::Success(()) => {
        loaded.insert(branch);
      }
      QueryState::Error(e) => {
        errors.insert(branch, e);
      }
      QueryState::Idle => {}
    };

    let featured = self.featured.state();
    let recent = self.recent.state();
    let categories = self.categories.state();
    settle(Branch::Featured, unit(&featured));
    settle(Branch::Recent, unit(&recent));
    settle(Branch::Categories, unit(&categories));

    data.featured = featured.data().cloned().unwrap_or_default();
    data.recent = recent.data().cloned().unwrap_or_default();
    data.categories = categories.data().cloned().unwrap_or_default();

    HomepageSnapshot {
      data,
      is_fully_loaded: Branch::ALL.iter().all(|b| loaded.contains(b)),
      is_any_loading: !loading.is_empty(),
      loading,
      errors,
    }
  }
}

/// The state without its payload.
fn unit<T>(state: &QueryState<T>) -> QueryState<()> {
  match state {
    QueryState::Idle => QueryState::Idle,
    QueryState::Loading => QueryState::Loading,
    QueryState::Success(_) => QueryState::Success(()),
    QueryState::Error(e) => QueryState::Error(e.clone()),
  }
}
