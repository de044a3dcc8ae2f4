//! Caching implementations for CMS types.

use chrono::Duration;
use sha2::{Digest, Sha256};

use crate::cache::{Cacheable, Normalized, QueryKey, StoreConfig};
use crate::error::Result;

use super::types::{Article, Author, Category, MediaAsset};

// ============================================================================
// Cacheable implementations
// ============================================================================

impl Cacheable for Article {
  fn cache_key(&self) -> String {
    self.slug.clone()
  }

  fn entity_type() -> &'static str {
    "Article"
  }

  fn default_max_age() -> Duration {
    Duration::hours(6)
  }

  fn normalize(&self) -> Result<Vec<Normalized>> {
    let mut records = vec![Normalized::of(self)?];
    for category in &self.categories {
      records.extend(category.normalize()?);
    }
    if let Some(author) = &self.author {
      records.extend(author.normalize()?);
    }
    if let Some(cover) = &self.cover_image {
      records.extend(cover.normalize()?);
    }
    Ok(records)
  }
}

impl Cacheable for Category {
  fn cache_key(&self) -> String {
    self.slug.clone()
  }

  fn entity_type() -> &'static str {
    "Category"
  }

  fn default_max_age() -> Duration {
    Duration::hours(24)
  }
}

impl Cacheable for Author {
  fn cache_key(&self) -> String {
    format!("{}:{}", self.id, self.name)
  }

  fn entity_type() -> &'static str {
    "Author"
  }

  fn default_max_age() -> Duration {
    Duration::hours(48)
  }

  fn normalize(&self) -> Result<Vec<Normalized>> {
    let mut records = vec![Normalized::of(self)?];
    if let Some(avatar) = &self.avatar {
      records.extend(avatar.normalize()?);
    }
    Ok(records)
  }
}

impl Cacheable for MediaAsset {
  fn cache_key(&self) -> String {
    self.url.clone()
  }

  fn entity_type() -> &'static str {
    "MediaAsset"
  }

  fn default_max_age() -> Duration {
    Duration::hours(48)
  }
}

/// Register the default max age of every CMS entity type.
pub fn with_cms_entities(config: StoreConfig) -> StoreConfig {
  config
    .with_entity::<Article>()
    .with_entity::<Category>()
    .with_entity::<Author>()
    .with_entity::<MediaAsset>()
}

// ============================================================================
// Query key types
// ============================================================================

/// Which slice of posts a cursor-paginated view is showing.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FeedScope {
  All,
  Category(String),
  Tag(String),
}

/// Query key types for CMS operations. Cursor arguments are deliberately
/// absent: every page of a feed belongs to the same root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CmsQueryKey {
  /// Cursor-paginated feed for a scope
  Feed { scope: FeedScope },
  /// One numbered page of the offset listing
  PostsOffset { first: u32, skip: u32 },
  TotalPostsCount,
  FeaturedPosts,
  RecentPosts,
  Categories,
}

impl QueryKey for CmsQueryKey {
  fn cache_hash(&self) -> String {
    let input = match self {
      Self::Feed { scope } => match scope {
        FeedScope::All => "feed:all".to_string(),
        FeedScope::Category(slug) => format!("feed:category:{}", normalize_slug(slug)),
        FeedScope::Tag(tag) => format!("feed:tag:{}", normalize_slug(tag)),
      },
      Self::PostsOffset { first, skip } => format!("posts_offset:{}:{}", first, skip),
      Self::TotalPostsCount => "posts_count".to_string(),
      Self::FeaturedPosts => "featured_posts".to_string(),
      Self::RecentPosts => "recent_posts".to_string(),
      Self::Categories => "categories".to_string(),
    };

    // SHA256 hash for stable, fixed-length keys
    let mut hasher = Sha256::new();
    hasher.update(input.as_bytes());
    let result = hasher.finalize();
    hex::encode(result)
  }

  fn description(&self) -> String {
    match self {
      Self::Feed { scope } => match scope {
        FeedScope::All => "all posts".to_string(),
        FeedScope::Category(slug) => format!("posts in category {}", slug),
        FeedScope::Tag(tag) => format!("posts tagged {}", tag),
      },
      Self::PostsOffset { first, skip } => format!("{} posts from offset {}", first, skip),
      Self::TotalPostsCount => "total post count".to_string(),
      Self::FeaturedPosts => "featured posts".to_string(),
      Self::RecentPosts => "recent posts".to_string(),
      Self::Categories => "categories".to_string(),
    }
  }

  fn root_name(&self) -> &'static str {
    match self {
      Self::Feed { .. } | Self::PostsOffset { .. } | Self::TotalPostsCount => "postsConnection",
      Self::FeaturedPosts | Self::RecentPosts => "posts",
      Self::Categories => "categories",
    }
  }
}

/// Normalize slugs for consistent hashing.
fn normalize_slug(slug: &str) -> String {
  slug.trim().to_lowercase()
}
