//! Page-number pagination for archive listings.

use crate::cache::FetchPolicy;
use crate::cms::{validate_page_size, Article, CachedCmsClient};
use crate::error::{Error, Result};

/// Items per page used when none is configured.
pub const DEFAULT_PER_PAGE: u32 = 10;

/// Where the caller should send the reader instead of rendering a page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageRedirect {
  /// The canonical root listing
  Root,
  /// The last valid numbered page
  Page(u32),
}

/// One rendered page of the offset listing.
#[derive(Debug, Clone)]
pub struct OffsetPage {
  pub items: Vec<Article>,
  pub total_count: u64,
  pub total_pages: u32,
  pub current_page: u32,
  pub has_next_page: bool,
  pub has_prev_page: bool,
}

#[derive(Debug, Clone)]
pub enum PageOutcome {
  Page(OffsetPage),
  Redirect(PageRedirect),
}

impl PageOutcome {
  pub fn page(&self) -> Option<&OffsetPage> {
    match self {
      PageOutcome::Page(page) => Some(page),
      PageOutcome::Redirect(_) => None,
    }
  }

  pub fn redirect(&self) -> Option<PageRedirect> {
    match self {
      PageOutcome::Redirect(to) => Some(*to),
      PageOutcome::Page(_) => None,
    }
  }
}

/// `ceil(total / per_page)`, saturating at `u32::MAX`.
pub fn total_pages(total_count: u64, per_page: u32) -> u32 {
  let pages = total_count.div_ceil(u64::from(per_page.max(1)));
  u32::try_from(pages).unwrap_or(u32::MAX)
}

/// Decide whether `page` can be rendered or must redirect.
fn boundary(page: u32, total_pages: u32) -> Option<PageRedirect> {
  if page == 1 {
    return Some(PageRedirect::Root);
  }
  if total_pages == 0 {
    return Some(PageRedirect::Root);
  }
  if page > total_pages {
    return Some(if total_pages == 1 {
      PageRedirect::Root
    } else {
      PageRedirect::Page(total_pages)
    });
  }
  None
}

/// Offset paginator. Stateless apart from the client; each call is one page.
#[derive(Clone)]
pub struct OffsetPaginator {
  client: CachedCmsClient,
  policy: FetchPolicy,
}

impl OffsetPaginator {
  pub fn new(client: CachedCmsClient) -> Self {
    Self {
      client,
      policy: FetchPolicy::CacheFirst,
    }
  }

  pub fn with_policy(mut self, policy: FetchPolicy) -> Self {
    self.policy = policy;
    self
  }

  /// Fetch numbered page `page` (1-based). Page 1 and out-of-range pages come
  /// back as redirects without touching the listing query.
  pub async fn get_page(&self, page: u32, per_page: u32) -> Result<PageOutcome> {
    if page == 0 {
      return Err(Error::Validation("page numbers start at 1".to_string()));
    }
    validate_page_size(per_page)?;

    let total_count = self.client.total_posts_count(self.policy).await?.data;
    let pages = total_pages(total_count, per_page);
    if let Some(to) = boundary(page, pages) {
      tracing::debug!(page, total_pages = pages, ?to, "Redirecting offset page");
      return Ok(PageOutcome::Redirect(to));
    }

    let listing = self.fetch(page, per_page, total_count).await?;
    Ok(PageOutcome::Page(listing))
  }

  /// Content of the canonical root listing (the first page).
  pub async fn get_root(&self, per_page: u32) -> Result<OffsetPage> {
    validate_page_size(per_page)?;
    let total_count = self.client.total_posts_count(self.policy).await?.data;
    self.fetch(1, per_page, total_count).await
  }

  async fn fetch(&self, page: u32, per_page: u32, total_count: u64) -> Result<OffsetPage> {
    let skip = (page - 1).saturating_mul(per_page);
    let result = self
      .client
      .posts_with_offset(per_page, skip, self.policy)
      .await?;
    if result.is_partial() {
      tracing::warn!(page, errors = result.errors.len(), "Offset page loaded with partial errors");
    }

    // The listing's own aggregate is newer if it disagrees with the count query.
    let total_count = if result.data.total_count > 0 {
      result.data.total_count
    } else {
      total_count
    };
    let pages = total_pages(total_count, per_page);

    Ok(OffsetPage {
      items: result.data.into_nodes(),
      total_count,
      total_pages: pages,
      current_page: page,
      has_next_page: page < pages,
      has_prev_page: page > 1,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::{CacheStore, FetchPolicyEngine};
  use crate::cms::CmsClient;
  use crate::testing::FakeCms;
  use std::sync::Arc;

  fn paginator(cms: &Arc<FakeCms>) -> OffsetPaginator {
    let engine = FetchPolicyEngine::new(Arc::new(CacheStore::default()));
    OffsetPaginator::new(CachedCmsClient::new(CmsClient::new(cms.clone()), engine))
  }

  #[test]
  fn test_total_pages() {
    assert_eq!(total_pages(0, 10), 0);
    assert_eq!(total_pages(10, 10), 1);
    assert_eq!(total_pages(25, 10), 3);
    assert_eq!(total_pages(26, 5), 6);
  }

  #[tokio::test]
  async fn test_twenty_five_items() {
    let cms = FakeCms::with_articles(25);
    let offset = paginator(&cms);

    let first = offset.get_page(1, 10).await.unwrap();
    assert_eq!(first.redirect(), Some(PageRedirect::Root));

    let third = offset.get_page(3, 10).await.unwrap();
    let page = third.page().unwrap();
    let slugs: Vec<_> = page.items.iter().map(|a| a.slug.as_str()).collect();
    assert_eq!(slugs, vec!["post-21", "post-22", "post-23", "post-24", "post-25"]);
    assert_eq!(page.total_pages, 3);
    assert_eq!(page.current_page, 3);
    assert!(!page.has_next_page);
    assert!(page.has_prev_page);
  }

  #[tokio::test]
  async fn test_beyond_last_page_redirects() {
    let cms = FakeCms::with_articles(25);
    let offset = paginator(&cms);

    let outcome = offset.get_page(4, 10).await.unwrap();
    assert_eq!(outcome.redirect(), Some(PageRedirect::Page(3)));
    assert_eq!(cms.calls("GetPostsWithOffset"), 0);

    // With a single page the only valid target is the root.
    let outcome = offset.get_page(2, 50).await.unwrap();
    assert_eq!(outcome.redirect(), Some(PageRedirect::Root));
  }

  #[tokio::test]
  async fn test_empty_listing_redirects_to_root() {
    let cms = FakeCms::with_articles(0);
    let offset = paginator(&cms);

    let outcome = offset.get_page(2, 10).await.unwrap();
    assert_eq!(outcome.redirect(), Some(PageRedirect::Root));

    let root = offset.get_root(10).await.unwrap();
    assert!(root.items.is_empty());
    assert_eq!(root.total_pages, 0);
    assert!(!root.has_next_page);
  }

  #[tokio::test]
  async fn test_root_listing() {
    let cms = FakeCms::with_articles(25);
    let root = paginator(&cms).get_root(10).await.unwrap();

    assert_eq!(root.items.len(), 10);
    assert_eq!(root.items[0].slug, "post-1");
    assert_eq!(root.current_page, 1);
    assert!(root.has_next_page);
    assert!(!root.has_prev_page);
  }

  #[tokio::test]
  async fn test_invalid_arguments_fail_before_network() {
    let cms = FakeCms::with_articles(25);
    let offset = paginator(&cms);

    for (page, per_page) in [(0, 10), (2, 0), (2, 51)] {
      let err = offset.get_page(page, per_page).await.unwrap_err();
      assert!(matches!(err, Error::Validation(_)));
    }
    assert_eq!(cms.total_calls(), 0);
  }

  #[tokio::test]
  async fn test_pages_are_cached_per_offset() {
    let cms = FakeCms::with_articles(25);
    let offset = paginator(&cms);

    offset.get_page(2, 10).await.unwrap();
    offset.get_page(2, 10).await.unwrap();
    offset.get_page(3, 10).await.unwrap();

    assert_eq!(cms.calls("GetPostsWithOffset"), 2);
    assert_eq!(cms.calls("GetTotalPostsCount"), 1);
  }
}
