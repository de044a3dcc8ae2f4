use serde::de::DeserializeOwned;
use std::sync::Arc;

use crate::cache::{Connection, Fetched};
use crate::error::{Error, Result};
use crate::transport::{GraphqlRequest, Transport};

use super::api_types::{
  decode, ApiCategoriesData, ApiPostData, ApiPostsConnectionData, ApiPostsCountData,
  ApiPostsData,
};
use super::cache::FeedScope;
use super::queries;
use super::types::{Article, Category};

/// Largest page size the CMS accepts.
pub const MAX_PAGE_SIZE: u32 = 50;

/// Reject page sizes outside `[1, MAX_PAGE_SIZE]` before any network call.
pub fn validate_page_size(first: u32) -> Result<()> {
  if (1..=MAX_PAGE_SIZE).contains(&first) {
    Ok(())
  } else {
    Err(Error::Validation(format!(
      "page size {} is outside 1..={}",
      first, MAX_PAGE_SIZE
    )))
  }
}

/// Typed GraphQL client for the CMS content API.
#[derive(Clone)]
pub struct CmsClient {
  transport: Arc<dyn Transport>,
}

impl CmsClient {
  pub fn new(transport: Arc<dyn Transport>) -> Self {
    Self { transport }
  }

  /// Execute a request and decode its `data`. GraphQL errors that came with
  /// usable data are returned alongside it.
  async fn run<T: DeserializeOwned>(&self, request: GraphqlRequest) -> Result<Fetched<T>> {
    let response = self.transport.execute(&request).await?.into_result()?;
    let errors = response.errors;
    let data = response.data.unwrap_or_default();

    match decode::<T>(request.operation_name, data.clone()) {
      Ok(data) => Ok(Fetched { data, errors }),
      // Partial data that doesn't even decode is surfaced with its errors.
      Err(_) if !errors.is_empty() => Err(Error::PartialData {
        errors,
        data: Some(data),
      }),
      Err(e) => Err(e),
    }
  }

  /// Fetch one page of a cursor-paginated feed.
  pub async fn feed_page(
    &self,
    scope: &FeedScope,
    first: u32,
    after: Option<&str>,
  ) -> Result<Fetched<Connection<Article>>> {
    validate_page_size(first)?;

    let request = match scope {
      FeedScope::All => GraphqlRequest::new("GetPostsPaginated", queries::GET_POSTS_PAGINATED),
      FeedScope::Category(slug) => GraphqlRequest::new(
        "GetCategoryPostsPaginated",
        queries::GET_CATEGORY_POSTS_PAGINATED,
      )
      .var("slug", slug.as_str()),
      FeedScope::Tag(tag) => {
        GraphqlRequest::new("GetTagPostsPaginated", queries::GET_TAG_POSTS_PAGINATED)
          .var("tag", tag.as_str())
      }
    }
    .var("first", first)
    .var("after", after);

    let fetched: Fetched<ApiPostsConnectionData> = self.run(request).await?;
    Ok(Fetched {
      data: fetched.data.posts_connection.into(),
      errors: fetched.errors,
    })
  }

  /// Fetch `first` posts starting at `skip`.
  pub async fn posts_with_offset(
    &self,
    first: u32,
    skip: u32,
  ) -> Result<Fetched<Connection<Article>>> {
    validate_page_size(first)?;

    let request = GraphqlRequest::new("GetPostsWithOffset", queries::GET_POSTS_WITH_OFFSET)
      .var("first", first)
      .var("skip", skip);

    let fetched: Fetched<ApiPostsConnectionData> = self.run(request).await?;
    Ok(Fetched {
      data: fetched.data.posts_connection.into(),
      errors: fetched.errors,
    })
  }

  /// Total number of published posts, as a count-only connection.
  pub async fn total_posts_count(&self) -> Result<Fetched<Connection<Article>>> {
    let request = GraphqlRequest::new("GetTotalPostsCount", queries::GET_TOTAL_POSTS_COUNT);
    let fetched: Fetched<ApiPostsCountData> = self.run(request).await?;
    Ok(Fetched {
      data: Connection::count_only(fetched.data.posts_connection.aggregate.count),
      errors: fetched.errors,
    })
  }

  pub async fn featured_posts(&self, first: u32) -> Result<Fetched<Connection<Article>>> {
    validate_page_size(first)?;
    let request =
      GraphqlRequest::new("GetFeaturedPosts", queries::GET_FEATURED_POSTS).var("first", first);
    self.posts_list(request).await
  }

  pub async fn recent_posts(&self, first: u32) -> Result<Fetched<Connection<Article>>> {
    validate_page_size(first)?;
    let request =
      GraphqlRequest::new("GetRecentPosts", queries::GET_RECENT_POSTS).var("first", first);
    self.posts_list(request).await
  }

  async fn posts_list(&self, request: GraphqlRequest) -> Result<Fetched<Connection<Article>>> {
    let fetched: Fetched<ApiPostsData> = self.run(request).await?;
    Ok(Fetched {
      data: Connection::from_nodes(fetched.data.posts),
      errors: fetched.errors,
    })
  }

  pub async fn categories(&self) -> Result<Fetched<Connection<Category>>> {
    let request = GraphqlRequest::new("GetCategories", queries::GET_CATEGORIES);
    let fetched: Fetched<ApiCategoriesData> = self.run(request).await?;
    Ok(Fetched {
      data: Connection::from_nodes(fetched.data.categories),
      errors: fetched.errors,
    })
  }

  /// Fetch a single article. `None` means the CMS has no post with that slug.
  pub async fn post_by_slug(&self, slug: &str) -> Result<Fetched<Option<Article>>> {
    let request =
      GraphqlRequest::new("GetPostBySlug", queries::GET_POST_BY_SLUG).var("slug", slug);
    let fetched: Fetched<ApiPostData> = self.run(request).await?;
    Ok(Fetched {
      data: fetched.data.post,
      errors: fetched.errors,
    })
  }
}
