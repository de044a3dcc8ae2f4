//! In-crate fake CMS used by unit tests.
//!
//! Serves the same operations as the real content API from a fixture list,
//! counts calls per operation, and can inject failures or delays.

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::cms::types::{Article, Author, Category, MediaAsset};
use crate::error::{Error, Result};
use crate::transport::{GraphqlRequest, GraphqlResponse, Transport};

/// Fixture article `i`. Higher `i` means older, so `1..=n` is newest-first.
pub fn article(i: u32) -> Article {
  let base = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
  let published_at = base - ChronoDuration::hours(i as i64);
  let parity = if i % 2 == 0 { "even" } else { "odd" };

  Article {
    slug: format!("post-{}", i),
    title: format!("Post {}", i),
    excerpt: Some(format!("Excerpt for post {}", i)),
    published_at,
    created_at: published_at - ChronoDuration::minutes(5),
    updated_at: None,
    featured: i % 4 == 0,
    tags: vec![format!("tag-{}", i % 3)],
    categories: vec![Category {
      slug: parity.to_string(),
      name: parity.to_uppercase(),
      description: None,
    }],
    author: Some(Author {
      id: "author-1".to_string(),
      name: "Ada".to_string(),
      avatar: Some(MediaAsset {
        url: "https://media.example/avatars/ada.png".to_string(),
        width: Some(64),
        height: Some(64),
        alt: None,
      }),
    }),
    cover_image: Some(MediaAsset {
      url: format!("https://media.example/covers/{}.jpg", i),
      width: Some(1200),
      height: Some(630),
      alt: Some(format!("Cover {}", i)),
    }),
  }
}

struct Failure {
  error: Error,
  /// `None` fails forever
  remaining: Option<u32>,
}

#[derive(Default)]
pub struct FakeCms {
  articles: Mutex<Vec<Article>>,
  calls: Mutex<HashMap<String, u32>>,
  failures: Mutex<HashMap<String, Failure>>,
  overrides: Mutex<HashMap<String, Value>>,
  delay: Mutex<Option<Duration>>,
  first_page_delay: Mutex<Option<Duration>>,
}

impl FakeCms {
  pub fn with_articles(n: u32) -> Arc<Self> {
    let cms = Self::default();
    *cms.articles.lock().unwrap() = (1..=n).map(article).collect();
    Arc::new(cms)
  }

  /// Publish a new article at the head of every listing.
  pub fn insert_front(&self, article: Article) {
    self.articles.lock().unwrap().insert(0, article);
  }

  pub fn fail_next(&self, operation: &str, times: u32, error: Error) {
    self.failures.lock().unwrap().insert(
      operation.to_string(),
      Failure {
        error,
        remaining: Some(times),
      },
    );
  }

  pub fn fail_always(&self, operation: &str, error: Error) {
    self.failures.lock().unwrap().insert(
      operation.to_string(),
      Failure {
        error,
        remaining: None,
      },
    );
  }

  /// Answer `operation` with a fixed `data` payload.
  pub fn override_response(&self, operation: &str, data: Value) {
    self
      .overrides
      .lock()
      .unwrap()
      .insert(operation.to_string(), data);
  }

  pub fn set_delay(&self, delay: Duration) {
    *self.delay.lock().unwrap() = Some(delay);
  }

  /// Delay only cursor-paginated requests without an `after` cursor.
  pub fn set_first_page_delay(&self, delay: Option<Duration>) {
    *self.first_page_delay.lock().unwrap() = delay;
  }

  pub fn calls(&self, operation: &str) -> u32 {
    self
      .calls
      .lock()
      .unwrap()
      .get(operation)
      .copied()
      .unwrap_or(0)
  }

  pub fn total_calls(&self) -> u32 {
    self.calls.lock().unwrap().values().sum()
  }

  fn take_failure(&self, operation: &str) -> Option<Error> {
    let mut failures = self.failures.lock().unwrap();
    let failure = failures.get_mut(operation)?;
    let error = failure.error.clone();
    match failure.remaining {
      Some(1) => {
        failures.remove(operation);
      }
      Some(n) => failure.remaining = Some(n - 1),
      None => {}
    }
    Some(error)
  }

  fn scoped(&self, request: &GraphqlRequest) -> Vec<Article> {
    let articles = self.articles.lock().unwrap().clone();
    match request.operation_name {
      "GetCategoryPostsPaginated" => {
        let slug = request.str_var("slug").unwrap_or_default().to_string();
        articles
          .into_iter()
          .filter(|a| a.categories.iter().any(|c| c.slug == slug))
          .collect()
      }
      "GetTagPostsPaginated" => {
        let tag = request.str_var("tag").unwrap_or_default().to_string();
        articles
          .into_iter()
          .filter(|a| a.tags.contains(&tag))
          .collect()
      }
      _ => articles,
    }
  }

  fn respond(&self, request: &GraphqlRequest) -> Result<Value> {
    let first = request.int_var("first").unwrap_or(u64::MAX) as usize;

    let data = match request.operation_name {
      "GetPostsPaginated" | "GetCategoryPostsPaginated" | "GetTagPostsPaginated" => {
        let start = match request.str_var("after") {
          Some(cursor) => parse_cursor(cursor)? + 1,
          None => 0,
        };
        json!({ "postsConnection": connection_json(&self.scoped(request), start, first)? })
      }
      "GetPostsWithOffset" => {
        let skip = request.int_var("skip").unwrap_or(0) as usize;
        json!({ "postsConnection": connection_json(&self.scoped(request), skip, first)? })
      }
      "GetTotalPostsCount" => {
        let count = self.articles.lock().unwrap().len();
        json!({ "postsConnection": { "aggregate": { "count": count } } })
      }
      "GetFeaturedPosts" => {
        let posts: Vec<Article> = self.scoped(request).into_iter().filter(|a| a.featured).take(first).collect();
        json!({ "posts": serde_json::to_value(posts)? })
      }
      "GetRecentPosts" => {
        let posts: Vec<Article> = self.scoped(request).into_iter().take(first).collect();
        json!({ "posts": serde_json::to_value(posts)? })
      }
      "GetCategories" => {
        let mut categories: Vec<Category> = Vec::new();
        for a in self.articles.lock().unwrap().iter() {
          for c in &a.categories {
            if !categories.iter().any(|known| known.slug == c.slug) {
              categories.push(c.clone());
            }
          }
        }
        categories.sort_by(|a, b| a.name.cmp(&b.name));
        json!({ "categories": serde_json::to_value(categories)? })
      }
      "GetPostBySlug" => {
        let slug = request.str_var("slug").unwrap_or_default();
        let post = self
          .articles
          .lock()
          .unwrap()
          .iter()
          .find(|a| a.slug == slug)
          .cloned();
        json!({ "post": serde_json::to_value(post)? })
      }
      other => return Err(Error::Validation(format!("unknown operation {}", other))),
    };
    Ok(data)
  }
}

fn parse_cursor(cursor: &str) -> Result<usize> {
  cursor
    .strip_prefix("idx-")
    .and_then(|n| n.parse().ok())
    .ok_or_else(|| Error::Validation(format!("bad cursor {}", cursor)))
}

/// Index-based cursors, like a CMS that encodes offsets into its cursors.
fn connection_json(articles: &[Article], start: usize, first: usize) -> Result<Value> {
  let start = start.min(articles.len());
  let end = start.saturating_add(first).min(articles.len());
  let mut edges = Vec::new();
  for (i, article) in articles[start..end].iter().enumerate() {
    edges.push(json!({
      "cursor": format!("idx-{}", start + i),
      "node": serde_json::to_value(article)?,
    }));
  }
  Ok(json!({
    "edges": edges,
    "pageInfo": {
      "hasNextPage": end < articles.len(),
      "hasPreviousPage": start > 0,
      "startCursor": (start < end).then(|| format!("idx-{}", start)),
      "endCursor": (start < end).then(|| format!("idx-{}", end - 1)),
    },
    "aggregate": { "count": articles.len() },
  }))
}

#[async_trait]
impl Transport for FakeCms {
  async fn execute(&self, request: &GraphqlRequest) -> Result<GraphqlResponse> {
    *self
      .calls
      .lock()
      .unwrap()
      .entry(request.operation_name.to_string())
      .or_default() += 1;

    let delay = *self.delay.lock().unwrap();
    if let Some(delay) = delay {
      tokio::time::sleep(delay).await;
    }
    let first_page = request.operation_name.ends_with("Paginated") && request.str_var("after").is_none();
    let first_page_delay = *self.first_page_delay.lock().unwrap();
    if let (true, Some(delay)) = (first_page, first_page_delay) {
      tokio::time::sleep(delay).await;
    }

    if let Some(error) = self.take_failure(request.operation_name) {
      return Err(error);
    }

    let overridden = self
      .overrides
      .lock()
      .unwrap()
      .get(request.operation_name)
      .cloned();
    if let Some(data) = overridden {
      return Ok(GraphqlResponse::ok(data));
    }

    Ok(GraphqlResponse::ok(self.respond(request)?))
  }

  fn label(&self) -> &str {
    "fake-cms"
  }
}
