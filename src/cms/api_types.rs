//! Serde-deserializable types matching the CMS GraphQL responses.
//!
//! These mirror the `data` payload of each operation so that a response with
//! the wrong shape fails at decode time instead of deep inside view state.

use serde::Deserialize;
use serde_json::Value;

use super::types::{Article, Category};
use crate::cache::{Connection, Edge, PageInfo};
use crate::error::{Error, Result};

/// Decode the `data` payload of an operation into its typed shape.
pub fn decode<T: for<'de> Deserialize<'de>>(operation: &str, data: Value) -> Result<T> {
  serde_json::from_value(data)
    .map_err(|e| Error::Validation(format!("Malformed {} response: {}", operation, e)))
}

// ============================================================================
// Connections
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiEdge<T> {
  pub cursor: String,
  pub node: T,
}

#[derive(Debug, Deserialize)]
pub struct ApiAggregate {
  pub count: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiConnection<T> {
  #[serde(default = "Vec::new")]
  pub edges: Vec<ApiEdge<T>>,
  #[serde(default)]
  pub page_info: PageInfo,
  pub aggregate: ApiAggregate,
}

impl<T> From<ApiConnection<T>> for Connection<T> {
  fn from(api: ApiConnection<T>) -> Self {
    Connection {
      edges: api
        .edges
        .into_iter()
        .map(|e| Edge {
          cursor: e.cursor,
          node: e.node,
        })
        .collect(),
      page_info: api.page_info,
      total_count: api.aggregate.count,
    }
  }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPostsConnectionData {
  pub posts_connection: ApiConnection<Article>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCountOnly {
  pub aggregate: ApiAggregate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiPostsCountData {
  pub posts_connection: ApiCountOnly,
}

// ============================================================================
// One-shot lists and single items
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiPostsData {
  pub posts: Vec<Article>,
}

#[derive(Debug, Deserialize)]
pub struct ApiCategoriesData {
  pub categories: Vec<Category>,
}

#[derive(Debug, Deserialize)]
pub struct ApiPostData {
  pub post: Option<Article>,
}
