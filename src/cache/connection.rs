//! Relay-style connection shape shared by the cache and the CMS client.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
  #[serde(default)]
  pub has_next_page: bool,
  #[serde(default)]
  pub has_previous_page: bool,
  pub start_cursor: Option<String>,
  pub end_cursor: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Edge<T> {
  pub cursor: String,
  pub node: T,
}

/// An ordered page of nodes plus pagination metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Connection<T> {
  pub edges: Vec<Edge<T>>,
  pub page_info: PageInfo,
  /// Aggregate count of the whole result set, not just this page.
  pub total_count: u64,
}

impl<T> Default for Connection<T> {
  fn default() -> Self {
    Self {
      edges: Vec::new(),
      page_info: PageInfo::default(),
      total_count: 0,
    }
  }
}

impl<T> Connection<T> {
  /// Wrap a one-shot list so it can be cached like any other root.
  pub fn from_nodes(nodes: Vec<T>) -> Self {
    let total_count = nodes.len() as u64;
    let edges = nodes
      .into_iter()
      .enumerate()
      .map(|(i, node)| Edge {
        cursor: i.to_string(),
        node,
      })
      .collect();
    Self {
      edges,
      page_info: PageInfo::default(),
      total_count,
    }
  }

  /// A connection that only carries a count.
  pub fn count_only(total_count: u64) -> Self {
    Self {
      total_count,
      ..Self::default()
    }
  }

  pub fn len(&self) -> usize {
    self.edges.len()
  }

  pub fn is_empty(&self) -> bool {
    self.edges.is_empty()
  }

  pub fn nodes(&self) -> impl Iterator<Item = &T> {
    self.edges.iter().map(|e| &e.node)
  }

  pub fn into_nodes(self) -> Vec<T> {
    self.edges.into_iter().map(|e| e.node).collect()
  }
}
