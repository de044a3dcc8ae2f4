//! Core traits and types for the caching system.

use chrono::{DateTime, Duration, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::fmt;

use crate::error::{Error, Result};
use crate::transport::GraphqlError;

/// Identity of a normalized record: entity type plus its stable key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey {
  pub entity_type: String,
  pub id: String,
}

impl EntityKey {
  pub fn new(entity_type: &str, id: impl Into<String>) -> Self {
    Self {
      entity_type: entity_type.to_string(),
      id: id.into(),
    }
  }

  /// Parse the `Type:id` form produced by `Display`.
  pub fn parse(s: &str) -> Option<Self> {
    let (entity_type, id) = s.split_once(':')?;
    if entity_type.is_empty() || id.is_empty() {
      return None;
    }
    Some(Self::new(entity_type, id))
  }
}

impl fmt::Display for EntityKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}:{}", self.entity_type, self.id)
  }
}

/// Trait for entities that can be cached.
pub trait Cacheable: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
  /// Stable identity within the entity type (slug, URL, ...).
  fn cache_key(&self) -> String;

  /// Entity type name (e.g., "Article", "Category").
  fn entity_type() -> &'static str;

  /// How long a written record stays fresh unless configuration overrides it.
  fn default_max_age() -> Duration;

  fn entity_key(&self) -> EntityKey {
    EntityKey::new(Self::entity_type(), self.cache_key())
  }

  /// Records to write for this entity: itself, plus any nested entities
  /// that have their own identity.
  fn normalize(&self) -> Result<Vec<Normalized>> {
    Ok(vec![Normalized::of(self)?])
  }
}

/// One record ready to be merged into the store.
#[derive(Debug, Clone)]
pub struct Normalized {
  pub key: EntityKey,
  pub entity_type: &'static str,
  pub fields: Value,
  pub max_age: Duration,
}

impl Normalized {
  pub fn of<T: Cacheable>(entity: &T) -> Result<Self> {
    let fields = serde_json::to_value(entity)
      .map_err(|e| Error::Cache(format!("Failed to serialize {}: {}", entity.entity_key(), e)))?;
    Ok(Self {
      key: entity.entity_key(),
      entity_type: T::entity_type(),
      fields,
      max_age: T::default_max_age(),
    })
  }
}

/// Identity of a cached query root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootId {
  /// Stable hash of the root name and identifying variables.
  pub hash: String,
  /// GraphQL root field, used to decide merge behavior.
  pub name: &'static str,
  pub description: String,
}

/// Query key types produce stable cache hashes.
pub trait QueryKey {
  /// Stable hash for this query (excludes cursor arguments).
  fn cache_hash(&self) -> String;

  /// Human-readable description for logs.
  fn description(&self) -> String;

  /// GraphQL root field this query reads (e.g., "postsConnection").
  fn root_name(&self) -> &'static str;

  fn root_id(&self) -> RootId {
    RootId {
      hash: self.cache_hash(),
      name: self.root_name(),
      description: self.description(),
    }
  }
}

/// Decoded data plus any GraphQL errors that came with it.
#[derive(Debug, Clone)]
pub struct Fetched<T> {
  pub data: T,
  pub errors: Vec<GraphqlError>,
}

impl<T> Fetched<T> {
  pub fn new(data: T) -> Self {
    Self {
      data,
      errors: Vec::new(),
    }
  }
}

/// Result from a cache operation, including data and metadata about the source.
#[derive(Debug, Clone)]
pub struct CacheResult<T> {
  /// The actual data
  pub data: T,
  /// Where the data came from
  pub source: CacheSource,
  /// When the data was cached (if from cache)
  pub cached_at: Option<DateTime<Utc>>,
  /// Partial GraphQL errors that accompanied network data
  pub errors: Vec<GraphqlError>,
}

impl<T> CacheResult<T> {
  /// Create a new cache result from fresh network data.
  pub fn from_network(fetched: Fetched<T>) -> Self {
    Self {
      data: fetched.data,
      source: CacheSource::Network,
      cached_at: None,
      errors: fetched.errors,
    }
  }

  /// Create a new cache result from cached data.
  pub fn from_cache(data: T, cached_at: DateTime<Utc>, is_stale: bool) -> Self {
    Self {
      data,
      source: if is_stale {
        CacheSource::CacheStale
      } else {
        CacheSource::CacheFresh
      },
      cached_at: Some(cached_at),
      errors: Vec::new(),
    }
  }

  /// Create a new cache result for offline mode.
  pub fn offline(data: T, cached_at: DateTime<Utc>) -> Self {
    Self {
      data,
      source: CacheSource::Offline,
      cached_at: Some(cached_at),
      errors: Vec::new(),
    }
  }

  pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CacheResult<U> {
    CacheResult {
      data: f(self.data),
      source: self.source,
      cached_at: self.cached_at,
      errors: self.errors,
    }
  }

  pub fn is_partial(&self) -> bool {
    !self.errors.is_empty()
  }
}

/// Indicates where cached data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheSource {
  /// Fresh data from network
  Network,
  /// Data from cache, still considered fresh
  CacheFresh,
  /// Data from cache, considered stale; a background refetch is in flight
  CacheStale,
  /// Refetch failed, serving the stale cached value
  Offline,
}

/// A field is fresh while its age is strictly below `max_age`.
pub fn is_fresh(written_at: DateTime<Utc>, max_age: Duration, now: DateTime<Utc>) -> bool {
  now - written_at < max_age
}
