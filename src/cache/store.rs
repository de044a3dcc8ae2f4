//! In-memory normalized cache store.
//!
//! Entities are stored once per identity as JSON objects and deep-merged on
//! write. Query roots store ordered references into the entity table plus the
//! page metadata needed to resume pagination.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use super::connection::{Connection, Edge, PageInfo};
use super::traits::{is_fresh, Cacheable, EntityKey, Normalized, RootId};
use crate::error::{Error, Result};

/// Prefix for root entries in snapshots.
const ROOT_PREFIX: &str = "ROOT_QUERY.";

/// Store-wide settings.
#[derive(Debug, Clone)]
pub struct StoreConfig {
  /// Max age for cached query roots
  pub root_max_age: Duration,
  /// Per-entity-type max age overrides, keyed by entity type name
  pub ttl_overrides: HashMap<String, Duration>,
  /// Root fields whose continuation pages are appended instead of replaced
  pub accumulating_roots: HashSet<String>,
  /// Default max age per registered entity type, for records that arrive
  /// without a typed write (snapshot restore)
  pub entity_max_ages: HashMap<String, Duration>,
}

impl Default for StoreConfig {
  fn default() -> Self {
    Self {
      root_max_age: Duration::hours(1),
      ttl_overrides: HashMap::new(),
      accumulating_roots: ["postsConnection".to_string()].into_iter().collect(),
      entity_max_ages: HashMap::new(),
    }
  }
}

impl StoreConfig {
  /// Register `T`'s default max age.
  pub fn with_entity<T: Cacheable>(mut self) -> Self {
    self
      .entity_max_ages
      .insert(T::entity_type().to_string(), T::default_max_age());
    self
  }
}

/// How a fetched connection is written under its root.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootWrite<'a> {
  /// A first page: the root is replaced.
  Replace,
  /// A background refetch of the first page. An accumulating root that
  /// holds more pages, and whose leading entries still match the page, keeps
  /// its later pages.
  Revalidate,
  /// The page that follows cursor `after`.
  Append { after: &'a str },
}

/// A single cached entity.
#[derive(Debug, Clone)]
pub struct CachedEntity<T> {
  /// The cached entity
  pub entity: T,
  /// When the entity was last written
  pub cached_at: DateTime<Utc>,
  pub fresh: bool,
}

/// A cached query root, hydrated from entity records.
#[derive(Debug, Clone)]
pub struct CachedRoot<T> {
  pub connection: Connection<T>,
  pub cached_at: DateTime<Utc>,
  pub fresh: bool,
}

#[derive(Debug, Clone)]
struct Record {
  fields: Value,
  written_at: DateTime<Utc>,
  max_age: Duration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootRef {
  cursor: String,
  key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RootRecord {
  name: String,
  description: String,
  refs: Vec<RootRef>,
  page_info: PageInfo,
  total_count: u64,
  #[serde(skip, default = "Utc::now")]
  written_at: DateTime<Utc>,
}

#[derive(Default)]
struct StoreInner {
  entities: HashMap<EntityKey, Record>,
  roots: HashMap<String, RootRecord>,
}

/// Session-scoped normalized cache.
pub struct CacheStore {
  inner: Mutex<StoreInner>,
  config: StoreConfig,
}

impl Default for CacheStore {
  fn default() -> Self {
    Self::new(StoreConfig::default())
  }
}

impl CacheStore {
  pub fn new(config: StoreConfig) -> Self {
    Self {
      inner: Mutex::new(StoreInner::default()),
      config,
    }
  }

  fn lock(&self) -> Result<MutexGuard<'_, StoreInner>> {
    self
      .inner
      .lock()
      .map_err(|e| Error::Cache(format!("Lock poisoned: {}", e)))
  }

  fn max_age_for(&self, entity_type: &str, default: Duration) -> Duration {
    self
      .config
      .ttl_overrides
      .get(entity_type)
      .copied()
      .unwrap_or(default)
  }

  fn is_accumulating(&self, root_name: &str) -> bool {
    self.config.accumulating_roots.contains(root_name)
  }

  /// Read an entity by id regardless of freshness.
  pub fn read<T: Cacheable>(&self, id: &str) -> Result<Option<T>> {
    Ok(self.read_cached::<T>(id, Utc::now())?.map(|c| c.entity))
  }

  /// Read an entity together with its freshness at `now`.
  pub fn read_cached<T: Cacheable>(
    &self,
    id: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<CachedEntity<T>>> {
    let key = EntityKey::new(T::entity_type(), id);
    let inner = self.lock()?;
    let Some(record) = inner.entities.get(&key) else {
      return Ok(None);
    };
    let entity = decode::<T>(&key, &record.fields)?;
    Ok(Some(CachedEntity {
      entity,
      cached_at: record.written_at,
      fresh: is_fresh(record.written_at, record.max_age, now),
    }))
  }

  /// Write an entity and its nested entities.
  pub fn write<T: Cacheable>(&self, entity: &T) -> Result<()> {
    let records = entity.normalize()?;
    let mut inner = self.lock()?;
    let now = Utc::now();
    for record in records {
      self.merge_record(&mut inner, record, now);
    }
    Ok(())
  }

  /// Deep-merge a partial field update into a record, creating it if absent.
  /// New records get the default max age for their type unless overridden.
  pub fn write_partial(&self, key: EntityKey, partial: Value, default_max_age: Duration) -> Result<()> {
    if !partial.is_object() {
      return Err(Error::Validation(format!(
        "partial update for {} must be a JSON object",
        key
      )));
    }
    let max_age = self.max_age_for(&key.entity_type, default_max_age);
    let mut inner = self.lock()?;
    let now = Utc::now();
    match inner.entities.get_mut(&key) {
      Some(record) => {
        deep_merge(&mut record.fields, partial);
        record.written_at = now;
      }
      None => {
        inner.entities.insert(
          key,
          Record {
            fields: partial,
            written_at: now,
            max_age,
          },
        );
      }
    }
    Ok(())
  }

  fn merge_record(&self, inner: &mut StoreInner, record: Normalized, now: DateTime<Utc>) {
    let max_age = self.max_age_for(record.entity_type, record.max_age);
    match inner.entities.get_mut(&record.key) {
      Some(existing) => {
        deep_merge(&mut existing.fields, record.fields);
        existing.written_at = now;
        existing.max_age = max_age;
      }
      None => {
        inner.entities.insert(
          record.key,
          Record {
            fields: record.fields,
            written_at: now,
            max_age,
          },
        );
      }
    }
  }

  /// Hydrate a cached root. A root whose references can no longer be
  /// resolved is reported as missing.
  pub fn read_root<T: Cacheable>(
    &self,
    hash: &str,
    now: DateTime<Utc>,
  ) -> Result<Option<CachedRoot<T>>> {
    let inner = self.lock()?;
    let Some(root) = inner.roots.get(hash) else {
      return Ok(None);
    };

    let mut edges = Vec::with_capacity(root.refs.len());
    for r in &root.refs {
      let key = EntityKey::new(T::entity_type(), r.key.as_str());
      let Some(record) = inner.entities.get(&key) else {
        tracing::debug!(root = %root.description, entity = %key, "Dangling root reference");
        return Ok(None);
      };
      edges.push(Edge {
        cursor: r.cursor.clone(),
        node: decode::<T>(&key, &record.fields)?,
      });
    }

    Ok(Some(CachedRoot {
      connection: Connection {
        edges,
        page_info: root.page_info.clone(),
        total_count: root.total_count,
      },
      cached_at: root.written_at,
      fresh: is_fresh(root.written_at, self.config.root_max_age, now),
    }))
  }

  /// Write a connection under a root.
  ///
  /// Entities are always merged. An `Append` extends an accumulating root
  /// (deduplicated by identity) only when `after` is the root's current end
  /// cursor; a page fetched from a cursor the root no longer ends at would
  /// leave a gap, so only its entities are kept. Non-accumulating roots are
  /// always replaced.
  pub fn write_root<T: Cacheable>(
    &self,
    root: &RootId,
    connection: &Connection<T>,
    mode: RootWrite<'_>,
  ) -> Result<()> {
    let mut records = Vec::new();
    for node in connection.nodes() {
      records.extend(node.normalize()?);
    }
    let refs: Vec<RootRef> = connection
      .edges
      .iter()
      .map(|e| RootRef {
        cursor: e.cursor.clone(),
        key: e.node.cache_key(),
      })
      .collect();

    let mut inner = self.lock()?;
    let now = Utc::now();
    for record in records {
      self.merge_record(&mut inner, record, now);
    }

    let accumulating = self.is_accumulating(root.name);
    match mode {
      RootWrite::Append { after } if accumulating => {
        let Some(existing) = inner.roots.get_mut(&root.hash) else {
          tracing::debug!(root = %root.description, "Continuation for uncached root, entities only");
          return Ok(());
        };
        if existing.page_info.end_cursor.as_deref() != Some(after) {
          tracing::debug!(
            root = %root.description,
            after,
            "Continuation from a cursor the root no longer ends at, entities only"
          );
          return Ok(());
        }
        let seen: HashSet<String> = existing.refs.iter().map(|r| r.key.clone()).collect();
        existing
          .refs
          .extend(refs.into_iter().filter(|r| !seen.contains(&r.key)));
        existing.page_info.has_next_page = connection.page_info.has_next_page;
        if connection.page_info.end_cursor.is_some() {
          existing.page_info.end_cursor = connection.page_info.end_cursor.clone();
        }
        existing.total_count = connection.total_count;
        existing.written_at = now;
        return Ok(());
      }
      RootWrite::Revalidate if accumulating => {
        if let Some(existing) = inner.roots.get_mut(&root.hash) {
          let unchanged = connection.page_info.has_next_page
            && refs.len() < existing.refs.len()
            && refs.iter().zip(&existing.refs).all(|(a, b)| a.key == b.key);
          if unchanged {
            existing.total_count = connection.total_count;
            existing.written_at = now;
            return Ok(());
          }
          tracing::debug!(root = %root.description, "First page changed, dropping accumulated pages");
        }
      }
      _ => {}
    }

    inner.roots.insert(
      root.hash.clone(),
      RootRecord {
        name: root.name.to_string(),
        description: root.description.clone(),
        refs,
        page_info: connection.page_info.clone(),
        total_count: connection.total_count,
        written_at: now,
      },
    );
    Ok(())
  }

  /// Remove a single cached root. Returns whether it existed.
  pub fn evict_root(&self, hash: &str) -> Result<bool> {
    Ok(self.lock()?.roots.remove(hash).is_some())
  }

  /// Clear the entire store.
  pub fn evict_all(&self) -> Result<()> {
    let mut inner = self.lock()?;
    inner.entities.clear();
    inner.roots.clear();
    Ok(())
  }

  /// Number of entity records (roots excluded).
  pub fn len(&self) -> Result<usize> {
    Ok(self.lock()?.entities.len())
  }

  pub fn is_empty(&self) -> Result<bool> {
    Ok(self.len()? == 0)
  }

  /// Full snapshot: entities keyed by `Type:id`, roots under `ROOT_QUERY.<hash>`.
  pub fn extract_all(&self) -> Result<BTreeMap<String, Value>> {
    let inner = self.lock()?;
    let mut out: BTreeMap<String, Value> = inner
      .entities
      .iter()
      .map(|(k, r)| (k.to_string(), r.fields.clone()))
      .collect();
    for (hash, root) in &inner.roots {
      out.insert(format!("{}{}", ROOT_PREFIX, hash), serde_json::to_value(root)?);
    }
    Ok(out)
  }

  /// Load a snapshot produced by [`extract_all`](Self::extract_all). Restored
  /// records count as freshly written and take their type's max age: the
  /// configured override, else the registered default, else the root max age.
  pub fn restore(&self, snapshot: BTreeMap<String, Value>) -> Result<()> {
    let mut inner = self.lock()?;
    let now = Utc::now();
    for (key, value) in snapshot {
      if let Some(hash) = key.strip_prefix(ROOT_PREFIX) {
        let root: RootRecord = serde_json::from_value(value)
          .map_err(|e| Error::Cache(format!("Bad root snapshot {}: {}", hash, e)))?;
        inner.roots.insert(hash.to_string(), root);
        continue;
      }
      let entity_key = EntityKey::parse(&key)
        .ok_or_else(|| Error::Cache(format!("Bad entity key in snapshot: {}", key)))?;
      let default = match self.config.entity_max_ages.get(&entity_key.entity_type) {
        Some(max_age) => *max_age,
        None => {
          tracing::debug!(entity_type = %entity_key.entity_type, "Unregistered type in snapshot");
          self.config.root_max_age
        }
      };
      let max_age = self.max_age_for(&entity_key.entity_type, default);
      inner.entities.insert(
        entity_key,
        Record {
          fields: value,
          written_at: now,
          max_age,
        },
      );
    }
    Ok(())
  }
}

fn decode<T: Cacheable>(key: &EntityKey, fields: &Value) -> Result<T> {
  serde_json::from_value(fields.clone())
    .map_err(|e| Error::Cache(format!("Failed to decode cached {}: {}", key, e)))
}

/// Objects merge field by field; arrays and scalars are replaced.
fn deep_merge(target: &mut Value, incoming: Value) {
  match (target, incoming) {
    (Value::Object(existing), Value::Object(incoming)) => {
      for (field, value) in incoming {
        match existing.get_mut(&field) {
          Some(slot) => deep_merge(slot, value),
          None => {
            existing.insert(field, value);
          }
        }
      }
    }
    (slot, incoming) => *slot = incoming,
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cms::types::{Article, Author, Category};
  use crate::testing::article;
  use serde_json::json;

  fn root(name: &'static str, hash: &str) -> RootId {
    RootId {
      hash: hash.to_string(),
      name,
      description: hash.to_string(),
    }
  }

  fn page(articles: &[Article], has_next: bool, total: u64) -> Connection<Article> {
    Connection {
      edges: articles
        .iter()
        .map(|a| Edge {
          cursor: format!("c-{}", a.slug),
          node: a.clone(),
        })
        .collect(),
      page_info: PageInfo {
        has_next_page: has_next,
        has_previous_page: false,
        start_cursor: articles.first().map(|a| format!("c-{}", a.slug)),
        end_cursor: articles.last().map(|a| format!("c-{}", a.slug)),
      },
      total_count: total,
    }
  }

  #[test]
  fn test_idempotent_merge() {
    let store = CacheStore::default();
    let a = article(1);

    store.write(&a).unwrap();
    let first = store.extract_all().unwrap();
    store.write(&a).unwrap();
    let second = store.extract_all().unwrap();

    assert_eq!(
      serde_json::to_vec(&first).unwrap(),
      serde_json::to_vec(&second).unwrap()
    );
    assert_eq!(store.read::<Article>(&a.slug).unwrap(), Some(a));
  }

  #[test]
  fn test_nested_entities_are_normalized() {
    let store = CacheStore::default();
    let a = article(1);
    store.write(&a).unwrap();

    let category = &a.categories[0];
    assert_eq!(
      store.read::<Category>(&category.slug).unwrap().as_ref(),
      Some(category)
    );
    // article + category + author + author avatar + cover image
    assert_eq!(store.len().unwrap(), 5);
  }

  #[test]
  fn test_partial_write_deep_merges_and_replaces_lists() {
    let store = CacheStore::default();
    let a = article(1);
    store.write(&a).unwrap();

    store
      .write_partial(
        a.entity_key(),
        json!({ "title": "Edited", "tags": ["rust"], "coverImage": { "alt": "new alt" } }),
        Article::default_max_age(),
      )
      .unwrap();

    let merged = store.read::<Article>(&a.slug).unwrap().unwrap();
    assert_eq!(merged.title, "Edited");
    assert_eq!(merged.tags, vec!["rust".to_string()]);
    let cover = merged.cover_image.unwrap();
    assert_eq!(cover.alt.as_deref(), Some("new alt"));
    assert_eq!(cover.url, a.cover_image.unwrap().url);
    assert_eq!(merged.excerpt, a.excerpt);
  }

  #[test]
  fn test_partial_write_rejects_non_objects() {
    let store = CacheStore::default();
    let err = store
      .write_partial(EntityKey::new("Article", "x"), json!([1, 2]), Duration::hours(1))
      .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
  }

  #[test]
  fn test_accumulating_root_appends_with_dedup() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (1..=5).map(article).collect();

    store.write_root(&feed, &page(&items[0..3], true, 5), RootWrite::Replace).unwrap();
    // Overlapping continuation: item 3 is repeated.
    let after = RootWrite::Append { after: "c-post-3" };
    store.write_root(&feed, &page(&items[2..5], false, 5), after).unwrap();

    let cached = store.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    let slugs: Vec<_> = cached.connection.nodes().map(|a| a.slug.clone()).collect();
    assert_eq!(slugs, vec!["post-1", "post-2", "post-3", "post-4", "post-5"]);
    assert!(!cached.connection.page_info.has_next_page);
    assert_eq!(cached.connection.page_info.end_cursor.as_deref(), Some("c-post-5"));
    assert!(cached.fresh);
  }

  #[test]
  fn test_non_accumulating_root_is_replaced() {
    let store = CacheStore::default();
    let recent = root("posts", "recent");
    let items: Vec<Article> = (1..=4).map(article).collect();

    store.write_root(&recent, &page(&items[0..2], true, 4), RootWrite::Replace).unwrap();
    let after = RootWrite::Append { after: "c-post-2" };
    store.write_root(&recent, &page(&items[2..4], false, 4), after).unwrap();

    let cached = store.read_root::<Article>("recent", Utc::now()).unwrap().unwrap();
    let slugs: Vec<_> = cached.connection.nodes().map(|a| a.slug.clone()).collect();
    assert_eq!(slugs, vec!["post-3", "post-4"]);
  }

  #[test]
  fn test_first_page_replaces_accumulated_root() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (1..=4).map(article).collect();

    store.write_root(&feed, &page(&items[0..2], true, 4), RootWrite::Replace).unwrap();
    let after = RootWrite::Append { after: "c-post-2" };
    store.write_root(&feed, &page(&items[2..4], false, 4), after).unwrap();
    store.write_root(&feed, &page(&items[0..2], true, 4), RootWrite::Replace).unwrap();

    let cached = store.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    assert_eq!(cached.connection.len(), 2);
  }

  #[test]
  fn test_root_freshness_uses_root_max_age() {
    let store = CacheStore::new(StoreConfig {
      root_max_age: Duration::zero(),
      ..StoreConfig::default()
    });
    let feed = root("postsConnection", "feed");
    store.write_root(&feed, &page(&[article(1)], false, 1), RootWrite::Replace).unwrap();

    let cached = store.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    assert!(!cached.fresh);
  }

  #[test]
  fn test_entity_ttl_override() {
    let mut config = StoreConfig::default();
    config.ttl_overrides.insert("Article".to_string(), Duration::zero());
    let store = CacheStore::new(config);
    let a = article(1);
    store.write(&a).unwrap();

    let cached = store.read_cached::<Article>(&a.slug, Utc::now()).unwrap().unwrap();
    assert!(!cached.fresh);
    let category = store
      .read_cached::<Category>(&a.categories[0].slug, Utc::now())
      .unwrap()
      .unwrap();
    assert!(category.fresh);
  }

  #[test]
  fn test_evict_all_and_missing_references() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    store.write_root(&feed, &page(&[article(1)], false, 1), RootWrite::Replace).unwrap();

    store.evict_all().unwrap();
    assert!(store.is_empty().unwrap());
    assert!(store.read_root::<Article>("feed", Utc::now()).unwrap().is_none());
  }

  #[test]
  fn test_snapshot_restores_into_fresh_store() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (1..=3).map(article).collect();
    store.write_root(&feed, &page(&items, false, 3), RootWrite::Replace).unwrap();

    let snapshot = store.extract_all().unwrap();
    let restored = CacheStore::default();
    restored.restore(snapshot.clone()).unwrap();

    assert_eq!(restored.extract_all().unwrap(), snapshot);
    let cached = restored.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    assert_eq!(cached.connection.into_nodes(), items);
  }

  fn slugs(store: &CacheStore, hash: &str) -> Vec<String> {
    let cached = store.read_root::<Article>(hash, Utc::now()).unwrap().unwrap();
    cached.connection.nodes().map(|a| a.slug.clone()).collect()
  }

  #[test]
  fn test_append_from_stale_cursor_keeps_root_contiguous() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (1..=9).map(article).collect();
    store.write_root(&feed, &page(&items[0..3], true, 9), RootWrite::Replace).unwrap();

    // A page fetched from a cursor past the root's end must not be spliced in.
    let after = RootWrite::Append { after: "c-post-6" };
    store.write_root(&feed, &page(&items[6..9], false, 9), after).unwrap();

    assert_eq!(slugs(&store, "feed"), vec!["post-1", "post-2", "post-3"]);
    assert!(store.read::<Article>("post-8").unwrap().is_some());
    let cached = store.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    assert_eq!(cached.connection.page_info.end_cursor.as_deref(), Some("c-post-3"));
    assert!(cached.connection.page_info.has_next_page);
  }

  #[test]
  fn test_revalidation_keeps_accumulated_pages_when_first_page_matches() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (1..=6).map(article).collect();
    store.write_root(&feed, &page(&items[0..3], true, 6), RootWrite::Replace).unwrap();
    let after = RootWrite::Append { after: "c-post-3" };
    store.write_root(&feed, &page(&items[3..6], false, 6), after).unwrap();

    store.write_root(&feed, &page(&items[0..3], true, 6), RootWrite::Revalidate).unwrap();

    assert_eq!(slugs(&store, "feed").len(), 6);
    let cached = store.read_root::<Article>("feed", Utc::now()).unwrap().unwrap();
    assert!(!cached.connection.page_info.has_next_page);
  }

  #[test]
  fn test_revalidation_replaces_root_when_first_page_changed() {
    let store = CacheStore::default();
    let feed = root("postsConnection", "feed");
    let items: Vec<Article> = (0..=6).map(article).collect();
    store.write_root(&feed, &page(&items[1..4], true, 6), RootWrite::Replace).unwrap();
    let after = RootWrite::Append { after: "c-post-3" };
    store.write_root(&feed, &page(&items[4..7], false, 6), after).unwrap();

    store.write_root(&feed, &page(&items[0..3], true, 7), RootWrite::Revalidate).unwrap();

    assert_eq!(slugs(&store, "feed"), vec!["post-0", "post-1", "post-2"]);
  }

  #[test]
  fn test_restore_uses_registered_type_max_age() {
    let config = || {
      StoreConfig::default()
        .with_entity::<Article>()
        .with_entity::<Author>()
    };
    let store = CacheStore::new(config());
    let a = article(1);
    store.write(&a).unwrap();

    let restored = CacheStore::new(config());
    restored.restore(store.extract_all().unwrap()).unwrap();

    let later = Utc::now() + Duration::hours(2);
    let author = a.author.as_ref().unwrap();
    let cached = restored
      .read_cached::<Author>(&author.cache_key(), later)
      .unwrap()
      .unwrap();
    assert!(cached.fresh);
    let article = restored.read_cached::<Article>(&a.slug, later).unwrap().unwrap();
    assert!(article.fresh);
    // Unregistered types fall back to the root max age.
    let category = restored
      .read_cached::<Category>(&a.categories[0].slug, later)
      .unwrap()
      .unwrap();
    assert!(!category.fresh);
  }
}
