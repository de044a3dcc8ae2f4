use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

use crate::cache::{FetchPolicy, StoreConfig};
use crate::cms::{with_cms_entities, OneShotSizes};
use crate::error::{Error, Result};
use crate::paginate::{DEFAULT_PAGE_SIZE, DEFAULT_PER_PAGE};
use crate::transport::{default_signatures, RetryPolicy};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
  pub endpoints: EndpointsConfig,
  #[serde(default)]
  pub cache: CacheConfig,
  #[serde(default)]
  pub retry: RetryConfig,
  #[serde(default)]
  pub pagination: PaginationConfig,
  #[serde(default)]
  pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointsConfig {
  /// Read-only CDN replica; every read goes here first
  pub cdn_url: String,
  /// Authenticated content API, used as the failover target
  pub content_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  /// Max age of cached query roots, in seconds
  pub root_ttl_secs: u64,
  /// Per-entity-type max age overrides in seconds (e.g. `Article: 600`)
  pub ttl_secs: BTreeMap<String, u64>,
  /// Root fields whose next pages are appended to the cached list
  pub accumulating_roots: Vec<String>,
  /// Policy for first-page and one-shot reads from the CLI
  pub default_policy: FetchPolicy,
}

impl Default for CacheConfig {
  fn default() -> Self {
    Self {
      root_ttl_secs: 3600,
      ttl_secs: BTreeMap::new(),
      accumulating_roots: vec!["postsConnection".to_string()],
      default_policy: FetchPolicy::CacheFirst,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub max_delay_ms: u64,
  pub retryable_signatures: Vec<String>,
  /// Per-request HTTP timeout
  pub timeout_secs: u64,
}

impl Default for RetryConfig {
  fn default() -> Self {
    Self {
      max_attempts: 3,
      base_delay_ms: 300,
      max_delay_ms: 3000,
      retryable_signatures: default_signatures(),
      timeout_secs: 10,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PaginationConfig {
  /// Items per cursor page (homepage and feeds)
  pub page_size: u32,
  /// Items per numbered archive page
  pub per_page: u32,
  /// Featured posts shown on the homepage
  pub featured: u32,
  /// Recent posts shown on the homepage
  pub recent: u32,
}

impl Default for PaginationConfig {
  fn default() -> Self {
    let sizes = OneShotSizes::default();
    Self {
      page_size: DEFAULT_PAGE_SIZE,
      per_page: DEFAULT_PER_PAGE,
      featured: sizes.featured,
      recent: sizes.recent,
    }
  }
}

impl PaginationConfig {
  pub fn one_shot_sizes(&self) -> OneShotSizes {
    OneShotSizes {
      featured: self.featured,
      recent: self.recent,
    }
  }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
  /// Filter directive used when RUST_LOG is unset
  pub level: String,
  /// Write logs to a daily-rolling file instead of stderr
  pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
  fn default() -> Self {
    Self {
      level: "info".to_string(),
      file: None,
    }
  }
}

impl Config {
  /// Load configuration from file, then apply environment overrides.
  ///
  /// Search order:
  /// 1. Explicit path if provided
  /// 2. ./quire.yaml (current directory)
  /// 3. $XDG_CONFIG_HOME/quire/config.yaml
  pub fn load(explicit_path: Option<&Path>) -> Result<Self> {
    let path = if let Some(p) = explicit_path {
      if p.exists() {
        Some(p.to_path_buf())
      } else {
        return Err(Error::Config(format!(
          "Config file not found: {}",
          p.display()
        )));
      }
    } else {
      Self::find_config_file()
    };

    let mut config = match path {
      Some(p) => Self::load_from_path(&p)?,
      // The endpoints can come entirely from the environment.
      None => match std::env::var("QUIRE_CDN_URL") {
        Ok(cdn_url) => Self::from_cdn_url(cdn_url),
        Err(_) => {
          return Err(Error::Config(
            "No configuration file found. Create one at ~/.config/quire/config.yaml \
             or set QUIRE_CDN_URL.\nSee config.example.yaml for the format."
              .to_string(),
          ))
        }
      },
    };

    config.apply_env(|name| std::env::var(name).ok());
    config.validate()?;
    Ok(config)
  }

  fn find_config_file() -> Option<PathBuf> {
    // Check current directory
    let local = PathBuf::from("quire.yaml");
    if local.exists() {
      return Some(local);
    }

    // Check XDG config directory
    if let Some(config_dir) = dirs::config_dir() {
      let xdg_path = config_dir.join("quire").join("config.yaml");
      if xdg_path.exists() {
        return Some(xdg_path);
      }
    }

    None
  }

  fn load_from_path(path: &Path) -> Result<Self> {
    let contents = std::fs::read_to_string(path).map_err(|e| {
      Error::Config(format!(
        "Failed to read config file {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::parse(&contents)
      .map_err(|e| Error::Config(format!("Failed to parse config file {}: {}", path.display(), e)))
  }

  fn parse(contents: &str) -> std::result::Result<Self, serde_yaml::Error> {
    serde_yaml::from_str(contents)
  }

  fn from_cdn_url(cdn_url: String) -> Self {
    Self {
      endpoints: EndpointsConfig {
        cdn_url,
        content_url: None,
      },
      cache: CacheConfig::default(),
      retry: RetryConfig::default(),
      pagination: PaginationConfig::default(),
      logging: LoggingConfig::default(),
    }
  }

  /// Endpoint overrides from the environment. Takes a lookup so tests don't
  /// have to mutate the process environment.
  fn apply_env(&mut self, var: impl Fn(&str) -> Option<String>) {
    if let Some(url) = var("QUIRE_CDN_URL") {
      self.endpoints.cdn_url = url;
    }
    if let Some(url) = var("QUIRE_CONTENT_URL") {
      self.endpoints.content_url = Some(url);
    }
  }

  fn validate(&self) -> Result<()> {
    self.cdn_url()?;
    self.content_url()?;
    if self.retry.max_attempts == 0 {
      return Err(Error::Config("retry.max_attempts must be at least 1".to_string()));
    }
    for (name, size) in [
      ("pagination.page_size", self.pagination.page_size),
      ("pagination.per_page", self.pagination.per_page),
      ("pagination.featured", self.pagination.featured),
      ("pagination.recent", self.pagination.recent),
    ] {
      if !(1..=crate::cms::MAX_PAGE_SIZE).contains(&size) {
        return Err(Error::Config(format!(
          "{} must be between 1 and {}",
          name,
          crate::cms::MAX_PAGE_SIZE
        )));
      }
    }
    Ok(())
  }

  pub fn cdn_url(&self) -> Result<Url> {
    parse_url("endpoints.cdn_url", &self.endpoints.cdn_url)
  }

  pub fn content_url(&self) -> Result<Option<Url>> {
    self
      .endpoints
      .content_url
      .as_deref()
      .map(|u| parse_url("endpoints.content_url", u))
      .transpose()
  }

  pub fn timeout(&self) -> Duration {
    Duration::from_secs(self.retry.timeout_secs)
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    RetryPolicy {
      max_attempts: self.retry.max_attempts,
      base_delay: Duration::from_millis(self.retry.base_delay_ms),
      max_delay: Duration::from_millis(self.retry.max_delay_ms),
      retryable_signatures: self
        .retry
        .retryable_signatures
        .iter()
        .map(|s| s.to_lowercase())
        .collect(),
    }
  }

  pub fn store_config(&self) -> StoreConfig {
    let ttl_overrides: HashMap<String, chrono::Duration> = self
      .cache
      .ttl_secs
      .iter()
      .map(|(ty, secs)| (ty.clone(), seconds(*secs)))
      .collect();

    with_cms_entities(StoreConfig {
      root_max_age: seconds(self.cache.root_ttl_secs),
      ttl_overrides,
      accumulating_roots: self.cache.accumulating_roots.iter().cloned().collect(),
      entity_max_ages: HashMap::new(),
    })
  }

  /// Get the content API token from environment variables.
  ///
  /// Checks QUIRE_CONTENT_TOKEN first, then CMS_CONTENT_TOKEN as fallback.
  /// Without a token there is no failover target, but reads still work.
  pub fn content_token() -> Option<String> {
    std::env::var("QUIRE_CONTENT_TOKEN")
      .or_else(|_| std::env::var("CMS_CONTENT_TOKEN"))
      .ok()
      .filter(|t| !t.trim().is_empty())
  }
}

fn parse_url(field: &str, value: &str) -> Result<Url> {
  let url =
    Url::parse(value).map_err(|e| Error::Config(format!("Invalid {} {:?}: {}", field, value, e)))?;
  match url.scheme() {
    "http" | "https" => Ok(url),
    other => Err(Error::Config(format!(
      "Invalid {}: unsupported scheme {}",
      field, other
    ))),
  }
}

/// Clamped to what `chrono::Duration` can hold.
fn seconds(secs: u64) -> chrono::Duration {
  let secs = i64::try_from(secs).unwrap_or(i64::MAX).min(i64::MAX / 1_000);
  chrono::Duration::seconds(secs)
}
