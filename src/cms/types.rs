use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Image or other file served by the CMS asset CDN.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
  pub url: String,
  #[serde(default)]
  pub width: Option<u32>,
  #[serde(default)]
  pub height: Option<u32>,
  #[serde(default)]
  pub alt: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
  pub id: String,
  pub name: String,
  #[serde(default)]
  pub avatar: Option<MediaAsset>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
  pub slug: String,
  pub name: String,
  #[serde(default)]
  pub description: Option<String>,
}

/// A blog post
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Article {
  pub slug: String,
  pub title: String,
  #[serde(default)]
  pub excerpt: Option<String>,
  pub published_at: DateTime<Utc>,
  pub created_at: DateTime<Utc>,
  #[serde(default)]
  pub updated_at: Option<DateTime<Utc>>,
  #[serde(default)]
  pub featured: bool,
  #[serde(default)]
  pub tags: Vec<String>,
  #[serde(default)]
  pub categories: Vec<Category>,
  #[serde(default)]
  pub author: Option<Author>,
  #[serde(default)]
  pub cover_image: Option<MediaAsset>,
}
