use thiserror::Error;

use crate::transport::GraphqlError;

#[derive(Error, Debug, Clone)]
pub enum Error {
  /// The transport never got a response.
  #[error("Network failure calling {endpoint}: {message}")]
  Network { endpoint: String, message: String },

  /// Transient throttling that survived every retry (and failover, if any).
  #[error("Rate limited after {attempts} attempt(s): {message}")]
  RateLimited { attempts: u32, message: String },

  /// GraphQL-level errors. `data` holds whatever partial payload came back.
  #[error("GraphQL errors: {}", summarize(errors))]
  PartialData {
    errors: Vec<GraphqlError>,
    data: Option<serde_json::Value>,
  },

  /// HTTP error status. 5xx is retried; the rest is terminal.
  #[error("HTTP {status} from {endpoint}: {body}")]
  Status {
    endpoint: String,
    status: u16,
    body: String,
  },

  /// Invalid arguments or a response that doesn't match the expected shape.
  #[error("Validation failure: {0}")]
  Validation(String),

  #[error("Configuration error: {0}")]
  Config(String),

  #[error("Cache error: {0}")]
  Cache(String),
}

impl Error {
  /// Message used for transient-signature matching.
  pub fn signature_text(&self) -> String {
    match self {
      Error::Network { message, .. } => message.clone(),
      Error::RateLimited { message, .. } => message.clone(),
      Error::PartialData { errors, .. } => summarize(errors),
      Error::Status { body, .. } => body.clone(),
      Error::Validation(msg) | Error::Config(msg) | Error::Cache(msg) => msg.clone(),
    }
  }
}

fn summarize(errors: &[GraphqlError]) -> String {
  errors
    .iter()
    .map(|e| e.message.as_str())
    .collect::<Vec<_>>()
    .join("; ")
}

impl From<serde_json::Error> for Error {
  fn from(e: serde_json::Error) -> Self {
    Error::Cache(e.to_string())
  }
}

pub type Result<T> = std::result::Result<T, Error>;
