//! GraphQL transport: wire types, the HTTP endpoint client, and the
//! retrying/failover composite that the CMS client talks to.

mod http;
mod retry;

pub use http::HttpTransport;
pub use retry::{default_signatures, retry, RetryPolicy};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::error::{Error, Result};

/// A GraphQL operation as sent on the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphqlRequest {
  pub query: &'static str,
  pub variables: Map<String, Value>,
  pub operation_name: &'static str,
}

impl GraphqlRequest {
  pub fn new(operation_name: &'static str, query: &'static str) -> Self {
    Self {
      query,
      variables: Map::new(),
      operation_name,
    }
  }

  pub fn var(mut self, name: &str, value: impl Into<Value>) -> Self {
    self.variables.insert(name.to_string(), value.into());
    self
  }

  /// Read an integer variable (used by test transports).
  pub fn int_var(&self, name: &str) -> Option<u64> {
    self.variables.get(name).and_then(Value::as_u64)
  }

  pub fn str_var(&self, name: &str) -> Option<&str> {
    self.variables.get(name).and_then(Value::as_str)
  }
}

/// A single entry of the `errors` array.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
  pub message: String,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub path: Option<Vec<Value>>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub extensions: Option<Value>,
}

impl GraphqlError {
  pub fn new(message: impl Into<String>) -> Self {
    Self {
      message: message.into(),
      path: None,
      extensions: None,
    }
  }
}

/// `{data, errors?}` response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphqlResponse {
  #[serde(default)]
  pub data: Option<Value>,
  #[serde(default)]
  pub errors: Vec<GraphqlError>,
}

impl GraphqlResponse {
  pub fn ok(data: Value) -> Self {
    Self {
      data: Some(data),
      errors: Vec::new(),
    }
  }

  /// Turn a response without usable data into an error. Responses that carry
  /// data are passed through with their errors attached.
  pub fn into_result(self) -> Result<Self> {
    match &self.data {
      Some(data) if !data.is_null() => Ok(self),
      _ if self.errors.is_empty() => Err(Error::Validation(
        "response has neither data nor errors".to_string(),
      )),
      _ => Err(Error::PartialData {
        errors: self.errors,
        data: None,
      }),
    }
  }
}

/// Something that can execute a GraphQL operation.
#[async_trait]
pub trait Transport: Send + Sync {
  async fn execute(&self, request: &GraphqlRequest) -> Result<GraphqlResponse>;

  /// Human-readable endpoint label for logs.
  fn label(&self) -> &str;
}

/// Primary endpoint with retry, plus a single failover attempt against the
/// secondary endpoint for rate-limit/timeout failures.
pub struct GraphqlTransport {
  primary: Arc<dyn Transport>,
  secondary: Option<Arc<dyn Transport>>,
  policy: RetryPolicy,
}

impl GraphqlTransport {
  pub fn new(primary: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
    Self {
      primary,
      secondary: None,
      policy,
    }
  }

  pub fn with_secondary(mut self, secondary: Arc<dyn Transport>) -> Self {
    self.secondary = Some(secondary);
    self
  }

  pub fn policy(&self) -> &RetryPolicy {
    &self.policy
  }
}

#[async_trait]
impl Transport for GraphqlTransport {
  async fn execute(&self, request: &GraphqlRequest) -> Result<GraphqlResponse> {
    let primary = Arc::clone(&self.primary);
    let result = retry(&self.policy, request.operation_name, || {
      let primary = Arc::clone(&primary);
      async move { primary.execute(request).await?.into_result() }
    })
    .await;

    let err = match result {
      Ok(response) => return Ok(response),
      Err(err) => err,
    };

    match &self.secondary {
      Some(secondary) if self.policy.is_failover_eligible(&err) => {
        tracing::warn!(
          operation = request.operation_name,
          from = self.primary.label(),
          to = secondary.label(),
          error = %err,
          "Primary endpoint exhausted, failing over"
        );
        secondary.execute(request).await?.into_result()
      }
      _ => Err(err),
    }
  }

  fn label(&self) -> &str {
    self.primary.label()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::time::Duration;

  /// Transport that always answers with the same scripted result.
  struct Scripted {
    name: &'static str,
    calls: AtomicU32,
    reply: fn() -> Result<GraphqlResponse>,
  }

  impl Scripted {
    fn new(name: &'static str, reply: fn() -> Result<GraphqlResponse>) -> Arc<Self> {
      Arc::new(Self {
        name,
        calls: AtomicU32::new(0),
        reply,
      })
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Transport for Scripted {
    async fn execute(&self, _request: &GraphqlRequest) -> Result<GraphqlResponse> {
      self.calls.fetch_add(1, Ordering::SeqCst);
      (self.reply)()
    }

    fn label(&self) -> &str {
      self.name
    }
  }

  fn fast_policy() -> RetryPolicy {
    RetryPolicy {
      base_delay: Duration::ZERO,
      max_delay: Duration::ZERO,
      ..RetryPolicy::default()
    }
  }

  fn rate_limited() -> Result<GraphqlResponse> {
    Ok(GraphqlResponse {
      data: None,
      errors: vec![GraphqlError::new("Rate limit exceeded, slow down")],
    })
  }

  fn posts_ok() -> Result<GraphqlResponse> {
    Ok(GraphqlResponse::ok(json!({ "posts": [] })))
  }

  fn request() -> GraphqlRequest {
    GraphqlRequest::new("GetRecentPosts", "query GetRecentPosts { posts { slug } }")
  }

  #[tokio::test]
  async fn test_rate_limit_without_secondary_is_terminal() {
    let primary = Scripted::new("cdn", rate_limited);
    let transport = GraphqlTransport::new(primary.clone(), fast_policy());

    let err = transport.execute(&request()).await.unwrap_err();

    assert!(matches!(err, Error::RateLimited { attempts: 3, .. }));
    assert_eq!(primary.calls(), transport.policy().max_retries() + 1);
  }

  #[tokio::test]
  async fn test_failover_reissues_once_against_secondary() {
    let primary = Scripted::new("cdn", rate_limited);
    let secondary = Scripted::new("content", posts_ok);
    let transport =
      GraphqlTransport::new(primary.clone(), fast_policy()).with_secondary(secondary.clone());

    let response = transport.execute(&request()).await.unwrap();

    assert_eq!(response.data, Some(json!({ "posts": [] })));
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
  }

  #[tokio::test]
  async fn test_no_failover_for_non_transient_errors() {
    let primary = Scripted::new("cdn", || {
      Err(Error::Status {
        endpoint: "cdn".to_string(),
        status: 401,
        body: "unauthorized".to_string(),
      })
    });
    let secondary = Scripted::new("content", posts_ok);
    let transport =
      GraphqlTransport::new(primary.clone(), fast_policy()).with_secondary(secondary.clone());

    let err = transport.execute(&request()).await.unwrap_err();

    assert!(matches!(err, Error::Status { status: 401, .. }));
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
  }

  #[tokio::test]
  async fn test_unavailable_primary_fails_over() {
    let primary = Scripted::new("cdn", || {
      Err(Error::Status {
        endpoint: "cdn".to_string(),
        status: 503,
        body: "service unavailable".to_string(),
      })
    });
    let secondary = Scripted::new("content", posts_ok);
    let transport =
      GraphqlTransport::new(primary.clone(), fast_policy()).with_secondary(secondary.clone());

    let response = transport.execute(&request()).await.unwrap();

    assert_eq!(response.data, Some(json!({ "posts": [] })));
    assert_eq!(primary.calls(), 3);
    assert_eq!(secondary.calls(), 1);
  }

  #[test]
  fn test_into_result_keeps_partial_data() {
    let response = GraphqlResponse {
      data: Some(json!({ "posts": [] })),
      errors: vec![GraphqlError::new("field author: not found")],
    };

    let response = response.into_result().unwrap();
    assert_eq!(response.errors.len(), 1);

    let empty = GraphqlResponse {
      data: Some(Value::Null),
      errors: vec![GraphqlError::new("boom")],
    };
    assert!(matches!(
      empty.into_result(),
      Err(Error::PartialData { data: None, .. })
    ));
  }
}
