use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::{Client, StatusCode};
use std::time::Duration;
use url::Url;

use super::{GraphqlRequest, GraphqlResponse, Transport};
use crate::error::{Error, Result};

/// A single GraphQL endpoint reached over HTTP POST.
#[derive(Clone)]
pub struct HttpTransport {
  client: Client,
  endpoint: Url,
  label: String,
}

impl HttpTransport {
  /// Build a transport for `endpoint`. The bearer token, when present, is sent
  /// on every request (content API); the CDN replica is used without one.
  pub fn new(
    label: &str,
    endpoint: Url,
    token: Option<&str>,
    timeout: Duration,
  ) -> Result<Self> {
    let mut headers = HeaderMap::new();
    if let Some(token) = token {
      let value = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| Error::Config(format!("Invalid content token: {}", e)))?;
      headers.insert(AUTHORIZATION, value);
    }

    let client = Client::builder()
      .timeout(timeout)
      .gzip(true)
      .default_headers(headers)
      .user_agent(concat!("quire/", env!("CARGO_PKG_VERSION")))
      .build()
      .map_err(|e| Error::Config(format!("Failed to build HTTP client: {}", e)))?;

    Ok(Self {
      client,
      endpoint,
      label: label.to_string(),
    })
  }

  fn network_error(&self, e: &reqwest::Error) -> Error {
    let message = if e.is_timeout() {
      format!("request timed out: {}", e)
    } else {
      e.to_string()
    };
    Error::Network {
      endpoint: self.label.clone(),
      message,
    }
  }
}

#[async_trait]
impl Transport for HttpTransport {
  async fn execute(&self, request: &GraphqlRequest) -> Result<GraphqlResponse> {
    tracing::debug!(
      endpoint = %self.label,
      operation = request.operation_name,
      "POST GraphQL operation"
    );

    let response = self
      .client
      .post(self.endpoint.clone())
      .json(request)
      .send()
      .await
      .map_err(|e| self.network_error(&e))?;

    let status = response.status();
    let body = response
      .text()
      .await
      .map_err(|e| self.network_error(&e))?;

    classify_response(&self.label, status, &body)
  }

  fn label(&self) -> &str {
    &self.label
  }
}

/// Map an HTTP status and body onto the error taxonomy.
///
/// GraphQL servers report query errors with 200 (or 400 with an `errors`
/// body), so a parseable body wins over the status code except for 429.
fn classify_response(endpoint: &str, status: StatusCode, body: &str) -> Result<GraphqlResponse> {
  if status == StatusCode::TOO_MANY_REQUESTS {
    return Err(Error::RateLimited {
      attempts: 1,
      message: format!("HTTP 429 from {}", endpoint),
    });
  }

  if status.is_server_error() {
    return Err(Error::Status {
      endpoint: endpoint.to_string(),
      status: status.as_u16(),
      body: truncate(body),
    });
  }

  match serde_json::from_str::<GraphqlResponse>(body) {
    Ok(parsed) if parsed.data.is_some() || !parsed.errors.is_empty() => Ok(parsed),
    _ if !status.is_success() => Err(Error::Status {
      endpoint: endpoint.to_string(),
      status: status.as_u16(),
      body: truncate(body),
    }),
    Ok(_) => Err(Error::Validation(format!(
      "{} returned a body without data or errors",
      endpoint
    ))),
    Err(e) => Err(Error::Validation(format!(
      "{} returned malformed JSON: {}",
      endpoint, e
    ))),
  }
}

fn truncate(body: &str) -> String {
  body.chars().take(200).collect()
}
