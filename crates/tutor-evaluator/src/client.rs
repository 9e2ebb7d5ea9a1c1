//! Shared JSON-over-HTTP plumbing for the service clients.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{Result, ServiceError};

/// Fallback when a 429 carries no usable `retry-after`.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub(crate) struct HttpClient {
  client:       Client,
  base_url:     String,
  api_key:      Option<String>,
  timeout_secs: u64,
}

impl HttpClient {
  pub fn new(base_url: &str, api_key: Option<String>, timeout_secs: u64) -> Result<Self> {
    let client = Client::builder()
      .timeout(Duration::from_secs(timeout_secs))
      .build()
      .map_err(|e| ServiceError::Client(e.to_string()))?;
    Ok(Self { client, base_url: base_url.to_owned(), api_key, timeout_secs })
  }

  fn url(&self, path: &str) -> String {
    format!("{}{}", self.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
    match self.api_key.as_deref() {
      Some(key) if !key.is_empty() => req.bearer_auth(key),
      _ => req,
    }
  }

  /// `POST <base_url><path>` with a JSON body, mapping failures onto
  /// [`ServiceError`].
  pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
  where
    B: Serialize + ?Sized,
    R: DeserializeOwned,
  {
    let response = self
      .auth(self.client.post(self.url(path)))
      .json(body)
      .send()
      .await
      .map_err(|e| {
        if e.is_timeout() {
          ServiceError::Timeout(self.timeout_secs)
        } else {
          ServiceError::Network(e.to_string())
        }
      })?;

    let status = response.status();
    if status == StatusCode::TOO_MANY_REQUESTS {
      let retry_after = response
        .headers()
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
      return Err(ServiceError::RateLimited { retry_after_ms: retry_after.saturating_mul(1000) });
    }
    if status == StatusCode::UNAUTHORIZED {
      let body = response.text().await.unwrap_or_default();
      return Err(ServiceError::AuthenticationFailed(body));
    }
    if !status.is_success() {
      let body = response.text().await.unwrap_or_default();
      return Err(ServiceError::Api { status: status.as_u16(), message: body });
    }

    response.json().await.map_err(|e| ServiceError::Decode(e.to_string()))
  }
}
