//! Request and response values passed between the gateway and the network.

use axum::http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use axum::http::{HeaderMap, Method, StatusCode};
use bytes::Bytes;

use crate::cache::{RequestKey, StoredResponse};

/// An intercepted request, detached from any particular HTTP server.
#[derive(Debug, Clone)]
pub struct GatewayRequest {
  pub method: Method,
  /// Path and query, e.g. `/api/rooms?floor=2`
  pub url: String,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl GatewayRequest {
  pub fn new(method: Method, url: impl Into<String>) -> Self {
    Self {
      method,
      url: url.into(),
      headers: HeaderMap::new(),
      body: Bytes::new(),
    }
  }

  pub fn get(url: impl Into<String>) -> Self {
    Self::new(Method::GET, url)
  }

  /// Add a header, ignoring values that are not valid header text.
  #[cfg(test)]
  pub fn with_header(mut self, name: &'static str, value: &str) -> Self {
    if let Ok(value) = HeaderValue::from_str(value) {
      self.headers.insert(HeaderName::from_static(name), value);
    }
    self
  }

  /// The URL without its query string.
  pub fn path(&self) -> &str {
    self.url.split(['?', '#']).next().unwrap_or(&self.url)
  }

  pub fn key(&self) -> RequestKey {
    RequestKey::new(&self.method, self.url.clone())
  }

  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }
}

/// A response produced by the network, the cache or the gateway itself.
#[derive(Debug, Clone)]
pub struct GatewayResponse {
  pub status: StatusCode,
  pub headers: HeaderMap,
  pub body: Bytes,
}

impl GatewayResponse {
  pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
    Self {
      status,
      headers: HeaderMap::new(),
      body: body.into(),
    }
  }

  pub fn text(status: StatusCode, body: &'static str) -> Self {
    Self::new(status, body).with_header(CONTENT_TYPE.as_str(), "text/plain; charset=utf-8")
  }

  pub fn json(status: StatusCode, body: &serde_json::Value) -> Self {
    Self::new(status, body.to_string()).with_header(CONTENT_TYPE.as_str(), "application/json")
  }

  /// Set a header, replacing any previous value.
  pub fn with_header(mut self, name: &str, value: &str) -> Self {
    if let (Ok(name), Ok(value)) = (
      HeaderName::from_bytes(name.as_bytes()),
      HeaderValue::from_str(value),
    ) {
      self.headers.insert(name, value);
    }
    self
  }

  pub fn is_success(&self) -> bool {
    self.status.is_success()
  }

  #[cfg(test)]
  pub fn header(&self, name: &str) -> Option<&str> {
    self.headers.get(name).and_then(|v| v.to_str().ok())
  }

  /// Snapshot for the cache store. Non-text header values are dropped.
  pub fn to_stored(&self) -> StoredResponse {
    StoredResponse {
      status: self.status.as_u16(),
      headers: self
        .headers
        .iter()
        .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
        .collect(),
      body: self.body.clone(),
    }
  }

  pub fn from_stored(stored: StoredResponse) -> Self {
    let mut headers = HeaderMap::new();
    for (name, value) in &stored.headers {
      if let (Ok(name), Ok(value)) = (
        HeaderName::from_bytes(name.as_bytes()),
        HeaderValue::from_str(value),
      ) {
        headers.append(name, value);
      }
    }

    Self {
      status: StatusCode::from_u16(stored.status).unwrap_or(StatusCode::OK),
      headers,
      body: stored.body,
    }
  }
}
