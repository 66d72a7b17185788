use async_trait::async_trait;
use axum::http::header::{self, HeaderMap, HeaderName};
use color_eyre::{eyre::eyre, Result};
use std::time::Duration;
use tracing::debug;
use url::Url;

use crate::config::NetworkConfig;

use super::types::{GatewayRequest, GatewayResponse};
use super::Fetcher;

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
  header::CONNECTION,
  header::HOST,
  header::PROXY_AUTHORIZATION,
  header::TE,
  header::TRAILER,
  header::TRANSFER_ENCODING,
  header::UPGRADE,
];

/// Upstream origin client
#[derive(Clone)]
pub struct UpstreamClient {
  client: reqwest::Client,
  base: Url,
}

impl UpstreamClient {
  pub fn new(config: &NetworkConfig) -> Result<Self> {
    let base = Url::parse(&config.upstream)
      .map_err(|e| eyre!("Invalid upstream URL '{}': {}", config.upstream, e))?;

    let client = reqwest::Client::builder()
      .timeout(Duration::from_secs(config.timeout_secs))
      .redirect(reqwest::redirect::Policy::none())
      .build()
      .map_err(|e| eyre!("Failed to create HTTP client: {}", e))?;

    Ok(Self { client, base })
  }

  /// Resolve an origin-relative URL against the upstream base.
  fn resolve(&self, url: &str) -> Result<Url> {
    self
      .base
      .join(url)
      .map_err(|e| eyre!("Failed to resolve {} against {}: {}", url, self.base, e))
  }
}

fn strip_hop_by_hop(headers: &HeaderMap) -> HeaderMap {
  let mut headers = headers.clone();
  for name in &HOP_BY_HOP {
    headers.remove(name);
  }
  headers
}

#[async_trait]
impl Fetcher for UpstreamClient {
  async fn fetch(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
    let url = self.resolve(&request.url)?;

    let response = self
      .client
      .request(request.method.clone(), url.clone())
      .headers(strip_hop_by_hop(&request.headers))
      .body(request.body.clone())
      .send()
      .await
      .map_err(|e| eyre!("Failed to fetch {}: {}", url, e))?;

    let status = response.status();
    let headers = strip_hop_by_hop(response.headers());
    let body = response
      .bytes()
      .await
      .map_err(|e| eyre!("Failed to read body of {}: {}", url, e))?;

    debug!(%url, status = status.as_u16(), bytes = body.len(), "upstream response");

    Ok(GatewayResponse {
      status,
      headers,
      body,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn client(upstream: &str) -> UpstreamClient {
    UpstreamClient::new(&NetworkConfig {
      upstream: upstream.to_string(),
      timeout_secs: 1,
    })
    .unwrap()
  }

  #[test]
  fn test_resolve_keeps_query() {
    let url = client("http://pms.local:3000").resolve("/api/rooms?floor=2").unwrap();
    assert_eq!(url.as_str(), "http://pms.local:3000/api/rooms?floor=2");
  }

  #[test]
  fn test_invalid_upstream() {
    assert!(UpstreamClient::new(&NetworkConfig {
      upstream: "::nope".to_string(),
      timeout_secs: 1,
    })
    .is_err());
  }

  #[test]
  fn test_strip_hop_by_hop() {
    let mut headers = HeaderMap::new();
    headers.insert(header::HOST, "localhost:8080".parse().unwrap());
    headers.insert(header::CONNECTION, "keep-alive".parse().unwrap());
    headers.insert(header::ACCEPT, "text/html".parse().unwrap());

    let stripped = strip_hop_by_hop(&headers);
    assert!(stripped.get(header::HOST).is_none());
    assert!(stripped.get(header::CONNECTION).is_none());
    assert_eq!(stripped.get(header::ACCEPT).unwrap(), "text/html");
  }

  #[tokio::test]
  async fn test_unreachable_upstream_is_error() {
    // Port 9 (discard) is not listening on loopback in test environments
    let result = client("http://127.0.0.1:9").fetch(&GatewayRequest::get("/")).await;
    assert!(result.is_err());
  }
}
