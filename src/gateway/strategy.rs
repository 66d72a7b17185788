//! The three request strategies.

use axum::http::{Method, StatusCode};
use tracing::{debug, warn};

use crate::cache::{CachedResponse, RequestKey};
use crate::network::{GatewayRequest, GatewayResponse};

use super::mock::{self, OfflineMarker};
use super::Gateway;

impl Gateway {
  /// Network-first for API calls.
  ///
  /// 1. Fetch; a 2xx to a GET is stored in the API partition and returned
  /// 2. Network error or non-2xx: serve the cached copy, marked `offline`
  /// 3. No cached copy: mock payload or 503
  ///
  /// Only GET responses are stored or replayed. Any other method that cannot
  /// reach the origin gets the 503 offline error.
  pub(super) async fn network_first_api(&self, request: &GatewayRequest) -> GatewayResponse {
    let key = request.key();
    let cacheable = is_cacheable(request);

    match self.fetcher.fetch(request).await {
      Ok(response) if response.is_success() => {
        if cacheable {
          self.store_copy(&self.settings.api_partition, &key, &response);
        }
        return response;
      }
      Ok(response) => {
        debug!(status = response.status.as_u16(), "api returned error status, falling back");
      }
      Err(e) => {
        debug!(error = %e, "api fetch failed, falling back");
      }
    }

    if !cacheable {
      return mock::offline_error();
    }

    if let Some(cached) = self.lookup(&self.settings.api_partition, &key) {
      debug!(outcome = "offline", cached_at = %cached.cached_at, "serving cached api response");
      return mock::mark(
        GatewayResponse::from_stored(cached.response),
        OfflineMarker::Offline,
      );
    }

    let response = mock::respond(request.path());
    debug!(status = response.status.as_u16(), "serving synthesized api response");
    response
  }

  /// Network-first for page navigations.
  ///
  /// Any network response is passed through, error statuses included. Only a
  /// network error falls back to: the cached page, the offline page, the
  /// root page, then a plain-text notice.
  pub(super) async fn network_first_page(&self, request: &GatewayRequest) -> GatewayResponse {
    let error = match self.fetcher.fetch(request).await {
      Ok(response) => return response,
      Err(e) => e,
    };
    debug!(error = %error, "navigation fetch failed, falling back");

    let candidates = [
      request.key(),
      RequestKey::get(self.settings.offline_page.clone()),
      RequestKey::get(self.settings.root_page.clone()),
    ];

    for key in &candidates {
      if let Some(cached) = self.lookup_any(key) {
        debug!(page = %key.url, "serving cached page");
        return GatewayResponse::from_stored(cached.response);
      }
    }

    GatewayResponse::text(StatusCode::SERVICE_UNAVAILABLE, "You are offline")
  }

  /// Cache-first for static assets.
  ///
  /// A hit never touches the network. A miss is fetched and a 2xx stored in
  /// the static partition. A miss with the network down is a 404. Requests
  /// other than GET are always forwarded and never stored.
  pub(super) async fn cache_first_static(&self, request: &GatewayRequest) -> GatewayResponse {
    let key = request.key();
    let cacheable = is_cacheable(request);

    if cacheable {
      if let Some(cached) = self.lookup(&self.settings.static_partition, &key) {
        debug!(outcome = "hit", "serving cached asset");
        return GatewayResponse::from_stored(cached.response);
      }
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => {
        if cacheable && response.is_success() {
          self.store_copy(&self.settings.static_partition, &key, &response);
        }
        response
      }
      Err(e) => {
        debug!(error = %e, "asset fetch failed with no cached copy");
        GatewayResponse::text(StatusCode::NOT_FOUND, "Resource not available offline")
      }
    }
  }

  /// Partition lookup that treats a store error as a miss.
  fn lookup(&self, partition: &str, key: &RequestKey) -> Option<CachedResponse> {
    self
      .store
      .get(partition, key)
      .unwrap_or_else(|e| {
        warn!(error = %e, %partition, %key, "cache lookup failed");
        None
      })
  }

  fn lookup_any(&self, key: &RequestKey) -> Option<CachedResponse> {
    self.store.match_any(key).unwrap_or_else(|e| {
      warn!(error = %e, %key, "cache lookup failed");
      None
    })
  }

  /// Store a copy of a live response. A failed write never affects the
  /// response already on its way to the page.
  fn store_copy(&self, partition: &str, key: &RequestKey, response: &GatewayResponse) {
    if let Err(e) = self.store.put(partition, key, &response.to_stored()) {
      warn!(error = %e, %partition, %key, "failed to cache response");
    }
  }
}

/// Only GET responses go through the cache.
fn is_cacheable(request: &GatewayRequest) -> bool {
  request.method == Method::GET
}
