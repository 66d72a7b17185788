//! Request classification.

use axum::http::header::ACCEPT;
use axum::http::Method;

use crate::network::GatewayRequest;

/// Which strategy answers a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
  /// Network-first with cache, then mock fallback
  Api,
  /// Network-first with offline page fallback
  Navigation,
  /// Cache-first
  StaticAsset,
}

impl Strategy {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Api => "api",
      Self::Navigation => "navigation",
      Self::StaticAsset => "static",
    }
  }
}

/// Classify a request. First match wins: API prefix, then navigation,
/// then everything else is a static asset.
pub fn classify(request: &GatewayRequest, api_prefix: &str) -> Strategy {
  if request.path().starts_with(api_prefix) {
    Strategy::Api
  } else if is_navigation(request) {
    Strategy::Navigation
  } else {
    Strategy::StaticAsset
  }
}

/// A page navigation, as the browser reports it.
///
/// `Sec-Fetch-Mode` is authoritative when present; older clients are
/// recognised by a `GET` that accepts HTML.
pub fn is_navigation(request: &GatewayRequest) -> bool {
  if let Some(mode) = request.header("sec-fetch-mode") {
    return mode.eq_ignore_ascii_case("navigate");
  }

  request.method == Method::GET
    && request
      .header(ACCEPT.as_str())
      .is_some_and(|accept| accept.contains("text/html"))
}
