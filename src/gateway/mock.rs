//! Canned payloads served when neither network nor cache can answer.

use axum::http::StatusCode;
use serde_json::{json, Value};

use crate::network::GatewayResponse;

/// Header marking a response that did not come from the network.
pub const OFFLINE_HEADER: &str = "x-offline-cache";

/// Values of [`OFFLINE_HEADER`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OfflineMarker {
  /// Cached copy served while the network is down
  Offline,
  /// Canned payload from the mock table
  OfflineMock,
  /// Nothing available
  OfflineError,
}

impl OfflineMarker {
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Offline => "offline",
      Self::OfflineMock => "offline-mock",
      Self::OfflineError => "offline-error",
    }
  }
}

pub fn mark(response: GatewayResponse, marker: OfflineMarker) -> GatewayResponse {
  response.with_header(OFFLINE_HEADER, marker.as_str())
}

/// Mock payload for an API path, if the table has one.
pub fn lookup(path: &str) -> Option<Value> {
  match path {
    "/api/rooms/status" => Some(json!({
      "total": 28,
      "available": 15,
      "occupied": 8,
      "maintenance": 2,
      "cleaning": 3,
      "offline": true
    })),
    "/api/dashboard/stats" => Some(json!({
      "totalRooms": 28,
      "occupiedRooms": 8,
      "availableRooms": 15,
      "todayCheckIns": 4,
      "todayCheckOuts": 3,
      "occupancyRate": 28.6,
      "offline": true
    })),
    _ => None,
  }
}

pub fn offline_error_body() -> Value {
  json!({
    "error": "Network unavailable",
    "message": "This data is not available offline",
    "offline": true
  })
}

/// Last-resort answer for an API request: mock payload or a 503.
pub fn respond(path: &str) -> GatewayResponse {
  match lookup(path) {
    Some(body) => mark(
      GatewayResponse::json(StatusCode::OK, &body),
      OfflineMarker::OfflineMock,
    ),
    None => offline_error(),
  }
}

/// 503 telling the page the request could not be answered offline.
pub fn offline_error() -> GatewayResponse {
  mark(
    GatewayResponse::json(StatusCode::SERVICE_UNAVAILABLE, &offline_error_body()),
    OfflineMarker::OfflineError,
  )
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_known_paths_are_mocked() {
    for path in ["/api/rooms/status", "/api/dashboard/stats"] {
      let response = respond(path);
      assert_eq!(response.status, StatusCode::OK);
      assert_eq!(response.header(OFFLINE_HEADER), Some("offline-mock"));

      let body: Value = serde_json::from_slice(&response.body).unwrap();
      assert_eq!(Some(body), lookup(path));
    }
  }

  #[test]
  fn test_unknown_path_is_503() {
    let response = respond("/api/reservations/17");
    assert_eq!(response.status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(response.header(OFFLINE_HEADER), Some("offline-error"));

    let body: Value = serde_json::from_slice(&response.body).unwrap();
    assert_eq!(body, offline_error_body());
  }

  #[test]
  fn test_lookup_is_exact() {
    assert!(lookup("/api/rooms/status/").is_none());
    assert!(lookup("/api/rooms").is_none());
  }
}
