//! HTTP surface: proxied page traffic plus the `/__gateway` control endpoints.

use axum::{
  body::{Body, Bytes},
  extract::{Request, State},
  http::StatusCode,
  response::{IntoResponse, Response},
  routing::{get, post},
  Json, Router,
};
use color_eyre::{eyre::eyre, Result};
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{error, info, instrument};

use crate::config::Config;
use crate::gateway::{ControlMessage, GatewaySettings, Notification, NotificationClick, Registry};
use crate::network::{GatewayRequest, GatewayResponse};

/// Largest request body the gateway buffers before forwarding.
const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

#[derive(Clone)]
pub struct ServerState {
  pub registry: Arc<Registry>,
  pub config: Arc<RwLock<Config>>,
}

pub fn router(state: ServerState) -> Router {
  Router::new()
    .route("/__gateway/status", get(status))
    .route("/__gateway/message", post(message))
    .route("/__gateway/update", post(update))
    .route("/__gateway/push", post(push))
    .route("/__gateway/notificationclick", post(notification_click))
    .fallback(proxy)
    .with_state(state)
}

pub async fn serve(state: ServerState) -> Result<()> {
  let addr = state.config.read().await.listen;
  let listener = tokio::net::TcpListener::bind(addr)
    .await
    .map_err(|e| eyre!("Failed to bind {}: {}", addr, e))?;

  info!(%addr, "gateway listening");

  axum::serve(listener, router(state))
    .with_graceful_shutdown(shutdown_signal())
    .await
    .map_err(|e| eyre!("Server error: {}", e))
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!("shutting down");
  }
}

#[instrument(skip_all, fields(method = %request.method(), uri = %request.uri()))]
async fn proxy(State(state): State<ServerState>, request: Request) -> Response {
  let request = match into_gateway_request(request).await {
    Ok(request) => request,
    Err(e) => return (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response(),
  };

  into_response(state.registry.handle(&request).await)
}

async fn into_gateway_request(request: Request) -> Result<GatewayRequest> {
  let (parts, body) = request.into_parts();
  let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
    .await
    .map_err(|e| eyre!("Failed to read request body: {}", e))?;

  let url = parts
    .uri
    .path_and_query()
    .map(|pq| pq.as_str().to_string())
    .unwrap_or_else(|| "/".to_string());

  Ok(GatewayRequest {
    method: parts.method,
    url,
    headers: parts.headers,
    body,
  })
}

fn into_response(response: GatewayResponse) -> Response {
  let mut out = Response::new(Body::from(response.body));
  *out.status_mut() = response.status;
  *out.headers_mut() = response.headers;
  out
}

async fn status(State(state): State<ServerState>) -> impl IntoResponse {
  Json(state.registry.status().await)
}

async fn message(State(state): State<ServerState>, body: Bytes) -> Response {
  let message: ControlMessage = match serde_json::from_slice(&body) {
    Ok(message) => message,
    Err(e) => {
      return (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": format!("Invalid control message: {}", e) })),
      )
        .into_response();
    }
  };

  match state.registry.handle_message(message).await {
    Ok(activated) => Json(json!({ "activated": activated })).into_response(),
    Err(e) => {
      error!(error = %e, "control message failed");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
      )
        .into_response()
    }
  }
}

async fn update(State(state): State<ServerState>) -> Response {
  let result = async {
    let reloaded = state.config.read().await.reload()?;
    let outcome = state
      .registry
      .update(GatewaySettings::from(&reloaded))
      .await?;
    *state.config.write().await = reloaded;
    Ok::<_, color_eyre::Report>(outcome)
  }
  .await;

  match result {
    Ok(outcome) => Json(outcome).into_response(),
    Err(e) => {
      error!(error = %e, "update check failed");
      (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": e.to_string() })),
      )
        .into_response()
    }
  }
}

async fn push(body: Bytes) -> Json<Notification> {
  let payload = std::str::from_utf8(&body).ok();
  Json(Notification::from_push(payload))
}

async fn notification_click(body: Bytes) -> Response {
  if body.is_empty() {
    return Json(NotificationClick::default().outcome()).into_response();
  }

  match serde_json::from_slice::<NotificationClick>(&body) {
    Ok(click) => Json(click.outcome()).into_response(),
    Err(e) => (
      StatusCode::BAD_REQUEST,
      Json(json!({ "error": format!("Invalid notification click: {}", e) })),
    )
      .into_response(),
  }
}
