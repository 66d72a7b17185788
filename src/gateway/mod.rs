//! The offline cache gateway.
//!
//! A [`Gateway`] is one versioned worker: it owns the names of its two
//! partitions and the pre-cache lists, and answers intercepted requests
//! with one of three strategies. The [`Registry`] decides which worker is
//! in control and drives install/activate.

mod lifecycle;
mod mock;
mod notify;
mod registry;
mod routing;
mod strategy;

use std::sync::{Arc, Mutex};
use tracing::{debug, instrument};

use crate::cache::CacheStore;
use crate::config::Config;
use crate::network::{Fetcher, GatewayRequest, GatewayResponse};

pub use lifecycle::WorkerState;
pub use mock::OFFLINE_HEADER;
pub use notify::{Notification, NotificationClick};
pub use registry::{ControlMessage, Registry};
use routing::{classify, Strategy};

/// Fixed configuration of one worker version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewaySettings {
  pub version: String,
  pub static_partition: String,
  pub api_partition: String,
  pub api_prefix: String,
  pub offline_page: String,
  pub root_page: String,
  pub static_paths: Vec<String>,
  pub api_paths: Vec<String>,
  pub skip_waiting_on_install: bool,
}

impl From<&Config> for GatewaySettings {
  fn from(config: &Config) -> Self {
    Self {
      version: config.cache.version.clone(),
      static_partition: config.cache.static_partition(),
      api_partition: config.cache.api_partition(),
      api_prefix: config.routing.api_prefix.clone(),
      offline_page: config.routing.offline_page.clone(),
      root_page: config.routing.root_page.clone(),
      static_paths: config.precache.static_paths.clone(),
      api_paths: config.precache.api_paths.clone(),
      skip_waiting_on_install: config.lifecycle.skip_waiting_on_install,
    }
  }
}

/// One worker version of the gateway.
pub struct Gateway {
  settings: GatewaySettings,
  store: Arc<dyn CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  state: Mutex<WorkerState>,
}

impl Gateway {
  pub fn new(
    settings: GatewaySettings,
    store: Arc<dyn CacheStore>,
    fetcher: Arc<dyn Fetcher>,
  ) -> Self {
    Self {
      settings,
      store,
      fetcher,
      state: Mutex::new(WorkerState::Parsed),
    }
  }

  pub fn settings(&self) -> &GatewaySettings {
    &self.settings
  }

  pub fn version(&self) -> &str {
    &self.settings.version
  }

  pub fn state(&self) -> WorkerState {
    self
      .state
      .lock()
      .map(|s| *s)
      .unwrap_or(WorkerState::Redundant)
  }

  pub(crate) fn set_state(&self, next: WorkerState) {
    if let Ok(mut state) = self.state.lock() {
      debug!(version = %self.settings.version, from = ?*state, to = ?next, "worker state");
      *state = next;
    }
  }

  /// Answer an intercepted request. Never fails: every failure path ends in
  /// a synthesized response.
  #[instrument(skip_all, fields(method = %request.method, url = %request.url))]
  pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
    let strategy = classify(request, &self.settings.api_prefix);
    debug!(strategy = strategy.as_str(), "routing request");

    match strategy {
      Strategy::Api => self.network_first_api(request).await,
      Strategy::Navigation => self.network_first_page(request).await,
      Strategy::StaticAsset => self.cache_first_static(request).await,
    }
  }
}

#[cfg(test)]
pub(crate) mod testing {
  //! Fake network layer shared by the gateway tests.

  use async_trait::async_trait;
  use axum::http::StatusCode;
  use color_eyre::{eyre::eyre, Result};
  use std::collections::HashMap;
  use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
  use std::sync::{Arc, Mutex};

  use super::{Gateway, GatewaySettings};
  use crate::cache::MemoryStore;
  use crate::config::Config;
  use crate::network::{Fetcher, GatewayRequest, GatewayResponse};

  /// Origin double: serves fixed routes, counts requests, can go offline.
  #[derive(Default)]
  pub struct FakeOrigin {
    routes: Mutex<HashMap<String, (StatusCode, String)>>,
    offline: AtomicBool,
    requests: AtomicUsize,
  }

  impl FakeOrigin {
    pub fn new() -> Arc<Self> {
      Arc::new(Self::default())
    }

    pub fn route(&self, url: &str, status: StatusCode, body: &str) {
      self
        .routes
        .lock()
        .unwrap()
        .insert(url.to_string(), (status, body.to_string()));
    }

    pub fn set_offline(&self, offline: bool) {
      self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn requests(&self) -> usize {
      self.requests.load(Ordering::SeqCst)
    }
  }

  #[async_trait]
  impl Fetcher for FakeOrigin {
    async fn fetch(&self, request: &GatewayRequest) -> Result<GatewayResponse> {
      self.requests.fetch_add(1, Ordering::SeqCst);

      if self.offline.load(Ordering::SeqCst) {
        return Err(eyre!("connection refused"));
      }

      let routes = self.routes.lock().unwrap();
      Ok(match routes.get(&request.url) {
        Some((status, body)) => GatewayResponse::new(*status, body.clone()),
        None => GatewayResponse::new(StatusCode::NOT_FOUND, "not found"),
      })
    }
  }

  pub fn settings() -> GatewaySettings {
    GatewaySettings::from(&Config::default())
  }

  pub fn gateway(origin: &Arc<FakeOrigin>) -> (Gateway, Arc<MemoryStore>) {
    gateway_with(settings(), origin)
  }

  pub fn gateway_with(
    settings: GatewaySettings,
    origin: &Arc<FakeOrigin>,
  ) -> (Gateway, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let gateway = Gateway::new(settings, store.clone(), origin.clone());
    (gateway, store)
  }
}
