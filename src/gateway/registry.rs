//! Worker registration: which version is in control, which one waits.

use axum::http::StatusCode;
use color_eyre::Result;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::cache::CacheStore;
use crate::network::{Fetcher, GatewayRequest, GatewayResponse};

use super::{Gateway, GatewaySettings, WorkerState};

/// Message posted by the hosting page on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum ControlMessage {
  /// Activate the waiting worker without waiting for a reload
  #[serde(rename = "SKIP_WAITING")]
  SkipWaiting,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkerStatus {
  pub version: String,
  pub state: WorkerState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistryStatus {
  pub active: Option<WorkerStatus>,
  pub waiting: Option<WorkerStatus>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "version")]
pub enum UpdateOutcome {
  /// Active (or waiting) worker already runs this version
  UpToDate(String),
  Activated(String),
  Waiting(String),
}

/// Holds the active and waiting workers.
///
/// Install and activate run under a single lifecycle lock so two versions
/// never interleave their setup.
pub struct Registry {
  store: Arc<dyn CacheStore>,
  fetcher: Arc<dyn Fetcher>,
  active: RwLock<Option<Arc<Gateway>>>,
  waiting: RwLock<Option<Arc<Gateway>>>,
  lifecycle: Mutex<()>,
}

impl Registry {
  pub fn new(store: Arc<dyn CacheStore>, fetcher: Arc<dyn Fetcher>) -> Self {
    Self {
      store,
      fetcher,
      active: RwLock::new(None),
      waiting: RwLock::new(None),
      lifecycle: Mutex::new(()),
    }
  }

  /// Install a new worker version.
  ///
  /// It takes control at once when nothing is active or when the version
  /// skips waiting; otherwise it becomes the waiting worker.
  pub async fn register(&self, settings: GatewaySettings) -> Result<UpdateOutcome> {
    let _guard = self.lifecycle.lock().await;
    self.register_locked(settings).await
  }

  /// Register a version unless it is already active or waiting.
  pub async fn update(&self, settings: GatewaySettings) -> Result<UpdateOutcome> {
    let _guard = self.lifecycle.lock().await;

    let runs = |slot: &Option<Arc<Gateway>>| {
      slot
        .as_ref()
        .is_some_and(|gateway| *gateway.settings() == settings)
    };

    let known = runs(&*self.active.read().await) || runs(&*self.waiting.read().await);
    if known {
      return Ok(UpdateOutcome::UpToDate(settings.version));
    }

    self.register_locked(settings).await
  }

  /// Caller holds the lifecycle lock.
  async fn register_locked(&self, settings: GatewaySettings) -> Result<UpdateOutcome> {
    let version = settings.version.clone();
    let skip_waiting = settings.skip_waiting_on_install;
    let gateway = Arc::new(Gateway::new(
      settings,
      Arc::clone(&self.store),
      Arc::clone(&self.fetcher),
    ));

    gateway.install().await?;

    let has_active = self.active.read().await.is_some();
    if skip_waiting || !has_active {
      self.promote(gateway).await?;
      return Ok(UpdateOutcome::Activated(version));
    }

    if let Some(previous) = self.waiting.write().await.replace(gateway) {
      previous.set_state(WorkerState::Redundant);
    }
    info!(%version, "worker installed, waiting to activate");
    Ok(UpdateOutcome::Waiting(version))
  }

  /// Activate the waiting worker. Returns whether there was one.
  pub async fn skip_waiting(&self) -> Result<bool> {
    let _guard = self.lifecycle.lock().await;

    let waiting = self.waiting.write().await.take();
    match waiting {
      Some(gateway) => {
        self.promote(gateway).await?;
        Ok(true)
      }
      None => Ok(false),
    }
  }

  pub async fn handle_message(&self, message: ControlMessage) -> Result<bool> {
    match message {
      ControlMessage::SkipWaiting => self.skip_waiting().await,
    }
  }

  /// Activate a worker and claim every client for it. Caller holds the
  /// lifecycle lock.
  async fn promote(&self, gateway: Arc<Gateway>) -> Result<()> {
    if let Err(e) = gateway.activate() {
      gateway.set_state(WorkerState::Redundant);
      return Err(e);
    }

    if let Some(previous) = self.active.write().await.replace(gateway) {
      previous.set_state(WorkerState::Redundant);
    }
    Ok(())
  }

  pub async fn active(&self) -> Option<Arc<Gateway>> {
    self.active.read().await.clone()
  }

  /// Route a request through the active worker. With no worker in control
  /// the request goes straight to the network.
  pub async fn handle(&self, request: &GatewayRequest) -> GatewayResponse {
    if let Some(gateway) = self.active().await {
      return gateway.handle(request).await;
    }

    match self.fetcher.fetch(request).await {
      Ok(response) => response,
      Err(e) => {
        warn!(error = %e, url = %request.url, "uncontrolled request failed");
        GatewayResponse::text(StatusCode::BAD_GATEWAY, "Upstream unavailable")
      }
    }
  }

  pub async fn status(&self) -> RegistryStatus {
    let describe = |gateway: &Arc<Gateway>| WorkerStatus {
      version: gateway.version().to_string(),
      state: gateway.state(),
    };

    RegistryStatus {
      active: self.active.read().await.as_ref().map(describe),
      waiting: self.waiting.read().await.as_ref().map(describe),
    }
  }
}
