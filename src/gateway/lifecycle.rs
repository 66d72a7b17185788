//! Install and activate phases of a worker.

use color_eyre::{eyre::eyre, Result};
use futures::future::{join_all, try_join_all};
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::RequestKey;
use crate::network::GatewayRequest;

use super::Gateway;

/// Lifecycle state of a worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
  /// Created, install not started
  Parsed,
  Installing,
  /// Installed and waiting to take control
  Installed,
  Activating,
  /// In control of all requests
  Activated,
  /// Failed to install, or replaced by a newer version
  Redundant,
}

impl Gateway {
  /// Install phase.
  ///
  /// Static paths are all-or-nothing: if any fetch fails or returns a
  /// non-2xx, the install fails and nothing is written. API paths are
  /// fetched independently and failures are only logged.
  pub async fn install(&self) -> Result<()> {
    self.set_state(WorkerState::Installing);

    let prepared = self
      .precache_static()
      .await
      .and_then(|()| self.store.open(&self.settings.api_partition));
    if let Err(e) = prepared {
      self.set_state(WorkerState::Redundant);
      return Err(e);
    }

    let cached = self.precache_api().await;

    info!(
      version = %self.settings.version,
      assets = self.settings.static_paths.len(),
      api_snapshots = cached,
      "worker installed"
    );

    self.set_state(WorkerState::Installed);
    Ok(())
  }

  async fn precache_static(&self) -> Result<()> {
    let partition = &self.settings.static_partition;

    let fetches = self.settings.static_paths.iter().map(|path| async move {
      let request = GatewayRequest::get(path.clone());
      let response = self
        .fetcher
        .fetch(&request)
        .await
        .map_err(|e| eyre!("Failed to pre-cache {}: {}", path, e))?;

      if !response.is_success() {
        return Err(eyre!(
          "Failed to pre-cache {}: status {}",
          path,
          response.status
        ));
      }

      Ok::<_, color_eyre::Report>((RequestKey::get(path.clone()), response.to_stored()))
    });

    let entries = try_join_all(fetches).await?;
    self.store.put_all(partition, &entries)
  }

  /// Returns how many API snapshots were stored.
  async fn precache_api(&self) -> usize {
    let partition = &self.settings.api_partition;

    let attempts = self.settings.api_paths.iter().map(|path| async move {
      let request = GatewayRequest::get(path.clone());
      let result = match self.fetcher.fetch(&request).await {
        Ok(response) if response.is_success() => self
          .store
          .put(partition, &request.key(), &response.to_stored()),
        Ok(response) => Err(eyre!("status {}", response.status)),
        Err(e) => Err(e),
      };

      match result {
        Ok(()) => true,
        Err(e) => {
          warn!(%path, error = %e, "failed to pre-cache api route");
          false
        }
      }
    });

    join_all(attempts)
      .await
      .into_iter()
      .filter(|stored| *stored)
      .count()
  }

  /// Activate phase: drop every partition that does not belong to this
  /// version. Returns the names of the deleted partitions.
  pub fn activate(&self) -> Result<Vec<String>> {
    self.set_state(WorkerState::Activating);

    let keep = [
      self.settings.static_partition.as_str(),
      self.settings.api_partition.as_str(),
    ];

    let mut deleted = Vec::new();
    for name in self.store.partitions()? {
      if keep.contains(&name.as_str()) {
        continue;
      }
      self.store.delete_partition(&name)?;
      info!(partition = %name, "deleted stale cache partition");
      deleted.push(name);
    }

    self.set_state(WorkerState::Activated);
    info!(version = %self.settings.version, "worker activated");
    Ok(deleted)
  }
}
