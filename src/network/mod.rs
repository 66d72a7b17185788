//! Network layer: the `Fetcher` seam and the upstream HTTP client.

mod client;
mod types;

use async_trait::async_trait;
use color_eyre::Result;

pub use client::UpstreamClient;
pub use types::{GatewayRequest, GatewayResponse};

/// Anything that can perform a request against the origin.
///
/// `Err` means the network itself failed (connection refused, DNS, timeout).
/// A response with an error status is still `Ok`.
#[async_trait]
pub trait Fetcher: Send + Sync {
  async fn fetch(&self, request: &GatewayRequest) -> Result<GatewayResponse>;
}
