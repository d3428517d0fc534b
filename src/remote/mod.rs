//! Remote device service: the [`DeviceService`] seam and its AITRIOS HTTP implementation.

mod aitrios;
mod token;
mod types;

pub use aitrios::AitriosClient;
pub use token::{ClientCredentials, StaticToken, TokenProvider, TokenSource};
pub use types::{CommandOutcome, DeviceInfo, ImageEntry, Inference};

use anyhow::Result;
use std::fmt;

use crate::device::{ConnectionState, OperationState};

/// Everything the session needs from the remote service.
///
/// Implementations must apply their own request timeouts; the session never interrupts an
/// in-flight call.
pub trait DeviceService: Send + Sync {
    /// Current `(connection, operation)` pair; values the service does not report are `Unknown`.
    fn device_state(&self) -> Result<(ConnectionState, OperationState)>;

    /// Image sub-directory names of this device, in service order (oldest first).
    fn image_directories(&self) -> Result<Vec<String>>;

    /// Most recent image in `sub_directory`, if any.
    fn latest_image(&self, sub_directory: &str) -> Result<Option<ImageEntry>>;

    /// Up to `count` most recent inference records, flattened in received order.
    fn inference_results(&self, count: usize) -> Result<Vec<Inference>>;

    fn start_inference(&self) -> Result<CommandOutcome>;

    fn stop_inference(&self) -> Result<CommandOutcome>;
}

/// Transport failure or non-success HTTP status from the remote service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteUnavailable {
    pub endpoint: String,
    pub detail: String,
}

impl RemoteUnavailable {
    pub fn new(endpoint: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for RemoteUnavailable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "remote unavailable ({}): {}", self.endpoint, self.detail)
    }
}

impl std::error::Error for RemoteUnavailable {}
