//! AITRIOS device monitor
//!
//! Polls an AITRIOS edge device through the console REST API, decodes the binary object
//! detection records it uploads, pairs them with the captured images by timestamp and
//! renders the detections for display.
//!
//! # Architecture
//!
//! A [`session::Session`] runs two threads:
//!
//! 1. **Device monitor**: queries connection and operation state on a fixed interval and
//!    publishes every observation into a lock-free [`device::StateCell`].
//! 2. **Acquisition loop**: fetches the newest image and inference records, correlates
//!    them, decodes and renders.
//!
//! Both report through a bounded [`notify::Notifier`] channel drained by a single consumer
//! owned by the caller.
//!
//! # Module Structure
//!
//! - `table`: schema-agnostic reader for the offset-indexed binary table format
//! - `detect`: typed detection record decoder built on `table`
//! - `device`: device state types, state cell, monitor thread
//! - `remote`: `DeviceService` seam, AITRIOS HTTP client, OAuth2 token provider
//! - `session`: acquisition loop, correlation, cancellation, inference control
//! - `render`: detection overlay and label formatting
//! - `notify`: event channel to the presentation layer
//! - `config`: layered file and environment configuration

use anyhow::{anyhow, Result};
use std::sync::OnceLock;

pub mod config;
pub mod detect;
pub mod device;
pub mod notify;
pub mod remote;
pub mod render;
pub mod session;
pub mod table;

pub use config::MonitorConfig;
pub use detect::{decode_base64_record, decode_detections, BoundingBox, Detection};
pub use device::{ConnectionState, DeviceState, OperationState};
pub use notify::{Event, Notifier};
pub use remote::{AitriosClient, DeviceService, RemoteUnavailable};
pub use session::Session;
pub use table::MalformedBuffer;

/// Device ids are interpolated into request paths, so only a conservative set is accepted.
pub fn validate_device_id(device_id: &str) -> Result<()> {
    static DEVICE_ID_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = DEVICE_ID_RE.get_or_init(|| regex::Regex::new(r"^[A-Za-z0-9_.-]{1,128}$").unwrap());

    if !re.is_match(device_id) || device_id.chars().all(|c| c == '.') {
        return Err(anyhow!(
            "device_id must match ^[A-Za-z0-9_.-]{{1,128}}$ (got {:?})",
            device_id
        ));
    }
    Ok(())
}
