//! Device connection/operation state and the background status monitor.

mod monitor;

pub use monitor::{DeviceMonitor, MonitorHandle};

use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ConnectionState {
    Unknown,
    Connected,
    Disconnected,
}

impl ConnectionState {
    /// Maps the service's `connectionState` string.
    pub fn parse(value: &str) -> Self {
        match value {
            "Connected" => ConnectionState::Connected,
            "Disconnected" => ConnectionState::Disconnected,
            _ => ConnectionState::Unknown,
        }
    }

    fn code(self) -> u64 {
        match self {
            ConnectionState::Unknown => 0,
            ConnectionState::Connected => 1,
            ConnectionState::Disconnected => 2,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            1 => ConnectionState::Connected,
            2 => ConnectionState::Disconnected,
            _ => ConnectionState::Unknown,
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Unknown => "Unknown",
            ConnectionState::Connected => "Connected",
            ConnectionState::Disconnected => "Disconnected",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum OperationState {
    Unknown,
    Idle,
    StreamingImage,
    StreamingInferenceResult,
    StreamingBoth,
}

impl OperationState {
    /// Maps the service's `ApplicationProcessor` status string.
    pub fn parse(value: &str) -> Self {
        match value {
            "Idle" => OperationState::Idle,
            "StreamingImage" => OperationState::StreamingImage,
            "StreamingInferenceResult" => OperationState::StreamingInferenceResult,
            "StreamingBoth" => OperationState::StreamingBoth,
            _ => OperationState::Unknown,
        }
    }

    fn code(self) -> u64 {
        match self {
            OperationState::Unknown => 0,
            OperationState::Idle => 1,
            OperationState::StreamingImage => 2,
            OperationState::StreamingInferenceResult => 3,
            OperationState::StreamingBoth => 4,
        }
    }

    fn from_code(code: u64) -> Self {
        match code {
            1 => OperationState::Idle,
            2 => OperationState::StreamingImage,
            3 => OperationState::StreamingInferenceResult,
            4 => OperationState::StreamingBoth,
            _ => OperationState::Unknown,
        }
    }
}

impl fmt::Display for OperationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OperationState::Unknown => "Unknown",
            OperationState::Idle => "Idle",
            OperationState::StreamingImage => "StreamingImage",
            OperationState::StreamingInferenceResult => "StreamingInferenceResult",
            OperationState::StreamingBoth => "StreamingBoth",
        };
        f.write_str(name)
    }
}

/// One observation of the device, last writer wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct DeviceState {
    pub connection: ConnectionState,
    pub operation: OperationState,
    pub observed_at: SystemTime,
}

impl DeviceState {
    pub fn new(connection: ConnectionState, operation: OperationState) -> Self {
        Self {
            connection,
            operation,
            observed_at: SystemTime::now(),
        }
    }

    pub fn unknown() -> Self {
        Self::new(ConnectionState::Unknown, OperationState::Unknown)
    }

    pub fn is_unknown(&self) -> bool {
        self.connection == ConnectionState::Unknown && self.operation == OperationState::Unknown
    }

    /// The device is pushing inference results without images.
    pub fn is_streaming_inference(&self) -> bool {
        self.connection == ConnectionState::Connected
            && self.operation == OperationState::StreamingInferenceResult
    }
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} / {}", self.connection, self.operation)
    }
}

// -------------------- StateCell --------------------

const CONNECTION_SHIFT: u32 = 0;
const OPERATION_SHIFT: u32 = 4;
const TIME_SHIFT: u32 = 8;
const CODE_MASK: u64 = 0xF;

/// Single-writer, many-reader holder of the latest [`DeviceState`].
///
/// The whole state is packed into one `AtomicU64` (observation time in unix milliseconds
/// above bit 8, operation and connection codes in the low byte) so readers always see a
/// consistent triple without locking. A stored value of zero means nothing was observed.
#[derive(Debug, Default)]
pub struct StateCell {
    packed: AtomicU64,
}

impl StateCell {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, state: DeviceState) {
        self.packed.store(pack(&state), Ordering::Release);
    }

    pub fn load(&self) -> Option<DeviceState> {
        unpack(self.packed.load(Ordering::Acquire))
    }
}

fn pack(state: &DeviceState) -> u64 {
    let millis = state
        .observed_at
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
        // the low byte carries codes; keep at least 1 ms so a stored value is never zero
        .max(1);
    (millis << TIME_SHIFT)
        | (state.operation.code() << OPERATION_SHIFT)
        | (state.connection.code() << CONNECTION_SHIFT)
}

fn unpack(packed: u64) -> Option<DeviceState> {
    if packed == 0 {
        return None;
    }
    let millis = packed >> TIME_SHIFT;
    Some(DeviceState {
        connection: ConnectionState::from_code((packed >> CONNECTION_SHIFT) & CODE_MASK),
        operation: OperationState::from_code((packed >> OPERATION_SHIFT) & CODE_MASK),
        observed_at: UNIX_EPOCH + Duration::from_millis(millis),
    })
}
