use anyhow::Result;
use std::fmt;

use crate::device::{ConnectionState, OperationState};
use crate::remote::DeviceService;

/// Result of a start/stop inference request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ControlOutcome {
    /// The service accepted the command.
    Done(String),
    /// The device was not in a state that allows the command; nothing was sent.
    Rejected {
        connection: ConnectionState,
        operation: OperationState,
    },
    /// The service answered with a non-success result.
    Failed(String),
}

impl ControlOutcome {
    pub fn is_done(&self) -> bool {
        matches!(self, ControlOutcome::Done(_))
    }
}

impl fmt::Display for ControlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ControlOutcome::Done(message) => write!(f, "ok: {}", message),
            ControlOutcome::Rejected {
                connection,
                operation,
            } => write!(
                f,
                "rejected: device is {} / {}",
                connection, operation
            ),
            ControlOutcome::Failed(message) => write!(f, "failed: {}", message),
        }
    }
}

/// Starts inference; only a connected, idle device is asked.
pub fn start_inference(service: &dyn DeviceService) -> Result<ControlOutcome> {
    let (connection, operation) = service.device_state()?;
    if connection != ConnectionState::Connected || operation != OperationState::Idle {
        log::info!(
            "not starting inference: device is {} / {}",
            connection,
            operation
        );
        return Ok(ControlOutcome::Rejected {
            connection,
            operation,
        });
    }
    let outcome = service.start_inference()?;
    Ok(if outcome.is_success() {
        log::info!("inference started");
        ControlOutcome::Done(outcome.message)
    } else {
        ControlOutcome::Failed(outcome.message)
    })
}

/// Stops inference; only a connected device that is not idle is asked.
pub fn stop_inference(service: &dyn DeviceService) -> Result<ControlOutcome> {
    let (connection, operation) = service.device_state()?;
    if connection != ConnectionState::Connected || operation == OperationState::Idle {
        log::info!(
            "not stopping inference: device is {} / {}",
            connection,
            operation
        );
        return Ok(ControlOutcome::Rejected {
            connection,
            operation,
        });
    }
    let outcome = service.stop_inference()?;
    Ok(if outcome.is_success() {
        log::info!("inference stopped");
        ControlOutcome::Done(outcome.message)
    } else {
        ControlOutcome::Failed(outcome.message)
    })
}
