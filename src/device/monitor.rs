use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{DeviceState, StateCell};
use crate::notify::Notifier;
use crate::remote::DeviceService;
use crate::session::{join_bounded, CancelToken};

/// Periodically queries the device and publishes what it reports.
///
/// Every tick publishes, changed or not; consumers use the stream as a heartbeat. Query
/// failures publish `(Unknown, Unknown)` with the error text and never stop the loop.
pub struct DeviceMonitor {
    service: Arc<dyn DeviceService>,
    cell: Arc<StateCell>,
    notifier: Notifier,
    interval: Duration,
}

impl DeviceMonitor {
    pub fn new(
        service: Arc<dyn DeviceService>,
        cell: Arc<StateCell>,
        notifier: Notifier,
        interval: Duration,
    ) -> Self {
        Self {
            service,
            cell,
            notifier,
            interval,
        }
    }

    /// One query-and-publish step.
    pub fn tick(&self) -> DeviceState {
        match self.service.device_state() {
            Ok((connection, operation)) => {
                let state = DeviceState::new(connection, operation);
                self.cell.store(state);
                self.notifier.device_state(state, None);
                self.notifier.status(format!(
                    "Connection State: {}, Operation State: {}",
                    connection, operation
                ));
                state
            }
            Err(err) => {
                log::warn!("device state query failed: {:#}", err);
                let state = DeviceState::unknown();
                self.cell.store(state);
                self.notifier.device_state(state, Some(format!("{:#}", err)));
                state
            }
        }
    }

    pub fn run(&self, cancel: &CancelToken) {
        log::info!("device monitor started (interval {:?})", self.interval);
        while !cancel.is_cancelled() {
            self.tick();
            if !cancel.sleep(self.interval) {
                break;
            }
        }
        log::info!("device monitor stopped");
    }

    pub fn spawn(self, cancel: CancelToken) -> Result<MonitorHandle> {
        let thread_cancel = cancel.clone();
        let join = thread::Builder::new()
            .name("device-monitor".into())
            .spawn(move || self.run(&thread_cancel))
            .context("spawn device monitor thread")?;
        Ok(MonitorHandle {
            cancel,
            join: Some(join),
        })
    }
}

#[derive(Debug)]
pub struct MonitorHandle {
    cancel: CancelToken,
    join: Option<JoinHandle<()>>,
}

impl MonitorHandle {
    /// Cancels the monitor and waits up to `timeout` for it to exit.
    pub fn stop(mut self, timeout: Duration) -> bool {
        self.cancel.cancel();
        match self.join.take() {
            Some(join) => join_bounded(join, timeout).is_some(),
            None => true,
        }
    }
}

impl Drop for MonitorHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
