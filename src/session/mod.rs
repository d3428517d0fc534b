//! A monitoring session: the acquisition loop plus the device monitor it owns.

mod acquisition;
mod cancel;
pub mod control;
mod correlate;

pub use acquisition::Acquisition;
pub use cancel::{join_bounded, CancelToken};
pub use control::ControlOutcome;
pub use correlate::{find_matching, image_timestamp};

use anyhow::{Context, Result};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::config::MonitorConfig;
use crate::device::{DeviceMonitor, DeviceState, StateCell};
use crate::notify::Notifier;
use crate::remote::DeviceService;

/// Handle to a running session.
///
/// The acquisition thread starts the monitor thread on a child token and stops it on the
/// way out. Dropping the handle cancels both without waiting.
#[derive(Debug)]
pub struct Session {
    cancel: CancelToken,
    cell: Arc<StateCell>,
    join: Option<JoinHandle<bool>>,
    join_timeout: Duration,
}

impl Session {
    pub fn start(
        service: Arc<dyn DeviceService>,
        config: MonitorConfig,
        notifier: Notifier,
    ) -> Result<Self> {
        config.validate()?;
        let cancel = CancelToken::new();
        let cell = Arc::new(StateCell::new());
        let join_timeout = config.timing.join_timeout;

        let thread_cancel = cancel.clone();
        let thread_cell = cell.clone();
        let join = thread::Builder::new()
            .name("acquisition".into())
            .spawn(move || run_session(service, config, notifier, thread_cell, thread_cancel))
            .context("spawn acquisition thread")?;

        log::info!("session started");
        Ok(Self {
            cancel,
            cell,
            join: Some(join),
            join_timeout,
        })
    }

    /// Latest state written by the device monitor.
    pub fn device_state(&self) -> Option<DeviceState> {
        self.cell.load()
    }

    pub fn is_running(&self) -> bool {
        self.join
            .as_ref()
            .map(|join| !join.is_finished())
            .unwrap_or(false)
    }

    /// Cancels the session and waits a bounded time for it. Returns `true` if both threads
    /// finished in time.
    pub fn stop(mut self) -> bool {
        self.cancel.cancel();
        let stopped = match self.join.take() {
            Some(join) => join_bounded(join, self.join_timeout).unwrap_or(false),
            None => true,
        };
        log::info!("session stopped (clean: {})", stopped);
        stopped
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

fn run_session(
    service: Arc<dyn DeviceService>,
    config: MonitorConfig,
    notifier: Notifier,
    cell: Arc<StateCell>,
    cancel: CancelToken,
) -> bool {
    let join_timeout = config.timing.join_timeout;
    let monitor = DeviceMonitor::new(
        service.clone(),
        cell.clone(),
        notifier.clone(),
        config.timing.monitor_interval,
    )
    .spawn(cancel.child());
    let monitor = match monitor {
        Ok(handle) => Some(handle),
        Err(err) => {
            log::error!("device monitor unavailable: {:#}", err);
            notifier.status(format!("Device monitor unavailable: {:#}", err));
            None
        }
    };

    Acquisition::new(service, cell, notifier, config).run(&cancel);

    match monitor {
        Some(handle) => handle.stop(join_timeout),
        None => true,
    }
}
