//! aitrios_monitor - Run a monitoring session against one AITRIOS device.
//!
//! Starts the device monitor and the acquisition loop, then drains their notifications:
//! status text and detection labels go to the log, annotated frames optionally to a
//! snapshot file. Ctrl-C stops the session.

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::RecvTimeoutError;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use aitrios_monitor::notify::{self, Event};
use aitrios_monitor::session::control;
use aitrios_monitor::{AitriosClient, DeviceService, MonitorConfig, Session};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor an AITRIOS device and render its detections")]
struct Args {
    /// JSON or TOML config file; environment variables override its values.
    #[arg(long, env = "AITRIOS_MONITOR_CONFIG")]
    config: Option<PathBuf>,

    /// Write every rendered frame to this path (format from the extension).
    #[arg(long, env = "AITRIOS_SNAPSHOT_PATH")]
    snapshot_path: Option<PathBuf>,

    /// Ask the device to start inference before the session begins.
    #[arg(long)]
    start_inference: bool,

    /// Capacity of the notification channel.
    #[arg(long, default_value_t = 64)]
    channel_capacity: usize,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let config = match args.config.as_deref() {
        Some(path) => MonitorConfig::load_from(path)?,
        None => MonitorConfig::load()?,
    };
    log::info!("monitoring device {}", config.device_id);
    let client = AitriosClient::from_config(&config)?;
    let service: Arc<dyn DeviceService> = Arc::new(client);

    if args.start_inference {
        let outcome = control::start_inference(service.as_ref())?;
        log::info!("start inference: {}", outcome);
    }

    let (notifier, events) = notify::channel(args.channel_capacity);
    let session = Session::start(service, config, notifier)?;

    let (shutdown_tx, shutdown_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = shutdown_tx.send(());
    })
    .context("install Ctrl-C handler")?;

    loop {
        if shutdown_rx.try_recv().is_ok() {
            log::info!("shutdown signal received, stopping session...");
            break;
        }
        match events.recv_timeout(Duration::from_millis(200)) {
            Ok(event) => handle_event(event, args.snapshot_path.as_deref()),
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                log::warn!("session ended unexpectedly");
                break;
            }
        }
    }

    if !session.stop() {
        log::warn!("session threads did not stop within the join timeout");
    }
    Ok(())
}

fn handle_event(event: Event, snapshot_path: Option<&Path>) {
    match event {
        Event::Status(text) => log::info!("{}", text),
        Event::Detection(labels) => {
            for label in labels {
                log::info!("detection: {}", label);
            }
        }
        Event::DeviceState { state, error } => match error {
            Some(error) => log::warn!("device state unavailable: {}", error),
            None => log::debug!("device state: {}", state),
        },
        Event::Image(image) => {
            if let Some(path) = snapshot_path {
                if let Err(err) = image.save(path) {
                    log::warn!("failed to write snapshot {}: {}", path.display(), err);
                }
            }
        }
    }
}
