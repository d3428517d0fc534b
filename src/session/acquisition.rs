use anyhow::{Context, Result};
use std::sync::Arc;
use std::time::Duration;

use super::cancel::CancelToken;
use super::correlate::{find_matching, image_timestamp};
use crate::config::MonitorConfig;
use crate::detect::decode_base64_record;
use crate::device::{DeviceState, StateCell};
use crate::notify::Notifier;
use crate::remote::{DeviceService, ImageEntry, Inference};
use crate::render::{self, NO_RESULTS_LABEL};

/// The fetch, correlate and render loop.
///
/// Every iteration re-queries the device state and picks one of two paths: while the
/// device streams inference results only, the newest record is drawn onto a blank canvas;
/// otherwise the newest stored image is paired with the inference record carrying the
/// same timestamp.
pub struct Acquisition {
    service: Arc<dyn DeviceService>,
    cell: Arc<StateCell>,
    notifier: Notifier,
    config: MonitorConfig,
    last_state: DeviceState,
}

impl Acquisition {
    pub fn new(
        service: Arc<dyn DeviceService>,
        cell: Arc<StateCell>,
        notifier: Notifier,
        config: MonitorConfig,
    ) -> Self {
        Self {
            service,
            cell,
            notifier,
            config,
            last_state: DeviceState::unknown(),
        }
    }

    /// Last state this loop acted on.
    pub fn last_state(&self) -> DeviceState {
        self.last_state
    }

    /// Runs until `cancel` fires. Iteration errors are reported and followed by a backoff.
    pub fn run(&mut self, cancel: &CancelToken) {
        log::info!("acquisition loop started");
        while !cancel.is_cancelled() {
            let pause = match self.run_once(cancel) {
                Ok(Some(pause)) => pause,
                Ok(None) => break,
                Err(err) => {
                    log::warn!("acquisition iteration failed: {:#}", err);
                    self.notifier.status(format!("Error: {:#}", err));
                    self.config.timing.error_backoff
                }
            };
            if !cancel.sleep(pause) {
                break;
            }
        }
        log::info!("acquisition loop stopped");
    }

    /// One iteration. Returns how long to pause before the next one, or `None` once
    /// cancellation was observed; no remote call is issued after that point.
    pub fn run_once(&mut self, cancel: &CancelToken) -> Result<Option<Duration>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let state = self.refresh_state();

        if state.is_streaming_inference() {
            self.notifier.status("Streaming inference results");
            return self.stream_latest(cancel);
        }
        self.correlate_latest(cancel)
    }

    fn refresh_state(&mut self) -> DeviceState {
        match self.service.device_state() {
            Ok((connection, operation)) => {
                self.last_state = DeviceState::new(connection, operation);
                self.notifier.status(format!(
                    "Device state: {} - {}",
                    connection, operation
                ));
            }
            Err(err) => {
                log::warn!("device state query failed: {:#}", err);
                self.notifier
                    .status(format!("Device state query error: {:#}", err));
                if let Some(observed) = self.cell.load() {
                    if !observed.is_unknown() && observed.observed_at > self.last_state.observed_at {
                        self.last_state = observed;
                    }
                }
            }
        }
        self.last_state
    }

    fn stream_latest(&mut self, cancel: &CancelToken) -> Result<Option<Duration>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let inferences = self.service.inference_results(1)?;
        match inferences.iter().find_map(|inference| inference.payload.as_deref()) {
            Some(payload) => {
                if let Err(err) = self.render_on_canvas(payload) {
                    log::warn!("streamed inference result rejected: {:#}", err);
                    self.notifier
                        .status(format!("Inference result processing error: {:#}", err));
                }
            }
            None => self.notifier.status("No inference result available"),
        }
        Ok(Some(self.config.timing.stream_interval))
    }

    fn render_on_canvas(&self, payload: &str) -> Result<()> {
        let record = decode_base64_record(payload)?;
        let canvas = render::blank_canvas(self.config.canvas_width, self.config.canvas_height);
        let (image, labels) = render::annotate(
            &canvas,
            &record.detections,
            &self.config.classes,
            self.config.scale,
        );
        self.notifier.image(image);
        self.notifier.detections(labels);
        Ok(())
    }

    fn correlate_latest(&mut self, cancel: &CancelToken) -> Result<Option<Duration>> {
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let directories = self
            .service
            .image_directories()
            .context("list image directories")?;
        let Some(sub_directory) = directories.last() else {
            self.notifier.status("No image directories found");
            return Ok(Some(self.config.timing.error_backoff));
        };

        self.notifier
            .status(format!("Fetching latest image from {}", sub_directory));
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let Some(image) = self
            .service
            .latest_image(sub_directory)
            .with_context(|| format!("fetch latest image from {}", sub_directory))?
        else {
            self.notifier
                .status(format!("No images in sub-directory {}", sub_directory));
            return Ok(Some(self.config.timing.poll_interval));
        };

        let timestamp = image_timestamp(&image.name);
        self.notifier.status(format!(
            "Latest image: {}, timestamp: {}",
            image.name, timestamp
        ));
        if cancel.is_cancelled() {
            return Ok(None);
        }
        let inferences = self
            .service
            .inference_results(self.config.inference_batch)
            .context("fetch inference results")?;

        match find_matching(&inferences, timestamp) {
            None => {
                self.notifier.status(format!(
                    "No inference result matches image {}",
                    image.name
                ));
                self.show_unannotated(&image)?;
            }
            Some(inference) => {
                self.notifier
                    .status(format!("Found inference result for image {}", image.name));
                self.show_annotated(&image, inference)?;
            }
        }
        Ok(Some(self.config.timing.poll_interval))
    }

    fn show_unannotated(&self, image: &ImageEntry) -> Result<()> {
        let frame = render::decode_image(&image.contents)
            .with_context(|| format!("decode image {}", image.name))?;
        self.notifier.image(frame);
        self.notifier.detections(vec![NO_RESULTS_LABEL.to_string()]);
        Ok(())
    }

    fn show_annotated(&self, image: &ImageEntry, inference: &Inference) -> Result<()> {
        let Some(payload) = inference.payload.as_deref() else {
            self.notifier.status(format!(
                "Inference result for {} carries no detection data",
                image.name
            ));
            return Ok(());
        };
        let record = decode_base64_record(payload)
            .with_context(|| format!("decode inference result for {}", image.name))?;
        for diagnostic in &record.diagnostics {
            log::debug!("{}: {}", image.name, diagnostic);
        }
        let frame = render::decode_image(&image.contents)
            .with_context(|| format!("decode image {}", image.name))?;
        let (annotated, labels) = render::annotate(
            &frame,
            &record.detections,
            &self.config.classes,
            self.config.scale,
        );
        self.notifier.image(annotated);
        self.notifier.detections(labels);
        Ok(())
    }
}
