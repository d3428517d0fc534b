//! Notification channel from the session threads to the presentation consumer.
//!
//! Producers never call into presentation code directly; they push [`Event`]s into a
//! bounded channel drained by a single consumer loop owned by the caller.
//!
//! Status text is best effort: it never waits and may not use the last quarter of the
//! channel, which stays free for frames (images, labels) and device state. Those wait up
//! to [`SEND_TIMEOUT`] for room before being dropped.

use crossbeam_channel::{bounded, Receiver, SendTimeoutError, Sender, TrySendError};
use image::RgbImage;
use std::time::Duration;

use crate::device::DeviceState;

/// How long a producer waits on a full channel before dropping the event.
pub const SEND_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Clone, Debug)]
pub enum Event {
    Status(String),
    Image(RgbImage),
    /// Rendered labels, in detection order.
    Detection(Vec<String>),
    DeviceState {
        state: DeviceState,
        error: Option<String>,
    },
}

impl Event {
    pub fn kind(&self) -> &'static str {
        match self {
            Event::Status(_) => "status",
            Event::Image(_) => "image",
            Event::Detection(_) => "detection",
            Event::DeviceState { .. } => "device_state",
        }
    }

    fn is_best_effort(&self) -> bool {
        matches!(self, Event::Status(_))
    }
}

/// Creates the channel; the receiver belongs to the consumer loop.
pub fn channel(capacity: usize) -> (Notifier, Receiver<Event>) {
    let capacity = capacity.max(1);
    let (tx, rx) = bounded(capacity);
    let status_limit = capacity - capacity / 4;
    (Notifier { tx, status_limit }, rx)
}

/// Cloneable producer side of the event channel. Sending never fails the caller.
#[derive(Clone, Debug)]
pub struct Notifier {
    tx: Sender<Event>,
    /// Queue length at which status events start being dropped.
    status_limit: usize,
}

impl Notifier {
    pub fn send(&self, event: Event) {
        let kind = event.kind();
        let sent = if event.is_best_effort() {
            if self.tx.len() >= self.status_limit {
                log::debug!("notification channel busy; dropped {} event", kind);
                return;
            }
            self.tx.try_send(event).map_err(|err| match err {
                TrySendError::Full(event) => SendTimeoutError::Timeout(event),
                TrySendError::Disconnected(event) => SendTimeoutError::Disconnected(event),
            })
        } else {
            self.tx.send_timeout(event, SEND_TIMEOUT)
        };
        match sent {
            Ok(()) => {}
            Err(SendTimeoutError::Timeout(_)) => {
                log::warn!("notification consumer is behind; dropped {} event", kind);
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                log::debug!("notification consumer gone; dropped {} event", kind);
            }
        }
    }

    pub fn status(&self, text: impl Into<String>) {
        let text = text.into();
        log::debug!("status: {}", text);
        self.send(Event::Status(text));
    }

    pub fn image(&self, image: RgbImage) {
        self.send(Event::Image(image));
    }

    pub fn detections(&self, labels: Vec<String>) {
        self.send(Event::Detection(labels));
    }

    pub fn device_state(&self, state: DeviceState, error: Option<String>) {
        self.send(Event::DeviceState { state, error });
    }
}
