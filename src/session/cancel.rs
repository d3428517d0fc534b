use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Upper bound on a single uninterrupted sleep slice.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Cooperative cancellation flag shared between a session and its threads.
///
/// A child token observes its parent's flag as well as its own, so cancelling a session
/// reaches every thread while a thread can still stop its own children independently.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    parent: Option<Arc<AtomicBool>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn child(&self) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            parent: Some(self.flag.clone()),
        }
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
            || self
                .parent
                .as_ref()
                .map(|parent| parent.load(Ordering::SeqCst))
                .unwrap_or(false)
    }

    /// Sleeps for `duration` in short slices, re-checking the flag before each.
    /// Returns `false` if cancellation cut the sleep short.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep((deadline - now).min(SLEEP_SLICE));
        }
    }
}

/// Waits up to `timeout` for `handle` to finish and joins it.
///
/// Returns `None` when the thread is still running at the deadline (it is then left
/// detached) or when it panicked.
pub fn join_bounded<T>(handle: JoinHandle<T>, timeout: Duration) -> Option<T> {
    let deadline = Instant::now() + timeout;
    while !handle.is_finished() {
        if Instant::now() >= deadline {
            log::warn!(
                "thread {} did not stop within {:?}",
                handle.thread().name().unwrap_or("unnamed"),
                timeout
            );
            return None;
        }
        thread::sleep(Duration::from_millis(10));
    }
    match handle.join() {
        Ok(value) => Some(value),
        Err(_) => {
            log::error!("worker thread panicked");
            None
        }
    }
}
