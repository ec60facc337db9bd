use std::pin::Pin;
use std::time::Duration;

use tokio::time::{Instant, Sleep};

/// Fires when an armed connection has been silent for `interval`.
///
/// Arming while armed restarts the countdown. Expiry is reported once, after
/// which the watchdog is disarmed until the next [`arm`](Self::arm).
#[derive(Debug)]
pub struct StallWatchdog {
    interval: Duration,
    deadline: Option<Pin<Box<Sleep>>>,
}

impl StallWatchdog {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            deadline: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn arm(&mut self) {
        let at = Instant::now() + self.interval;
        match self.deadline.as_mut() {
            Some(sleep) => sleep.as_mut().reset(at),
            None => self.deadline = Some(Box::pin(tokio::time::sleep_until(at))),
        }
    }

    /// Push the deadline out after receiving data. No-op when disarmed.
    pub fn on_data(&mut self) {
        if let Some(sleep) = self.deadline.as_mut() {
            sleep.as_mut().reset(Instant::now() + self.interval);
        }
    }

    /// Drop the timer. Safe to call repeatedly or before any `arm`.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Resolves when the deadline passes; pending forever while disarmed.
    ///
    /// Cancel-safe: dropping the future leaves the deadline in place.
    pub async fn expired(&mut self) {
        match self.deadline.as_mut() {
            Some(sleep) => {
                sleep.as_mut().await;
                self.deadline = None;
            }
            None => std::future::pending::<()>().await,
        }
    }
}
