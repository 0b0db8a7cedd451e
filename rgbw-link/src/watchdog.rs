//! Liveness tracking for one socket.
//!
//! The device pushes state continuously, so silence longer than the timeout
//! means the socket is dead even if TCP has not noticed.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Alive,
    /// First tick past the timeout. Reported once per open socket.
    Expired,
    /// No socket is open, or expiry was already reported.
    Idle,
}

#[derive(Debug, Clone)]
pub struct Watchdog {
    timeout: Duration,
    last_traffic: Option<Instant>,
}

impl Watchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_traffic: None,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn on_open(&mut self, now: Instant) {
        self.last_traffic = Some(now);
    }

    pub fn on_frame(&mut self, now: Instant) {
        if self.last_traffic.is_some() {
            self.last_traffic = Some(now);
        }
    }

    pub fn on_close(&mut self) {
        self.last_traffic = None;
    }

    pub fn on_tick(&mut self, now: Instant) -> Verdict {
        match self.last_traffic {
            None => Verdict::Idle,
            Some(last) if now.saturating_duration_since(last) >= self.timeout => {
                self.last_traffic = None;
                Verdict::Expired
            }
            Some(_) => Verdict::Alive,
        }
    }
}
