//! Station link management with windowed escalation to recovery mode.
//!
//! A failed connect is retried quietly (after a double beep and a short
//! backoff) until `failure_threshold` failures land inside the failure horizon.
//! At that point the configuration is assumed broken and the caller hands
//! control to the setup portal.

use crate::config::RuntimeConfig;
use crate::failure_window::{FailureWindow, FAILURE_WINDOW_CAPACITY};
use crate::feedback::{Feedback, Pattern};
use crate::hal::{Clock, Station};
use crate::types::{ConnectivityState, NetworkCredentials};

pub struct ConnectivityManager<C> {
    clock: C,
    state: ConnectivityState,
    failures: FailureWindow,
    threshold: usize,
    connect_timeout_ms: u64,
    connect_poll_ms: u64,
    backoff_ms: u64,
}

impl<C: Clock> ConnectivityManager<C> {
    pub fn new(clock: C, config: &RuntimeConfig) -> Self {
        Self {
            clock,
            state: ConnectivityState::Reconnecting,
            failures: FailureWindow::new(config.failure_horizon_ms),
            threshold: config.failure_threshold.clamp(1, FAILURE_WINDOW_CAPACITY),
            connect_timeout_ms: config.connect_timeout_ms,
            connect_poll_ms: config.connect_poll_ms.max(1),
            backoff_ms: config.reconnect_backoff_ms,
        }
    }

    /// Last observed link state.
    pub fn state(&self) -> ConnectivityState {
        self.state
    }

    pub fn failures(&self) -> &FailureWindow {
        &self.failures
    }

    /// Make sure the station link is up, reconnecting if needed.
    pub fn ensure_link<S, F>(
        &mut self,
        station: &mut S,
        feedback: &mut F,
        credentials: &NetworkCredentials,
    ) -> ConnectivityState
    where
        S: Station,
        F: Feedback,
    {
        // A join that finished after the last attempt timed out counts too.
        if station.is_link_up() {
            if self.state != ConnectivityState::Connected {
                log::info!("wifi: link came up on {}", credentials.ssid);
                self.failures.clear();
                self.state = ConnectivityState::Connected;
            }
            return ConnectivityState::Connected;
        }
        if self.state == ConnectivityState::Connected {
            log::warn!("wifi: link lost");
            self.state = ConnectivityState::Degraded;
        }

        if self.connect(station, credentials) {
            log::info!("wifi: connected to {}", credentials.ssid);
            self.failures.clear();
            self.state = ConnectivityState::Connected;
            return self.state;
        }

        let now = self.clock.now_ms();
        let recent = self.failures.record(now);
        log::warn!(
            "wifi: connect to {} failed ({}/{} in window)",
            credentials.ssid,
            recent,
            self.threshold
        );
        feedback.play(Pattern::WifiError);

        if self.failures.is_breached(now, self.threshold) {
            log::error!("wifi: failure threshold reached, entering recovery mode");
            self.state = ConnectivityState::RecoveryMode;
        } else {
            self.clock.sleep_ms(self.backoff_ms);
            self.state = ConnectivityState::Reconnecting;
        }
        self.state
    }

    /// One bounded connect attempt.
    fn connect<S: Station>(&mut self, station: &mut S, credentials: &NetworkCredentials) -> bool {
        log::info!("wifi: connecting to {}", credentials.ssid);
        if let Err(e) = station.begin_connect(credentials) {
            log::error!("wifi: {}", e);
            return false;
        }

        let deadline = self.clock.now_ms() + self.connect_timeout_ms;
        loop {
            if station.is_link_up() {
                return true;
            }
            if self.clock.now_ms() >= deadline {
                return false;
            }
            self.clock.sleep_ms(self.connect_poll_ms);
        }
    }
}
