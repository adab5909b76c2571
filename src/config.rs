//! Runtime tunables, fixed setup-network settings and build-time provisioning.
//!
//! Provisioning is embedded at compile time via environment variables (see
//! build.rs). Anything saved to flash at runtime takes priority.

use crate::types::{DeviceIdentity, NetworkCredentials};

/// Timing and retry policy. `Default` carries the field-tested constants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Upper bound on one station connect attempt.
    pub connect_timeout_ms: u64,
    /// Interval between link checks while connecting.
    pub connect_poll_ms: u64,
    /// Pause after a failed connect that did not trip recovery.
    pub reconnect_backoff_ms: u64,
    /// Failures inside the horizon that trip recovery mode.
    pub failure_threshold: usize,
    pub failure_horizon_ms: u64,
    /// Extra delivery attempts after a transport failure.
    pub dispatch_retries: u8,
    pub retry_delay_ms: u64,
    /// Tag poll timeout in normal operation.
    pub scan_timeout_ms: u32,
    /// Tag poll timeout while the setup portal is idle.
    pub portal_scan_timeout_ms: u32,
    pub removal_poll_timeout_ms: u32,
    pub removal_sleep_ms: u64,
    /// Upper bound on waiting for a held card to leave the field.
    pub max_hold_ms: u64,
    pub accept_timeout_ms: u64,
    /// Delay between acknowledging saved credentials and restarting.
    pub restart_delay_ms: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            connect_poll_ms: 500,
            reconnect_backoff_ms: 2_000,
            failure_threshold: 3,
            failure_horizon_ms: 60_000,
            dispatch_retries: 1,
            retry_delay_ms: 500,
            scan_timeout_ms: 1_000,
            portal_scan_timeout_ms: 100,
            removal_poll_timeout_ms: 500,
            removal_sleep_ms: 100,
            max_hold_ms: 30_000,
            accept_timeout_ms: 1_000,
            restart_delay_ms: 2_000,
        }
    }
}

/// Setup network served in recovery mode. Not user-configurable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessPointSettings {
    pub ssid: &'static str,
    pub password: &'static str,
    pub address: [u8; 4],
    pub prefix_len: u8,
    /// Host part of the first address leased to clients.
    pub lease_start: u8,
    pub lease_secs: u32,
}

impl AccessPointSettings {
    pub const FIXED: Self = Self {
        ssid: "tappytrack",
        password: "12345678",
        address: [192, 168, 4, 1],
        prefix_len: 24,
        lease_start: 2,
        lease_secs: 2 * 60 * 60,
    };
}

/// Values baked into the image by build.rs.
#[derive(Clone, Copy, Debug)]
pub struct Provisioning {
    pub device_id: Option<&'static str>,
    pub endpoint_url: Option<&'static str>,
    pub endpoint_secret: Option<&'static str>,
    pub ssid: Option<&'static str>,
    pub password: Option<&'static str>,
}

impl Provisioning {
    /// Get the compile-time provisioning.
    pub fn get() -> Self {
        Self {
            device_id: option_env!("BEACON_DEVICE_ID"),
            endpoint_url: option_env!("BEACON_ENDPOINT_URL"),
            endpoint_secret: option_env!("BEACON_ENDPOINT_SECRET"),
            ssid: option_env!("BEACON_SSID"),
            password: option_env!("BEACON_PASSWORD"),
        }
    }

    pub fn identity(&self) -> Option<DeviceIdentity> {
        let identity = DeviceIdentity::new(
            self.device_id?,
            self.endpoint_url?,
            self.endpoint_secret?,
        );
        match identity {
            Ok(identity) => Some(identity),
            Err(e) => {
                log::warn!("config: baked-in identity rejected: {}", e);
                None
            }
        }
    }

    pub fn network(&self) -> Option<NetworkCredentials> {
        let ssid = self.ssid.filter(|s| !s.is_empty())?;
        match NetworkCredentials::new(ssid, self.password.unwrap_or("")) {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                log::warn!("config: baked-in network rejected: {}", e);
                None
            }
        }
    }
}
