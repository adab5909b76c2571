//! Platform boundary.
//!
//! The runtime only talks to hardware through these traits. The firmware
//! implements them on top of esp-hal, esp-radio, smoltcp and the PN532; host
//! tests implement them with in-memory fakes.

use crate::config::AccessPointSettings;
use crate::error::{RadioError, StoreError, TransportError};
use crate::types::{DeviceIdentity, NetworkCredentials, Uid};

/// Monotonic time source. Sleeping is the only way the runtime waits.
pub trait Clock: Clone {
    fn now_ms(&self) -> u64;
    fn sleep_ms(&self, ms: u64);
}

/// Wi-Fi station session.
pub trait Station {
    /// Reconfigure the radio for `credentials` and start associating.
    /// Returns immediately; progress is observed through [`Station::is_link_up`].
    fn begin_connect(&mut self, credentials: &NetworkCredentials) -> Result<(), RadioError>;

    /// True once associated and holding an IP lease.
    fn is_link_up(&mut self) -> bool;
}

/// Blocking HTTP client bounded by its own I/O timeouts.
pub trait HttpClient {
    /// POST `body` to `url`, returning the response status code.
    fn post(
        &mut self,
        url: &str,
        headers: &[(&str, &str)],
        body: &str,
    ) -> Result<u16, TransportError>;
}

/// Local setup network used in recovery mode.
pub trait AccessPoint {
    fn start_access_point(&mut self, settings: &AccessPointSettings) -> Result<(), RadioError>;

    /// Wait up to `timeout_ms` for a client request. Copies the raw request
    /// into `buf` and returns its length, or `None` on timeout.
    fn poll_request(&mut self, buf: &mut [u8], timeout_ms: u64) -> Result<Option<usize>, RadioError>;

    /// Send `response` on the connection that produced the last request and close it.
    fn respond(&mut self, response: &[u8]) -> Result<(), RadioError>;
}

/// Proximity card transceiver.
pub trait TagReader {
    /// One bounded poll. `None` when no card is in the field.
    fn read_uid(&mut self, timeout_ms: u32) -> Option<Uid>;
}

/// Audio output.
pub trait Transducer {
    fn set_tone(&mut self, frequency_hz: u32, duty_pct: u8);
    fn stop(&mut self);
}

/// Persisted network and identity records.
///
/// Missing or unreadable records are reported as `None`.
pub trait CredentialStore {
    fn load_network(&mut self) -> Option<NetworkCredentials>;
    fn save_network(&mut self, credentials: &NetworkCredentials) -> Result<(), StoreError>;
    fn load_identity(&mut self) -> Option<DeviceIdentity>;
}
