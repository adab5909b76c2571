//! Data model shared by the connectivity, scanning and dispatch loops.

use core::fmt::Write as FmtWrite;
use heapless::{String as HString, Vec as HVec};

use crate::error::CredentialError;

pub const MAX_SSID_LEN: usize = 32;
pub const MAX_PASSWORD_LEN: usize = 64;
pub const MAX_DEVICE_ID_LEN: usize = 64;
pub const MAX_URL_LEN: usize = 128;
pub const MAX_SECRET_LEN: usize = 128;

/// ISO14443A UIDs are 4, 7 or 10 bytes.
pub const MAX_UID_LEN: usize = 10;

/// Raw card UID as returned by the reader.
pub type Uid = HVec<u8, MAX_UID_LEN>;

/// Uppercase hex rendering of a [`Uid`].
pub type CardId = HString<{ MAX_UID_LEN * 2 }>;

/// Wi-Fi station credentials.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkCredentials {
    pub ssid: HString<MAX_SSID_LEN>,
    pub password: HString<MAX_PASSWORD_LEN>,
}

impl NetworkCredentials {
    pub fn new(ssid: &str, password: &str) -> Result<Self, CredentialError> {
        if ssid.is_empty() {
            return Err(CredentialError::EmptySsid);
        }
        Ok(Self {
            ssid: bounded(ssid, "ssid")?,
            password: bounded(password, "password")?,
        })
    }

    /// Open networks are stored with an empty password.
    pub fn is_open(&self) -> bool {
        self.password.is_empty()
    }
}

/// Device identity and endpoint credentials. Read-only at runtime.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub device_id: HString<MAX_DEVICE_ID_LEN>,
    pub endpoint_url: HString<MAX_URL_LEN>,
    pub endpoint_secret: HString<MAX_SECRET_LEN>,
}

impl DeviceIdentity {
    pub fn new(
        device_id: &str,
        endpoint_url: &str,
        endpoint_secret: &str,
    ) -> Result<Self, CredentialError> {
        if device_id.is_empty() || endpoint_url.is_empty() || endpoint_secret.is_empty() {
            return Err(CredentialError::MissingField);
        }
        Ok(Self {
            device_id: bounded(device_id, "device_id")?,
            endpoint_url: bounded(endpoint_url, "endpoint_url")?,
            endpoint_secret: bounded(endpoint_secret, "endpoint_secret")?,
        })
    }
}

fn bounded<const N: usize>(value: &str, field: &'static str) -> Result<HString<N>, CredentialError> {
    let mut out = HString::new();
    out.push_str(value)
        .map_err(|_| CredentialError::TooLong(field))?;
    Ok(out)
}

/// One debounced card presentation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TapEvent {
    pub uid: Uid,
    pub observed_at_ms: u64,
}

impl TapEvent {
    pub fn new(uid: Uid, observed_at_ms: u64) -> Self {
        Self { uid, observed_at_ms }
    }

    pub fn card_id(&self) -> CardId {
        card_id(&self.uid)
    }
}

/// Render UID bytes as uppercase hex without separators.
pub fn card_id(uid: &[u8]) -> CardId {
    let mut out = CardId::new();
    for byte in uid.iter().take(MAX_UID_LEN) {
        let _ = write!(out, "{:02X}", byte);
    }
    out
}

/// Result of a single tap report.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Endpoint answered with a 2xx status.
    Delivered(u16),
    /// Transport failed on every attempt.
    NetworkFailure,
    /// Endpoint answered with a non-2xx status.
    ServerError(u16),
}

/// Station link state, owned by the connectivity manager.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectivityState {
    Connected,
    Reconnecting,
    /// A previously live link was found dead; reconnect in progress.
    Degraded,
    RecoveryMode,
}
