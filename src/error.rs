//! Error types for the beacon runtime and its platform adapters.

use thiserror::Error;

/// Wi-Fi driver failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum RadioError {
    #[error("radio rejected configuration")]
    Config,
    #[error("radio failed to start")]
    Start,
    #[error("connect request failed")]
    Connect,
    #[error("access point not running")]
    NotServing,
    #[error("socket error")]
    Socket,
}

/// Transport-level failures of an HTTP exchange. All of these are retryable.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid url")]
    InvalidUrl,
    #[error("unsupported url scheme")]
    UnsupportedScheme,
    #[error("request too large")]
    RequestTooLarge,
    #[error("link down")]
    LinkDown,
    #[error("dns lookup failed")]
    Dns,
    #[error("connect failed")]
    Connect,
    #[error("timed out")]
    Timeout,
    #[error("socket i/o failed")]
    Io,
    #[error("malformed response")]
    MalformedResponse,
}

/// Credential store failures.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum StoreError {
    #[error("flash access failed")]
    Flash,
    #[error("record does not fit storage buffer")]
    Serialization,
}

/// Rejected credential or identity values.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CredentialError {
    #[error("ssid is empty")]
    EmptySsid,
    #[error("required field is empty")]
    MissingField,
    #[error("{0} is too long")]
    TooLong(&'static str),
}

/// Fatal startup conditions.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    #[error("no device identity provisioned")]
    IdentityMissing,
}
