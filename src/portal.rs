//! Captive setup portal served from the recovery access point.
//!
//! One route for any path: a GET carrying `ssid`/`password` query parameters
//! saves the network and ends with a restart, anything else gets the form.
//! Bad input never takes the portal down; it is logged and the form is served
//! again. While idle between requests the reader is still polled, so a tap
//! during an outage gets the Wi-Fi error tone instead of silence.

use heapless::String as HString;

use crate::config::RuntimeConfig;
use crate::feedback::{Feedback, Pattern};
use crate::hal::{AccessPoint, Clock, CredentialStore, TagReader};
use crate::http;
use crate::scanner::Scanner;
use crate::types::{NetworkCredentials, MAX_PASSWORD_LEN, MAX_SSID_LEN};

pub const REQUEST_BUFFER: usize = 1024;
const RESPONSE_CAPACITY: usize = 1024;

pub const FORM_HTML: &str = "<!DOCTYPE html>\
<html>\
<body>\
<h2>Wi-Fi Setup</h2>\
<form action=\"/\" method=\"get\">\
SSID: <input name=\"ssid\"><br>\
Password: <input name=\"password\" type=\"password\"><br>\
<input type=\"submit\" value=\"Save and Connect\">\
</form>\
</body>\
</html>";

pub const SAVED_TEXT: &str = "Saved. Rebooting...";

/// What one portal iteration did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalStep {
    /// No request and no tap before the timeout.
    Idle,
    /// A card was tapped while offline.
    TapWhileOffline,
    ServedForm,
    /// A submission was rejected and the form served again.
    Malformed(MalformedRequest),
    /// Saving the submission failed.
    StoreFailed,
    /// Credentials were saved; the caller restarts.
    Saved(NetworkCredentials),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MalformedRequest {
    NotUtf8,
    NoRequestLine,
    BadEscape,
    MissingSsid,
    SsidTooLong,
    PasswordTooLong,
}

/// Classified portal request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PortalRequest {
    Form,
    Submit(NetworkCredentials),
    Malformed(MalformedRequest),
}

pub struct Portal<C> {
    clock: C,
    accept_timeout_ms: u64,
    scan_timeout_ms: u32,
}

impl<C: Clock> Portal<C> {
    pub fn new(clock: C, config: &RuntimeConfig) -> Self {
        Self {
            clock,
            accept_timeout_ms: config.accept_timeout_ms,
            scan_timeout_ms: config.portal_scan_timeout_ms,
        }
    }

    pub fn step<A, S, R, F>(
        &mut self,
        ap: &mut A,
        store: &mut S,
        scanner: &mut Scanner<R, C>,
        feedback: &mut F,
    ) -> PortalStep
    where
        A: AccessPoint,
        S: CredentialStore,
        R: TagReader,
        F: Feedback,
    {
        let mut buf = [0u8; REQUEST_BUFFER];
        let len = match ap.poll_request(&mut buf, self.accept_timeout_ms) {
            Ok(Some(len)) => len,
            Ok(None) => return self.drain_tap(scanner, feedback),
            Err(e) => {
                log::warn!("portal: {}", e);
                // Keep the loop paced even if the socket keeps failing.
                self.clock.sleep_ms(self.accept_timeout_ms);
                return PortalStep::Idle;
            }
        };

        match parse_request(&buf[..len]) {
            PortalRequest::Form => {
                log::debug!("portal: serving form");
                send(ap, &http::response::<RESPONSE_CAPACITY>("200 OK", "text/html", FORM_HTML));
                PortalStep::ServedForm
            }
            PortalRequest::Malformed(reason) => {
                log::warn!("portal: malformed request: {:?}", reason);
                send(ap, &http::response::<RESPONSE_CAPACITY>("200 OK", "text/html", FORM_HTML));
                PortalStep::Malformed(reason)
            }
            PortalRequest::Submit(credentials) => match store.save_network(&credentials) {
                Ok(()) => {
                    log::info!("portal: saved network {}", credentials.ssid);
                    send(ap, &http::response::<256>("200 OK", "text/plain", SAVED_TEXT));
                    PortalStep::Saved(credentials)
                }
                Err(e) => {
                    log::error!("portal: saving network failed: {}", e);
                    send(
                        ap,
                        &http::response::<256>(
                            "500 Internal Server Error",
                            "text/plain",
                            "Failed to save",
                        ),
                    );
                    feedback.play(Pattern::ServerError);
                    PortalStep::StoreFailed
                }
            },
        }
    }

    fn drain_tap<R, F>(&mut self, scanner: &mut Scanner<R, C>, feedback: &mut F) -> PortalStep
    where
        R: TagReader,
        F: Feedback,
    {
        match scanner.poll(self.scan_timeout_ms) {
            Some(uid) => {
                log::info!("portal: tap {} while offline", crate::types::card_id(&uid));
                feedback.play(Pattern::WifiError);
                scanner.wait_for_removal();
                PortalStep::TapWhileOffline
            }
            None => PortalStep::Idle,
        }
    }
}

fn send<A: AccessPoint>(ap: &mut A, response: &str) {
    if let Err(e) = ap.respond(response.as_bytes()) {
        log::warn!("portal: response failed: {}", e);
    }
}

/// Classify a raw portal request.
pub fn parse_request(raw: &[u8]) -> PortalRequest {
    let request = match core::str::from_utf8(raw) {
        Ok(s) => s,
        Err(_) => return PortalRequest::Malformed(MalformedRequest::NotUtf8),
    };
    let line = match request.lines().next() {
        Some(line) if !line.trim().is_empty() => line,
        _ => return PortalRequest::Malformed(MalformedRequest::NoRequestLine),
    };
    if !line.contains("ssid=") {
        return PortalRequest::Form;
    }

    // "GET /?ssid=...&password=... HTTP/1.1"
    let target = line.split_whitespace().nth(1).unwrap_or("");
    let query = target.split_once('?').map(|(_, q)| q).unwrap_or(target);

    let mut ssid: Option<HString<MAX_SSID_LEN>> = None;
    let mut password: HString<MAX_PASSWORD_LEN> = HString::new();

    for pair in query.split('&') {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        match key {
            "ssid" => match percent_decode::<MAX_SSID_LEN>(value) {
                Ok(v) => ssid = Some(v),
                Err(DecodeError::TooLong) => {
                    return PortalRequest::Malformed(MalformedRequest::SsidTooLong)
                }
                Err(DecodeError::BadEscape) => {
                    return PortalRequest::Malformed(MalformedRequest::BadEscape)
                }
            },
            "password" => match percent_decode::<MAX_PASSWORD_LEN>(value) {
                Ok(v) => password = v,
                Err(DecodeError::TooLong) => {
                    return PortalRequest::Malformed(MalformedRequest::PasswordTooLong)
                }
                Err(DecodeError::BadEscape) => {
                    return PortalRequest::Malformed(MalformedRequest::BadEscape)
                }
            },
            _ => {}
        }
    }

    match ssid {
        Some(ssid) if !ssid.is_empty() => {
            PortalRequest::Submit(NetworkCredentials { ssid, password })
        }
        _ => PortalRequest::Malformed(MalformedRequest::MissingSsid),
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DecodeError {
    BadEscape,
    TooLong,
}

/// Decode `application/x-www-form-urlencoded` text: `%XX` escapes and `+` for space.
pub fn percent_decode<const N: usize>(input: &str) -> Result<HString<N>, DecodeError> {
    let mut bytes: heapless::Vec<u8, N> = heapless::Vec::new();
    let raw = input.as_bytes();
    let mut i = 0;
    while i < raw.len() {
        let byte = match raw[i] {
            b'%' => {
                let hi = raw.get(i + 1).and_then(|&b| hex_value(b));
                let lo = raw.get(i + 2).and_then(|&b| hex_value(b));
                match (hi, lo) {
                    (Some(hi), Some(lo)) => {
                        i += 2;
                        (hi << 4) | lo
                    }
                    _ => return Err(DecodeError::BadEscape),
                }
            }
            b'+' => b' ',
            b => b,
        };
        bytes.push(byte).map_err(|_| DecodeError::TooLong)?;
        i += 1;
    }
    let text = core::str::from_utf8(&bytes).map_err(|_| DecodeError::BadEscape)?;
    let mut out = HString::new();
    out.push_str(text).map_err(|_| DecodeError::TooLong)?;
    Ok(out)
}

fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}
