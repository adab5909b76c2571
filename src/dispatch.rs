//! Tap reporting with bounded retry.
//!
//! Only transport failures are retried, and only `dispatch_retries` times: the
//! device has to get back to the reader for the next tap. A non-2xx answer is
//! final. Every report ends in exactly one feedback pattern.

use core::fmt::Write as FmtWrite;
use heapless::String as HString;

use crate::config::RuntimeConfig;
use crate::feedback::{Feedback, Pattern};
use crate::hal::{Clock, HttpClient};
use crate::types::{DeliveryOutcome, DeviceIdentity, TapEvent, MAX_URL_LEN};

pub const TAP_PATH: &str = "/tap";
pub const SECRET_HEADER: &str = "x-internal";

/// JSON body: device id (escaped) plus card id plus framing.
pub const PAYLOAD_CAPACITY: usize = 256;

pub type TapUrl = HString<{ MAX_URL_LEN + 4 }>;

pub struct Dispatcher<C> {
    clock: C,
    retries: u8,
    retry_delay_ms: u64,
}

impl<C: Clock> Dispatcher<C> {
    pub fn new(clock: C, config: &RuntimeConfig) -> Self {
        Self {
            clock,
            retries: config.dispatch_retries,
            retry_delay_ms: config.retry_delay_ms,
        }
    }

    pub fn report<H, F>(
        &mut self,
        http: &mut H,
        feedback: &mut F,
        tap: &TapEvent,
        identity: &DeviceIdentity,
    ) -> DeliveryOutcome
    where
        H: HttpClient,
        F: Feedback,
    {
        let outcome = self.deliver(http, tap, identity);
        match outcome {
            DeliveryOutcome::Delivered(status) => {
                log::info!("dispatch: card {} delivered ({})", tap.card_id(), status);
                feedback.play(Pattern::Success);
            }
            DeliveryOutcome::ServerError(status) => {
                log::warn!("dispatch: card {} rejected ({})", tap.card_id(), status);
                feedback.play(Pattern::ServerError);
            }
            DeliveryOutcome::NetworkFailure => {
                log::warn!("dispatch: card {} dropped, endpoint unreachable", tap.card_id());
                feedback.play(Pattern::ServerError);
            }
        }
        outcome
    }

    fn deliver<H: HttpClient>(
        &mut self,
        http: &mut H,
        tap: &TapEvent,
        identity: &DeviceIdentity,
    ) -> DeliveryOutcome {
        let url = tap_url(&identity.endpoint_url);
        let body = match tap_payload(&identity.device_id, tap) {
            Some(body) => body,
            None => {
                log::error!("dispatch: payload does not fit");
                return DeliveryOutcome::NetworkFailure;
            }
        };
        let headers = [
            ("Content-Type", "application/json"),
            (SECRET_HEADER, identity.endpoint_secret.as_str()),
        ];

        let mut attempt: u16 = 0;
        loop {
            attempt += 1;
            match http.post(&url, &headers, &body) {
                Ok(status) => return classify(status),
                Err(e) if attempt <= u16::from(self.retries) => {
                    log::warn!("dispatch: attempt {} failed: {}, retrying", attempt, e);
                    self.clock.sleep_ms(self.retry_delay_ms);
                }
                Err(e) => {
                    log::warn!("dispatch: attempt {} failed: {}", attempt, e);
                    return DeliveryOutcome::NetworkFailure;
                }
            }
        }
    }
}

pub fn classify(status: u16) -> DeliveryOutcome {
    if (200..300).contains(&status) {
        DeliveryOutcome::Delivered(status)
    } else {
        DeliveryOutcome::ServerError(status)
    }
}

/// `endpoint_url` with any trailing slash removed, plus `/tap`.
pub fn tap_url(endpoint_url: &str) -> TapUrl {
    let mut url = TapUrl::new();
    let _ = url.push_str(endpoint_url.trim_end_matches('/'));
    let _ = url.push_str(TAP_PATH);
    url
}

/// `{"deviceid":"...","cardID":"..."}`
pub fn tap_payload(device_id: &str, tap: &TapEvent) -> Option<HString<PAYLOAD_CAPACITY>> {
    let mut body: HString<PAYLOAD_CAPACITY> = HString::new();
    body.push_str(r#"{"deviceid":"#).ok()?;
    write_json_string(&mut body, device_id).ok()?;
    write!(body, r#","cardID":"{}"}}"#, tap.card_id()).ok()?;
    Some(body)
}

fn write_json_string<W: FmtWrite>(out: &mut W, value: &str) -> core::fmt::Result {
    out.write_char('"')?;
    for c in value.chars() {
        match c {
            '"' => out.write_str("\\\"")?,
            '\\' => out.write_str("\\\\")?,
            '\n' => out.write_str("\\n")?,
            '\r' => out.write_str("\\r")?,
            '\t' => out.write_str("\\t")?,
            c if (c as u32) < 0x20 => write!(out, "\\u{:04x}", c as u32)?,
            c => out.write_char(c)?,
        }
    }
    out.write_char('"')
}
