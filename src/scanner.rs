//! Tag scanner: one bounded reader poll per call, with held-card debounce.
//!
//! A card resting on the reader keeps answering every poll. After a UID is
//! yielded the caller waits for removal; until the reader reports an empty
//! field, further reads of the same UID are swallowed so one physical tap
//! produces one event.

use crate::config::RuntimeConfig;
use crate::hal::{Clock, TagReader};
use crate::types::{Uid, MAX_UID_LEN};

pub struct Scanner<R, C> {
    reader: R,
    clock: C,
    held: Option<Uid>,
    removal_poll_timeout_ms: u32,
    removal_sleep_ms: u64,
    max_hold_ms: u64,
}

impl<R: TagReader, C: Clock> Scanner<R, C> {
    pub fn new(reader: R, clock: C, config: &RuntimeConfig) -> Self {
        Self {
            reader,
            clock,
            held: None,
            removal_poll_timeout_ms: config.removal_poll_timeout_ms,
            removal_sleep_ms: config.removal_sleep_ms,
            max_hold_ms: config.max_hold_ms,
        }
    }

    /// Poll the reader once. Returns a UID only for a newly presented card.
    pub fn poll(&mut self, timeout_ms: u32) -> Option<Uid> {
        match self.reader.read_uid(timeout_ms) {
            None => {
                if self.held.take().is_some() {
                    log::debug!("scan: card removed");
                }
                None
            }
            Some(uid) if self.held.as_ref() == Some(&uid) => None,
            Some(uid) => {
                self.held = Some(uid.clone());
                Some(uid)
            }
        }
    }

    /// Block until the field is empty or `max_hold_ms` passes.
    ///
    /// Returns false if the card was still present at the deadline; the UID
    /// stays held and is not reported again until it leaves.
    pub fn wait_for_removal(&mut self) -> bool {
        let deadline = self.clock.now_ms() + self.max_hold_ms;
        loop {
            if self.reader.read_uid(self.removal_poll_timeout_ms).is_none() {
                self.held = None;
                return true;
            }
            if self.clock.now_ms() >= deadline {
                log::warn!("scan: card left on reader, suppressing repeats");
                return false;
            }
            self.clock.sleep_ms(self.removal_sleep_ms);
        }
    }

    #[cfg(test)]
    pub fn is_holding(&self) -> bool {
        self.held.is_some()
    }
}

/// Extract the first target's UID from a PN532 `InListPassiveTarget`
/// (106 kbps type A) response body.
///
/// Layout: `[NbTg, Tg, SENS_RES(2), SEL_RES, NFCIDLength, NFCID...]`.
pub fn decode_inlist_uid(response: &[u8]) -> Option<Uid> {
    if response.len() < 7 || response[0] == 0 {
        return None;
    }
    let uid_len = response[5] as usize;
    if uid_len == 0 || uid_len > MAX_UID_LEN {
        return None;
    }
    let uid = response.get(6..6 + uid_len)?;
    Uid::from_slice(uid).ok()
}
