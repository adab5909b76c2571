//! Device clock and watchdog.

use core::cell::RefCell;

use critical_section::Mutex;
use esp_hal::peripherals::TIMG1;
use esp_hal::timer::timg::Wdt;

use crate::hal::Clock;

// Watchdog on TIMG1; TIMG0 drives the scheduler.
pub(crate) static WATCHDOG: Mutex<RefCell<Option<Wdt<TIMG1<'static>>>>> =
    Mutex::new(RefCell::new(None));

/// Longest single `usleep`; the watchdog is fed between slices.
const SLEEP_SLICE_MS: u64 = 1_000;

pub fn install_watchdog(wdt: Wdt<TIMG1<'static>>) {
    critical_section::with(|cs| {
        WATCHDOG.borrow_ref_mut(cs).replace(wdt);
    });
}

pub fn feed_watchdog() {
    critical_section::with(|cs| {
        if let Some(ref mut wdt) = *WATCHDOG.borrow_ref_mut(cs) {
            wdt.feed();
        }
    });
}

pub fn now_ms() -> u64 {
    esp_hal::time::Instant::now()
        .duration_since_epoch()
        .as_millis()
}

/// Monotonic clock backed by the esp-hal system timer.
///
/// Sleeping yields to the RTOS so the Wi-Fi driver keeps running.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        now_ms()
    }

    fn sleep_ms(&self, ms: u64) {
        let mut remaining = ms;
        loop {
            feed_watchdog();
            if remaining == 0 {
                break;
            }
            let slice = remaining.min(SLEEP_SLICE_MS);
            esp_radio_rtos_driver::usleep((slice * 1_000) as u32);
            remaining -= slice;
        }
    }
}
