//! Audible feedback.
//!
//! The device has no screen, so every failure class that reaches the user is
//! told apart by its tone pattern alone:
//!
//! | Pattern       | Sound                       | Meaning                          |
//! |---------------|-----------------------------|----------------------------------|
//! | `Boot`        | one long mid tone           | powered up, joining network      |
//! | `Success`     | rising two-tone chirp       | tap delivered                    |
//! | `WifiError`   | low double beep             | cannot reach the Wi-Fi network   |
//! | `ServerError` | high triple beep            | endpoint rejected or unreachable |
//!
//! Playback blocks for the whole pattern so it never overlaps the next action.

use crate::hal::{Clock, Transducer};

/// One step of a pattern, played `repeat` times.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tone {
    pub frequency_hz: u32,
    pub duty_pct: u8,
    pub on_ms: u64,
    pub off_ms: u64,
    pub repeat: u8,
}

const fn tone(frequency_hz: u32, on_ms: u64, off_ms: u64, repeat: u8) -> Tone {
    Tone {
        frequency_hz,
        duty_pct: 60,
        on_ms,
        off_ms,
        repeat,
    }
}

const BOOT: &[Tone] = &[tone(800, 700, 0, 1)];
const SUCCESS: &[Tone] = &[tone(1_500, 90, 40, 1), tone(2_000, 160, 0, 1)];
const WIFI_ERROR: &[Tone] = &[tone(400, 250, 150, 2)];
const SERVER_ERROR: &[Tone] = &[tone(1_000, 100, 100, 3)];

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pattern {
    Boot,
    Success,
    WifiError,
    ServerError,
}

impl Pattern {
    pub fn tones(self) -> &'static [Tone] {
        match self {
            Pattern::Boot => BOOT,
            Pattern::Success => SUCCESS,
            Pattern::WifiError => WIFI_ERROR,
            Pattern::ServerError => SERVER_ERROR,
        }
    }

    /// Total blocking time of the pattern.
    pub fn duration_ms(self) -> u64 {
        self.tones()
            .iter()
            .map(|t| (t.on_ms + t.off_ms) * t.repeat as u64)
            .sum()
    }
}

/// Anything that can play a feedback pattern.
pub trait Feedback {
    fn play(&mut self, pattern: Pattern);
}

/// Plays patterns on a [`Transducer`].
pub struct Signaler<T, C> {
    transducer: T,
    clock: C,
}

impl<T: Transducer, C: Clock> Signaler<T, C> {
    pub fn new(transducer: T, clock: C) -> Self {
        Self { transducer, clock }
    }
}

impl<T: Transducer, C: Clock> Feedback for Signaler<T, C> {
    fn play(&mut self, pattern: Pattern) {
        log::debug!("feedback: {:?}", pattern);
        for step in pattern.tones() {
            for _ in 0..step.repeat {
                self.transducer.set_tone(step.frequency_hz, step.duty_pct);
                self.clock.sleep_ms(step.on_ms);
                self.transducer.stop();
                if step.off_ms > 0 {
                    self.clock.sleep_ms(step.off_ms);
                }
            }
        }
    }
}
