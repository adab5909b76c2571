//! Piezo driver on the LEDC PWM peripheral.
//!
//! Every tone reprograms low-speed timer 0 to the tone frequency and points
//! channel 0 at it with the requested duty. Silence is the same channel at
//! duty 0, so the pin idles low.

use esp_hal::gpio::{AnyPin, DriveMode};
use esp_hal::ledc::channel::{self, ChannelIFace};
use esp_hal::ledc::timer::{self, TimerIFace};
use esp_hal::ledc::{LSGlobalClkSource, Ledc, LowSpeed};
use esp_hal::peripherals::LEDC;
use esp_hal::time::Rate;

use crate::hal::Transducer;

/// 10 bits keeps the APB divider in range from roughly 80 Hz to 78 kHz.
const DUTY_RESOLUTION: timer::config::Duty = timer::config::Duty::Duty10Bit;

/// Frequency the timer is left at while silent.
const IDLE_FREQUENCY_HZ: u32 = 1_000;

pub struct Buzzer<'d> {
    ledc: Ledc<'d>,
    pin: AnyPin<'d>,
    frequency_hz: u32,
}

impl<'d> Buzzer<'d> {
    pub fn new(ledc: LEDC<'d>, pin: impl Into<AnyPin<'d>>) -> Self {
        let mut ledc = Ledc::new(ledc);
        ledc.set_global_slow_clock(LSGlobalClkSource::APBClk);
        let mut buzzer = Self {
            ledc,
            pin: pin.into(),
            frequency_hz: IDLE_FREQUENCY_HZ,
        };
        buzzer.apply(IDLE_FREQUENCY_HZ, 0);
        buzzer
    }

    fn apply(&mut self, frequency_hz: u32, duty_pct: u8) {
        let mut lstimer = self.ledc.timer::<LowSpeed>(timer::Number::Timer0);
        if let Err(e) = lstimer.configure(timer::config::Config {
            duty: DUTY_RESOLUTION,
            clock_source: timer::LSClockSource::APBClk,
            frequency: Rate::from_hz(frequency_hz),
        }) {
            log::warn!("buzzer: {} Hz not reachable: {:?}", frequency_hz, e);
            return;
        }

        let mut output = self
            .ledc
            .channel(channel::Number::Channel0, self.pin.reborrow());
        if let Err(e) = output.configure(channel::config::Config {
            timer: &lstimer,
            duty_pct,
            drive_mode: DriveMode::PushPull,
        }) {
            log::warn!("buzzer: channel setup failed: {:?}", e);
            return;
        }
        self.frequency_hz = frequency_hz;
    }
}

impl Transducer for Buzzer<'_> {
    fn set_tone(&mut self, frequency_hz: u32, duty_pct: u8) {
        if frequency_hz == 0 || duty_pct == 0 {
            self.stop();
            return;
        }
        self.apply(frequency_hz, duty_pct.min(100));
    }

    fn stop(&mut self) {
        self.apply(self.frequency_hz, 0);
    }
}
