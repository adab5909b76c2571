//! PN532 NFC frontend on SPI.

use core::convert::Infallible;
use core::time::Duration;

use embedded_hal::spi::SpiDevice;
use pn532::requests::SAMMode;
use pn532::spi::SPIInterface;
use pn532::{nb, CountDown, Error as PnError, IntoDuration, Pn532, Request};

use crate::hal::TagReader;
use crate::scanner::decode_inlist_uid;
use crate::types::Uid;

const PN532_BUFFER: usize = 64;
const INIT_ATTEMPTS: u8 = 5;
const INIT_RETRY_DELAY_US: u32 = 50_000;

/// `pn532::CountDown` over the system timer.
#[derive(Default)]
pub struct MonoTimer {
    deadline_ms: Option<u64>,
}

impl CountDown for MonoTimer {
    type Time = Duration;

    fn start<T>(&mut self, count: T)
    where
        T: Into<Self::Time>,
    {
        let duration: Duration = count.into();
        self.deadline_ms = Some(crate::system::now_ms() + duration.as_millis() as u64);
    }

    fn wait(&mut self) -> nb::Result<(), Infallible> {
        match self.deadline_ms {
            Some(deadline) if crate::system::now_ms() < deadline => Err(nb::Error::WouldBlock),
            _ => Ok(()),
        }
    }
}

pub struct Nfc<SPI: SpiDevice> {
    pn532: Pn532<SPIInterface<SPI>, MonoTimer, PN532_BUFFER>,
}

impl<SPI: SpiDevice> Nfc<SPI> {
    pub fn new(spi: SPI) -> Self {
        Self {
            pn532: Pn532::new(SPIInterface { spi }, MonoTimer::default()),
        }
    }

    /// Check the firmware answers and switch the SAM to normal mode.
    /// Returns false if the chip never answered.
    pub fn init(&mut self) -> bool {
        for attempt in 1..=INIT_ATTEMPTS {
            crate::system::feed_watchdog();
            match self
                .pn532
                .process(&Request::GET_FIRMWARE_VERSION, 4, 1000_u64.ms())
            {
                Ok(data) if data.len() >= 4 => {
                    log::info!("nfc: PN532 firmware {}.{}", data[1], data[2]);
                }
                Ok(_) => log::info!("nfc: PN532 found"),
                Err(e) => {
                    log::warn!("nfc: no firmware answer (attempt {}): {:?}", attempt, e);
                    esp_radio_rtos_driver::usleep(INIT_RETRY_DELAY_US);
                    continue;
                }
            }

            match self.pn532.process(
                &Request::sam_configuration(SAMMode::Normal, false),
                0,
                50_u64.ms(),
            ) {
                Ok(_) => return true,
                Err(e) => {
                    log::warn!("nfc: SAM configuration failed: {:?}", e);
                    esp_radio_rtos_driver::usleep(INIT_RETRY_DELAY_US);
                }
            }
        }
        log::error!("nfc: PN532 not responding");
        false
    }
}

impl<SPI: SpiDevice> TagReader for Nfc<SPI> {
    fn read_uid(&mut self, timeout_ms: u32) -> Option<Uid> {
        match self.pn532.process(
            &Request::INLIST_ONE_ISO_A_TARGET,
            48,
            (timeout_ms as u64).ms(),
        ) {
            Ok(response) => decode_inlist_uid(response),
            Err(PnError::TimeoutAck) | Err(PnError::TimeoutResponse) => None,
            Err(e) => {
                log::warn!("nfc: read failed: {:?}", e);
                None
            }
        }
    }
}
