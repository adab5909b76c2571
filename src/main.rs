//! Tap Beacon - ESP32 firmware that reports NFC card taps to an HTTP endpoint.
//!
//! Architecture:
//! - `runtime`: single control loop; keeps Wi-Fi up, reads tags, reports taps,
//!   and falls back to a setup portal when the network stays unreachable
//! - `wifi`, `nfc`, `buzzer`, `storage`, `system`: hardware adapters behind
//!   the traits in `hal`
//!
//! Everything except the adapters is hardware-independent and host-tested.

#![no_std]
#![no_main]

use esp_bootloader_esp_idf::esp_app_desc;
esp_app_desc!();

mod buzzer;
mod config;
mod connectivity;
mod dhcp;
mod dispatch;
mod error;
mod failure_window;
mod feedback;
mod hal;
mod http;
mod nfc;
mod portal;
mod records;
mod runtime;
mod scanner;
mod storage;
mod system;
mod types;
mod wifi;

extern crate alloc;

use core::mem::MaybeUninit;
use embassy_embedded_hal::adapter::BlockingAsync;
use embedded_hal_bus::spi::ExclusiveDevice;
use esp_alloc as _;
use esp_hal::{
    clock::CpuClock,
    delay::Delay,
    gpio::{Level, Output, OutputConfig},
    main,
    spi::master::{Config as SpiConfig, Spi},
    spi::{BitOrder, Mode as SpiMode},
    time::{Duration, Rate},
    timer::timg::{MwdtStage, TimerGroup},
};
use esp_println::logger::init_logger;
use esp_radio::wifi::Config as WifiConfig;
use esp_storage::FlashStorage;
use static_cell::StaticCell;

use crate::buzzer::Buzzer;
use crate::config::{Provisioning, RuntimeConfig};
use crate::hal::Clock;
use crate::nfc::Nfc;
use crate::runtime::Runtime;
use crate::storage::{FlashCredentialStore, CREDENTIAL_RANGE};
use crate::system::SystemClock;
use crate::wifi::WifiNet;

static RADIO: StaticCell<esp_radio::Controller<'static>> = StaticCell::new();

#[main]
fn main() -> ! {
    init_logger(log::LevelFilter::Info);
    log::info!("Tap Beacon starting...");

    // Heap backs the radio driver and its config strings.
    const HEAP_SIZE: usize = 72 * 1024;
    static mut HEAP: MaybeUninit<[u8; HEAP_SIZE]> = MaybeUninit::uninit();
    unsafe {
        esp_alloc::HEAP.add_region(esp_alloc::HeapRegion::new(
            core::ptr::addr_of_mut!(HEAP) as *mut u8,
            HEAP_SIZE,
            esp_alloc::MemoryCapability::Internal.into(),
        ));
    }

    let config = esp_hal::Config::default().with_cpu_clock(CpuClock::max());
    let peripherals = esp_hal::init(config);

    // TIMG0 drives the esp-rtos scheduler, which esp_radio needs.
    let timg0 = TimerGroup::new(peripherals.TIMG0);
    esp_rtos::start(timg0.timer0);

    let radio = RADIO.init(esp_radio::init().unwrap());
    let (wifi_controller, interfaces) =
        esp_radio::wifi::new(radio, peripherals.WIFI, WifiConfig::default()).unwrap();

    // TIMG1 hosts the watchdog.
    let timg1 = TimerGroup::new(peripherals.TIMG1);
    let mut wdt = timg1.wdt;
    wdt.enable();
    wdt.set_timeout(MwdtStage::Stage0, Duration::from_secs(30));
    system::install_watchdog(wdt);

    // Piezo on GPIO25, driven by LEDC PWM
    let buzzer = Buzzer::new(peripherals.LEDC, peripherals.GPIO25);

    // PN532 on VSPI: SCK=18, MOSI=23, MISO=19, CS=5. The chip talks LSB first.
    let spi_config = SpiConfig::default()
        .with_frequency(Rate::from_khz(1_000))
        .with_mode(SpiMode::_0)
        .with_read_bit_order(BitOrder::LsbFirst)
        .with_write_bit_order(BitOrder::LsbFirst);
    let spi = Spi::new(peripherals.SPI2, spi_config)
        .unwrap()
        .with_sck(peripherals.GPIO18)
        .with_mosi(peripherals.GPIO23)
        .with_miso(peripherals.GPIO19);
    let cs = Output::new(peripherals.GPIO5, Level::High, OutputConfig::default());
    let mut nfc = Nfc::new(ExclusiveDevice::new(spi, cs, Delay::new()).unwrap());
    nfc.init();

    let mut store = FlashCredentialStore::new(
        BlockingAsync::new(FlashStorage::new()),
        CREDENTIAL_RANGE,
        Provisioning::get(),
    );
    store.seed_identity();

    let net = WifiNet::new(wifi_controller, interfaces.sta, interfaces.ap);
    let clock = SystemClock;
    let runtime = Runtime::new(RuntimeConfig::default(), net, nfc, buzzer, store, clock);

    if let Err(e) = runtime.run(esp_hal::system::software_reset) {
        log::error!("halted: {}", e);
    }

    // Keep feeding the watchdog so a misprovisioned device stays quiet
    // instead of boot-looping.
    loop {
        clock.sleep_ms(60_000);
    }
}

#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    critical_section::with(|_| {
        log::error!("PANIC: {}", info);
    });

    // Spin without feeding watchdog. The 30s timeout will trigger a full system reset.
    loop {
        core::hint::spin_loop();
    }
}
