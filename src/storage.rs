//! Credential persistence on a sequential-storage map.
//!
//! Two records live in a dedicated flash range: the Wi-Fi network saved from
//! the setup portal and the device identity. sequential-storage appends new
//! versions and garbage-collects old ones itself, so a power loss mid-write
//! leaves the previous record readable.
//!
//! Build-time provisioning (see [`Provisioning`]) is the fallback. On first
//! boot the baked-in identity is written to flash so it survives a later
//! reflash without the environment variables. A baked-in network is only used
//! until the portal saves one.
//!
//! The map API is async; the firmware is not, so every call is driven to
//! completion with `block_on`. Flash operations finish without yielding.

use core::ops::Range;

use embassy_futures::block_on;
use embedded_storage_async::nor_flash::NorFlash;
use sequential_storage::cache::NoCache;
use sequential_storage::map::{fetch_item, store_item, Value};

use crate::config::Provisioning;
use crate::error::StoreError;
use crate::hal::CredentialStore;
use crate::records::{RecordKey, MAX_RECORD_LEN};
use crate::types::{DeviceIdentity, NetworkCredentials};

/// Eight 4 KiB sectors below the top of a 4 MiB flash, clear of the app partition.
pub const CREDENTIAL_RANGE: Range<u32> = 0x3D_0000..0x3D_8000;

/// Map item buffer: record plus key and item header headroom.
const DATA_BUFFER_LEN: usize = MAX_RECORD_LEN + 32;

pub struct FlashCredentialStore<F> {
    flash: F,
    range: Range<u32>,
    provisioning: Provisioning,
}

impl<F: NorFlash> FlashCredentialStore<F> {
    pub fn new(flash: F, range: Range<u32>, provisioning: Provisioning) -> Self {
        Self {
            flash,
            range,
            provisioning,
        }
    }

    /// Write the baked-in identity if flash holds none yet.
    pub fn seed_identity(&mut self) {
        if self.fetch::<DeviceIdentity>(RecordKey::Identity).is_some() {
            return;
        }
        let Some(identity) = self.provisioning.identity() else {
            return;
        };
        match self.store(RecordKey::Identity, &identity) {
            Ok(()) => log::info!("storage: seeded identity for {}", identity.device_id),
            Err(e) => log::error!("storage: seeding identity failed: {}", e),
        }
    }

    fn fetch<V>(&mut self, key: RecordKey) -> Option<V>
    where
        V: for<'d> Value<'d>,
    {
        let mut buffer = [0u8; DATA_BUFFER_LEN];
        let result = block_on(fetch_item::<RecordKey, V, _>(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut buffer,
            &key,
        ));
        match result {
            Ok(value) => value,
            Err(e) => {
                log::warn!("storage: reading {:?} failed: {:?}", key, e);
                None
            }
        }
    }

    fn store<V>(&mut self, key: RecordKey, value: &V) -> Result<(), StoreError>
    where
        V: for<'d> Value<'d>,
    {
        let mut buffer = [0u8; DATA_BUFFER_LEN];
        block_on(store_item(
            &mut self.flash,
            self.range.clone(),
            &mut NoCache::new(),
            &mut buffer,
            &key,
            value,
        ))
        .map_err(|e| {
            log::error!("storage: writing {:?} failed: {:?}", key, e);
            match e {
                sequential_storage::Error::Storage { .. } => StoreError::Flash,
                _ => StoreError::Serialization,
            }
        })
    }
}

impl<F: NorFlash> CredentialStore for FlashCredentialStore<F> {
    fn load_network(&mut self) -> Option<NetworkCredentials> {
        if let Some(credentials) = self.fetch::<NetworkCredentials>(RecordKey::Network) {
            log::info!("storage: network {} from flash", credentials.ssid);
            return Some(credentials);
        }
        let credentials = self.provisioning.network()?;
        log::info!("storage: network {} from build", credentials.ssid);
        Some(credentials)
    }

    fn save_network(&mut self, credentials: &NetworkCredentials) -> Result<(), StoreError> {
        self.store(RecordKey::Network, credentials)
    }

    fn load_identity(&mut self) -> Option<DeviceIdentity> {
        self.fetch::<DeviceIdentity>(RecordKey::Identity)
            .or_else(|| self.provisioning.identity())
    }
}
