//! Flash record encoding for the sequential-storage map.
//!
//! Each value starts with a version byte followed by its string fields, each
//! written as `[len: u8][utf8 bytes]`. Unknown versions and out-of-range
//! lengths fail to decode, which the store treats as an absent record.

use heapless::String as HString;
use sequential_storage::map::{Key, SerializationError, Value};

use crate::types::{
    DeviceIdentity, NetworkCredentials, MAX_DEVICE_ID_LEN, MAX_PASSWORD_LEN, MAX_SECRET_LEN,
    MAX_SSID_LEN, MAX_URL_LEN,
};

pub const RECORD_VERSION: u8 = 1;

/// Largest encoded record, used to size the map buffer.
pub const MAX_RECORD_LEN: usize =
    1 + (1 + MAX_DEVICE_ID_LEN) + (1 + MAX_URL_LEN) + (1 + MAX_SECRET_LEN);

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[repr(u8)]
pub enum RecordKey {
    Network = 0,
    Identity = 1,
}

impl Key for RecordKey {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        *buffer
            .first_mut()
            .ok_or(SerializationError::BufferTooSmall)? = *self as u8;
        Ok(1)
    }

    fn deserialize_from(buffer: &[u8]) -> Result<(Self, usize), SerializationError> {
        match buffer.first() {
            Some(0) => Ok((Self::Network, 1)),
            Some(1) => Ok((Self::Identity, 1)),
            Some(_) => Err(SerializationError::InvalidFormat),
            None => Err(SerializationError::BufferTooSmall),
        }
    }
}

impl<'a> Value<'a> for NetworkCredentials {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let mut w = Writer::new(buffer)?;
        w.field(&self.ssid)?;
        w.field(&self.password)?;
        Ok(w.len())
    }

    fn deserialize_from(buffer: &'a [u8]) -> Result<Self, SerializationError> {
        let mut r = Reader::new(buffer)?;
        let ssid: HString<MAX_SSID_LEN> = r.field()?;
        let password: HString<MAX_PASSWORD_LEN> = r.field()?;
        if ssid.is_empty() {
            return Err(SerializationError::InvalidFormat);
        }
        Ok(Self { ssid, password })
    }
}

impl<'a> Value<'a> for DeviceIdentity {
    fn serialize_into(&self, buffer: &mut [u8]) -> Result<usize, SerializationError> {
        let mut w = Writer::new(buffer)?;
        w.field(&self.device_id)?;
        w.field(&self.endpoint_url)?;
        w.field(&self.endpoint_secret)?;
        Ok(w.len())
    }

    fn deserialize_from(buffer: &'a [u8]) -> Result<Self, SerializationError> {
        let mut r = Reader::new(buffer)?;
        let device_id: HString<MAX_DEVICE_ID_LEN> = r.field()?;
        let endpoint_url: HString<MAX_URL_LEN> = r.field()?;
        let endpoint_secret: HString<MAX_SECRET_LEN> = r.field()?;
        if device_id.is_empty() || endpoint_url.is_empty() || endpoint_secret.is_empty() {
            return Err(SerializationError::InvalidFormat);
        }
        Ok(Self {
            device_id,
            endpoint_url,
            endpoint_secret,
        })
    }
}

struct Writer<'b> {
    buffer: &'b mut [u8],
    at: usize,
}

impl<'b> Writer<'b> {
    fn new(buffer: &'b mut [u8]) -> Result<Self, SerializationError> {
        *buffer
            .first_mut()
            .ok_or(SerializationError::BufferTooSmall)? = RECORD_VERSION;
        Ok(Self { buffer, at: 1 })
    }

    fn field(&mut self, value: &str) -> Result<(), SerializationError> {
        let bytes = value.as_bytes();
        let len = u8::try_from(bytes.len()).map_err(|_| SerializationError::InvalidData)?;
        let end = self.at + 1 + bytes.len();
        if self.buffer.len() < end {
            return Err(SerializationError::BufferTooSmall);
        }
        self.buffer[self.at] = len;
        self.buffer[self.at + 1..end].copy_from_slice(bytes);
        self.at = end;
        Ok(())
    }

    fn len(&self) -> usize {
        self.at
    }
}

struct Reader<'b> {
    buffer: &'b [u8],
    at: usize,
}

impl<'b> Reader<'b> {
    fn new(buffer: &'b [u8]) -> Result<Self, SerializationError> {
        match buffer.first() {
            Some(&RECORD_VERSION) => Ok(Self { buffer, at: 1 }),
            Some(_) => Err(SerializationError::InvalidFormat),
            None => Err(SerializationError::BufferTooSmall),
        }
    }

    fn field<const N: usize>(&mut self) -> Result<HString<N>, SerializationError> {
        let len = *self
            .buffer
            .get(self.at)
            .ok_or(SerializationError::BufferTooSmall)? as usize;
        if len > N {
            return Err(SerializationError::InvalidFormat);
        }
        let bytes = self
            .buffer
            .get(self.at + 1..self.at + 1 + len)
            .ok_or(SerializationError::BufferTooSmall)?;
        let text = core::str::from_utf8(bytes).map_err(|_| SerializationError::InvalidFormat)?;
        let mut out = HString::new();
        out.push_str(text)
            .map_err(|_| SerializationError::InvalidFormat)?;
        self.at += 1 + len;
        Ok(out)
    }
}
