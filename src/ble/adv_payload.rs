//! Advertising and scan-response payload encoding.
//!
//! The advertising set carries flags, the complete local name and 4 bytes
//! of manufacturer data (company code + press counter, both little-endian).
//! The scan response carries the URI and the 128-bit LED Button Service
//! UUID. Both sets are always encoded together from one payload snapshot.

use crate::config;
use crate::error::PayloadError;
use heapless::Vec;

/// Legacy advertising PDU payload limit.
pub const AD_MAX_LEN: usize = 31;

/// One encoded advertising or scan-response set.
pub type AdData = Vec<u8, AD_MAX_LEN>;

/// AD types used by this firmware.
pub mod ad_type {
    pub const FLAGS: u8 = 0x01;
    pub const UUID128_ALL: u8 = 0x07;
    pub const NAME_COMPLETE: u8 = 0x09;
    pub const URI: u8 = 0x24;
    pub const MANUFACTURER_DATA: u8 = 0xFF;
}

/// LE General Discoverable | BR/EDR Not Supported.
pub const ADV_FLAGS: u8 = 0x02 | 0x04;

/// Manufacturer-specific data: company code and button press counter.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ManufacturerData {
    pub company_code: u16,
    pub press_count: u16,
}

impl ManufacturerData {
    pub const LEN: usize = 4;

    pub fn to_bytes(&self) -> [u8; Self::LEN] {
        let c = self.company_code.to_le_bytes();
        let n = self.press_count.to_le_bytes();
        [c[0], c[1], n[0], n[1]]
    }

    pub fn from_bytes(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN {
            return None;
        }
        Some(Self {
            company_code: u16::from_le_bytes([data[0], data[1]]),
            press_count: u16::from_le_bytes([data[2], data[3]]),
        })
    }
}

/// Full content of the advertising and scan-response sets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AdvertisingPayload {
    pub name: &'static str,
    pub manufacturer: ManufacturerData,
    pub uri: &'static [u8],
    pub service_uuid: [u8; 16],
}

/// Both sets, encoded from the same snapshot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedPayload {
    pub adv: AdData,
    pub scan: AdData,
}

impl AdvertisingPayload {
    /// Payload with the configured identity and the given press count.
    pub fn new(press_count: u16) -> Self {
        Self {
            name: config::DEVICE_NAME,
            manufacturer: ManufacturerData {
                company_code: config::COMPANY_CODE,
                press_count,
            },
            uri: &config::URI_DATA,
            service_uuid: config::LBS_SERVICE_UUID,
        }
    }

    pub fn with_press_count(mut self, press_count: u16) -> Self {
        self.manufacturer.press_count = press_count;
        self
    }

    /// Flags + complete local name + manufacturer data.
    pub fn advertising_data(&self) -> Result<AdData, PayloadError> {
        let mut buf = AdData::new();
        push_field(&mut buf, ad_type::FLAGS, &[ADV_FLAGS])?;
        push_field(&mut buf, ad_type::NAME_COMPLETE, self.name.as_bytes())?;
        push_field(
            &mut buf,
            ad_type::MANUFACTURER_DATA,
            &self.manufacturer.to_bytes(),
        )?;
        Ok(buf)
    }

    /// URI + complete list of 128-bit service UUIDs.
    pub fn scan_response_data(&self) -> Result<AdData, PayloadError> {
        let mut buf = AdData::new();
        push_field(&mut buf, ad_type::URI, self.uri)?;
        push_field(&mut buf, ad_type::UUID128_ALL, &self.service_uuid)?;
        Ok(buf)
    }

    pub fn encode(&self) -> Result<EncodedPayload, PayloadError> {
        Ok(EncodedPayload {
            adv: self.advertising_data()?,
            scan: self.scan_response_data()?,
        })
    }
}

fn push_field(buf: &mut AdData, ty: u8, data: &[u8]) -> Result<(), PayloadError> {
    if data.len() > u8::MAX as usize - 1 || buf.len() + 2 + data.len() > AD_MAX_LEN {
        return Err(PayloadError::Overflow);
    }
    buf.push((data.len() + 1) as u8)
        .map_err(|_| PayloadError::Overflow)?;
    buf.push(ty).map_err(|_| PayloadError::Overflow)?;
    buf.extend_from_slice(data)
        .map_err(|_| PayloadError::Overflow)
}

/// Return the data of the first AD structure of type `ty`.
pub fn find_field(data: &[u8], ty: u8) -> Option<&[u8]> {
    let mut i = 0;
    while i < data.len() {
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            break;
        }
        if data[i + 1] == ty {
            return Some(&data[i + 2..i + 1 + len]);
        }
        i += len + 1;
    }
    None
}

/// Decode the manufacturer data field of an advertising set.
pub fn manufacturer_data(data: &[u8]) -> Option<ManufacturerData> {
    find_field(data, ad_type::MANUFACTURER_DATA)
        .and_then(ManufacturerData::from_bytes)
}

/// Complete local name of an advertising set, if it is valid UTF-8.
pub fn device_name(data: &[u8]) -> Option<&str> {
    find_field(data, ad_type::NAME_COMPLETE)
        .and_then(|b| core::str::from_utf8(b).ok())
}
