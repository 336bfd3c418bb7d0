//! Application-wide constants and compile-time configuration.
//!
//! All hardware assignments, timing parameters, and protocol
//! constants live here so they can be tuned in one place.

use embassy_time::Duration;

// BLE identity & advertising

/// Complete local name carried in the advertising set.
pub const DEVICE_NAME: &str = "TempSound";

/// Bluetooth SIG company identifier placed in manufacturer data.
/// 0x0059 = Nordic Semiconductor ASA.
pub const COMPANY_CODE: u16 = 0x0059;

/// Scan-response URI: scheme byte 0x17 ("https:") followed by "//xkcd.com".
pub const URI_DATA: [u8; 11] = [
    0x17, b'/', b'/', b'x', b'k', b'c', b'd', b'.', b'c', b'o', b'm',
];

/// LED Button Service UUID `00001523-1212-efde-1523-785feabcd123`,
/// little-endian as it goes on air.
pub const LBS_SERVICE_UUID: [u8; 16] = [
    0x23, 0xd1, 0xbc, 0xea, 0x5f, 0x78, 0x23, 0x15, 0xde, 0xef, 0x12, 0x12, 0x23, 0x15, 0x00, 0x00,
];

/// Advertising interval window (in 0.625 ms units).
/// 800 = 500 ms, 801 = 500.625 ms.
pub const ADV_INTERVAL_MIN: u32 = 800;
pub const ADV_INTERVAL_MAX: u32 = 801;

/// Static random identity address `FF:EE:DD:CC:BB:AA`, little-endian.
pub const STATIC_ADDRESS: [u8; 6] = [0xAA, 0xBB, 0xCC, 0xDD, 0xEE, 0xFF];

// Link negotiation

/// Settle time between accepting a connection and reading its parameters.
pub const CONNECT_SETTLE_MS: u64 = 100;

/// Gap between the PHY request and the data-length request, avoids
/// colliding with the central's own LL control procedures.
pub const INTER_REQUEST_DELAY_MS: u64 = 1000;

/// ATT MTU requested during the MTU exchange.
pub const PREFERRED_ATT_MTU: u16 = 247;

/// Bytes of every ATT PDU taken by the attribute header.
pub const ATT_HEADER_LEN: u16 = 3;

/// Maximum LL payload octets / time (µs) requested in the data-length update.
pub const DATA_LEN_MAX: u16 = 251;
pub const DATA_TIME_MAX: u16 = 17040;

// GPIO (nRF52840-DK defaults)
//
//   Button 1       → P0.11
//   LED1 (run)     → P0.13
//   LED2 (conn)    → P0.14
//   BME280 SDA     → P0.26
//   BME280 SCL     → P0.27

/// Bit of the monitored user button in the button state mask.
pub const USER_BUTTON_MASK: u32 = 1 << 0;

/// Button debounce time (ms).
pub const BUTTON_DEBOUNCE_MS: u64 = 20;

/// Run-status LED blink interval (ms).
pub const RUN_LED_BLINK_INTERVAL_MS: u64 = 1000;

// Sensor

/// Polling period of the acquisition loop (ms).
pub const SENSOR_PERIOD_MS: u64 = 1000;

/// Size of the raw buffer handed to the sensor read.
pub const SENSOR_BUFFER_LEN: usize = 128;

/// Fractional digits printed for each fixed-point reading.
pub const RENDER_PRECISION: u8 = 6;

/// How the negotiation requests after connect are spaced.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Pacing {
    /// Wait `inter_request_delay` after the PHY request, then issue
    /// data length and MTU back to back.
    FixedDelay,
    /// Issue each request only once the previous one has been confirmed
    /// (or rejected at issue time).
    AwaitConfirmation,
}

/// Tunables for the post-connection negotiation sequence.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiationConfig {
    pub connect_settle: Duration,
    pub inter_request_delay: Duration,
    pub pacing: Pacing,
}

impl Default for NegotiationConfig {
    fn default() -> Self {
        Self {
            connect_settle: Duration::from_millis(CONNECT_SETTLE_MS),
            inter_request_delay: Duration::from_millis(INTER_REQUEST_DELAY_MS),
            pacing: Pacing::FixedDelay,
        }
    }
}
