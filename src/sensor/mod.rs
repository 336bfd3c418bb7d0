//! Environmental sensor acquisition.
//!
//! A reading travels through three stages:
//!
//! 1. **Read** - one blocking request fills a raw buffer with every
//!    channel of interest ([`SensorDevice::read`]).
//! 2. **Decode** - the device's decoder pulls each channel out of that
//!    buffer as a Q-format pair `value = mantissa * 2^shift`
//!    ([`SensorDecoder::decode`]). Channels are decoded independently.
//! 3. **Render** - each value is printed with a fixed number of fractional
//!    digits ([`render`]).
//!
//! The pipeline only sees the two traits below; the embedded binary
//! implements them for the BME280, the tests with in-memory frames.

pub mod frame;
pub mod pipeline;
pub mod policy;
pub mod render;

use crate::error::{DecodeError, StatusCode};

pub use pipeline::{Pipeline, Termination};
pub use policy::{AcquisitionPolicy, RetryWithBackoff, Terminate};

/// Physical quantity carried by a channel.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SensorChannel {
    /// Degrees Celsius.
    AmbientTemp,
    /// Kilopascal.
    Pressure,
    /// Percent relative humidity.
    Humidity,
}

impl SensorChannel {
    /// Identifier used in the raw frame.
    pub const fn code(&self) -> u8 {
        match self {
            SensorChannel::AmbientTemp => 13,
            SensorChannel::Pressure => 14,
            SensorChannel::Humidity => 16,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            13 => Some(SensorChannel::AmbientTemp),
            14 => Some(SensorChannel::Pressure),
            16 => Some(SensorChannel::Humidity),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SensorChannel::AmbientTemp => "temp",
            SensorChannel::Pressure => "press",
            SensorChannel::Humidity => "humidity",
        }
    }
}

/// A channel and the instance of it on the device.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub channel: SensorChannel,
    pub index: u8,
}

impl ChannelSpec {
    pub const fn first(channel: SensorChannel) -> Self {
        Self { channel, index: 0 }
    }
}

/// Q-format fixed point: `mantissa * 2^shift`.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FixedPoint {
    pub mantissa: i32,
    pub shift: i8,
}

impl FixedPoint {
    pub const fn new(mantissa: i32, shift: i8) -> Self {
        Self { mantissa, shift }
    }
}

/// One acquisition cycle. A channel is `None` when it did not decode.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SensorSample {
    pub temperature: Option<FixedPoint>,
    pub pressure: Option<FixedPoint>,
    pub humidity: Option<FixedPoint>,
}

impl SensorSample {
    pub fn get(&self, channel: SensorChannel) -> Option<FixedPoint> {
        match channel {
            SensorChannel::AmbientTemp => self.temperature,
            SensorChannel::Pressure => self.pressure,
            SensorChannel::Humidity => self.humidity,
        }
    }

    fn slot(&mut self, channel: SensorChannel) -> &mut Option<FixedPoint> {
        match channel {
            SensorChannel::AmbientTemp => &mut self.temperature,
            SensorChannel::Pressure => &mut self.pressure,
            SensorChannel::Humidity => &mut self.humidity,
        }
    }
}

/// Extracts channel readings from a raw buffer.
pub trait SensorDecoder {
    /// Decode up to `max_count` readings of `spec` into `out`.
    ///
    /// `fit` is the iteration cursor: start it at 0 and pass it back to
    /// continue where the previous call stopped. Returns how many readings
    /// were written.
    fn decode(
        &self,
        buf: &[u8],
        spec: ChannelSpec,
        fit: &mut u32,
        max_count: u16,
        out: &mut [FixedPoint],
    ) -> Result<usize, DecodeError>;
}

/// The sensor I/O boundary.
pub trait SensorDevice {
    type Decoder: SensorDecoder;

    fn name(&self) -> &str;

    fn is_ready(&self) -> bool;

    /// Blocking read of `channels` into `buf`. Returns the bytes written.
    fn read(&mut self, channels: &[ChannelSpec], buf: &mut [u8]) -> Result<usize, StatusCode>;

    fn decoder(&self) -> Result<Self::Decoder, StatusCode>;
}
