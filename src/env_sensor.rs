//! BME280 environmental sensor, exposed as a [`SensorDevice`].
//!
//! Register access and compensation come from the `bme280` driver. Each
//! read runs one forced measurement and writes the channels into a sensor
//! frame as Q-format values: temperature in °C (Q15.16), pressure in kPa
//! (Q15.16), humidity in %RH (Q22.10).

use bme280::i2c::BME280;
use defmt::{info, warn, Debug2Format};
use embassy_time::Delay;
use embedded_hal::i2c::I2c;

use tempsound::error::StatusCode;
use tempsound::sensor::frame::{FrameDecoder, FrameWriter};
use tempsound::sensor::{ChannelSpec, FixedPoint, SensorChannel, SensorDevice};

const EIO: StatusCode = StatusCode(-5);
const ENOMEM: StatusCode = StatusCode(-12);

pub struct EnvSensor<I> {
    driver: BME280<I>,
    ready: bool,
}

impl<I: I2c> EnvSensor<I> {
    /// Bind the driver at the primary address (0x76) and initialise it.
    /// A failed init leaves the device present but not ready.
    pub fn new(i2c: I) -> Self {
        let mut driver = BME280::new_primary(i2c);
        let ready = match driver.init(&mut Delay) {
            Ok(()) => {
                info!("BME280 initialised");
                true
            }
            Err(e) => {
                warn!("BME280 init failed: {}", Debug2Format(&e));
                false
            }
        };
        Self { driver, ready }
    }
}

fn q16(value: f32) -> FixedPoint {
    FixedPoint::new((value * 65_536.0) as i32, -16)
}

impl<I: I2c> SensorDevice for EnvSensor<I> {
    type Decoder = FrameDecoder;

    fn name(&self) -> &str {
        "bme280@76"
    }

    fn is_ready(&self) -> bool {
        self.ready
    }

    fn read(&mut self, channels: &[ChannelSpec], buf: &mut [u8]) -> Result<usize, StatusCode> {
        let m = self.driver.measure(&mut Delay).map_err(|e| {
            warn!("BME280 measurement failed: {}", Debug2Format(&e));
            EIO
        })?;

        let mut frame = FrameWriter::new(buf).map_err(|_| ENOMEM)?;
        for spec in channels {
            let value = match spec.channel {
                SensorChannel::AmbientTemp => q16(m.temperature),
                SensorChannel::Pressure => q16(m.pressure / 1000.0),
                SensorChannel::Humidity => FixedPoint::new((m.humidity * 1024.0) as i32, -10),
            };
            frame.push(*spec, value).map_err(|_| ENOMEM)?;
        }
        Ok(frame.len())
    }

    fn decoder(&self) -> Result<FrameDecoder, StatusCode> {
        Ok(FrameDecoder)
    }
}
