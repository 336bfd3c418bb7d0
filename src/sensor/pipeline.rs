//! Acquire → decode → render loop.
//!
//! One cycle reads the device once, fetches the decoder once and decodes
//! the three channels independently from the same buffer. A channel that
//! fails to decode is reported as absent; the other two are unaffected.
//! The loop then sleeps a fixed period with no drift compensation.

use embassy_time::Duration;
use embedded_hal_async::delay::DelayNs;
use heapless::Vec;

use super::policy::{AcquisitionPolicy, Verdict};
use super::render::render_sample;
use super::{ChannelSpec, FixedPoint, SensorChannel, SensorDecoder, SensorDevice, SensorSample};
use crate::config::{RENDER_PRECISION, SENSOR_BUFFER_LEN, SENSOR_PERIOD_MS};
use crate::error::{AcquisitionError, DecodeError};

/// Channels requested in every read.
pub const CHANNELS: [ChannelSpec; 3] = [
    ChannelSpec::first(SensorChannel::AmbientTemp),
    ChannelSpec::first(SensorChannel::Humidity),
    ChannelSpec::first(SensorChannel::Pressure),
];

/// Decode order, also the print order.
const DECODE_ORDER: [SensorChannel; 3] = [
    SensorChannel::AmbientTemp,
    SensorChannel::Pressure,
    SensorChannel::Humidity,
];

pub type RawBuffer = Vec<u8, SENSOR_BUFFER_LEN>;

/// Why the acquisition loop ended.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// No usable sensor at start-up; a graceful stop.
    DeviceAbsent,
    Failed(AcquisitionError),
}

impl Termination {
    pub fn exit_code(&self) -> i32 {
        match self {
            Termination::DeviceAbsent => 0,
            Termination::Failed(e) => e.exit_code(),
        }
    }
}

/// Presence check run before the loop.
pub fn check_device<D: SensorDevice>(device: Option<D>) -> Result<D, Termination> {
    let Some(device) = device else {
        error!("Error: no device found.");
        return Err(Termination::DeviceAbsent);
    };
    if !device.is_ready() {
        error!(
            "Error: Device \"{}\" is not ready; check the driver initialization logs for errors.",
            device.name()
        );
        return Err(Termination::DeviceAbsent);
    }
    info!("Found device \"{}\", getting sensor data", device.name());
    Ok(device)
}

pub struct Pipeline<D, P> {
    device: D,
    policy: P,
    period: Duration,
    precision: u8,
}

impl<D: SensorDevice, P: AcquisitionPolicy> Pipeline<D, P> {
    pub fn new(device: D, policy: P) -> Self {
        Self {
            device,
            policy,
            period: Duration::from_millis(SENSOR_PERIOD_MS),
            precision: RENDER_PRECISION,
        }
    }

    pub fn with_period(mut self, period: Duration) -> Self {
        self.period = period;
        self
    }

    /// One blocking read of every channel.
    pub fn acquire(&mut self) -> Result<RawBuffer, AcquisitionError> {
        let mut buf = [0u8; SENSOR_BUFFER_LEN];
        let len = self.device.read(&CHANNELS, &mut buf).map_err(|status| {
            error!("{}: sensor read failed: {}", self.device.name(), status.0);
            AcquisitionError::Read(status)
        })?;
        let mut raw = RawBuffer::new();
        // `len` is bounded by the buffer we handed out.
        let _ = raw.extend_from_slice(&buf[..len.min(SENSOR_BUFFER_LEN)]);
        Ok(raw)
    }

    /// Decode all channels. Only a missing decoder is an error.
    pub fn decode(&self, raw: &[u8]) -> Result<SensorSample, AcquisitionError> {
        let decoder = self.device.decoder().map_err(|status| {
            error!("{}: sensor get decoder failed: {}", self.device.name(), status.0);
            AcquisitionError::Decoder(status)
        })?;

        let mut sample = SensorSample::default();
        for channel in DECODE_ORDER {
            match decode_channel(&decoder, raw, ChannelSpec::first(channel)) {
                Ok(value) => *sample.slot(channel) = Some(value),
                Err(e) => warn!("{}: no {} reading ({})", self.device.name(), channel.label(), e),
            }
        }
        Ok(sample)
    }

    pub fn cycle(&mut self) -> Result<SensorSample, AcquisitionError> {
        let raw = self.acquire()?;
        self.decode(&raw)
    }

    /// Run until the policy gives up. Every rendered line goes to `emit`.
    pub async fn run<Dl, F>(&mut self, delay: &mut Dl, mut emit: F) -> Termination
    where
        Dl: DelayNs,
        F: FnMut(&str),
    {
        loop {
            match self.cycle() {
                Ok(sample) => {
                    self.policy.on_success();
                    match render_sample(&sample, self.precision) {
                        Ok(line) => emit(&line),
                        Err(e) => warn!("Cannot render sample ({})", e),
                    }
                    delay.delay_ms(self.period.as_millis() as u32).await;
                }
                Err(err) => match self.policy.on_failure(&err) {
                    Verdict::Terminate => return Termination::Failed(err),
                    Verdict::RetryAfter(backoff) => {
                        warn!("Sensor cycle failed, retrying in {} ms", backoff.as_millis());
                        delay.delay_ms(backoff.as_millis() as u32).await;
                    }
                },
            }
        }
    }

    pub fn device(&self) -> &D {
        &self.device
    }
}

/// Presence check followed by the loop.
pub async fn run_sensor<D, P, Dl, F>(
    device: Option<D>,
    policy: P,
    delay: &mut Dl,
    emit: F,
) -> Termination
where
    D: SensorDevice,
    P: AcquisitionPolicy,
    Dl: DelayNs,
    F: FnMut(&str),
{
    match check_device(device) {
        Ok(device) => Pipeline::new(device, policy).run(delay, emit).await,
        Err(termination) => termination,
    }
}

fn decode_channel<Dec: SensorDecoder>(
    decoder: &Dec,
    raw: &[u8],
    spec: ChannelSpec,
) -> Result<FixedPoint, DecodeError> {
    let mut fit = 0;
    let mut out = [FixedPoint::default(); 1];
    match decoder.decode(raw, spec, &mut fit, 1, &mut out)? {
        0 => Err(DecodeError::NoReading),
        _ => Ok(out[0]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::sensor::frame::{FrameDecoder, FrameWriter};
    use crate::sensor::policy::Terminate;

    struct Fake {
        frame: std::vec::Vec<u8>,
        read_status: Option<i32>,
        decoder_status: Option<i32>,
        reads: usize,
    }

    impl Fake {
        fn with(values: &[(SensorChannel, FixedPoint)]) -> Self {
            let mut buf = [0u8; SENSOR_BUFFER_LEN];
            let mut w = FrameWriter::new(&mut buf).unwrap();
            for (channel, value) in values {
                w.push(ChannelSpec::first(*channel), *value).unwrap();
            }
            let len = w.len();
            Self {
                frame: buf[..len].to_vec(),
                read_status: None,
                decoder_status: None,
                reads: 0,
            }
        }
    }

    impl SensorDevice for Fake {
        type Decoder = FrameDecoder;

        fn name(&self) -> &str {
            "bme280@76"
        }

        fn is_ready(&self) -> bool {
            true
        }

        fn read(&mut self, channels: &[ChannelSpec], buf: &mut [u8]) -> Result<usize, StatusCode> {
            assert_eq!(channels, &CHANNELS);
            self.reads += 1;
            if let Some(code) = self.read_status {
                return Err(StatusCode(code));
            }
            buf[..self.frame.len()].copy_from_slice(&self.frame);
            Ok(self.frame.len())
        }

        fn decoder(&self) -> Result<FrameDecoder, StatusCode> {
            match self.decoder_status {
                Some(code) => Err(StatusCode(code)),
                None => Ok(FrameDecoder),
            }
        }
    }

    #[test]
    fn cycle_decodes_all_three_channels() {
        let dev = Fake::with(&[
            (SensorChannel::AmbientTemp, FixedPoint::new(1600, -6)),
            (SensorChannel::Humidity, FixedPoint::new(45, 0)),
            (SensorChannel::Pressure, FixedPoint::new(101, 0)),
        ]);
        let mut p = Pipeline::new(dev, Terminate);
        let sample = p.cycle().unwrap();
        assert_eq!(sample.temperature, Some(FixedPoint::new(1600, -6)));
        assert_eq!(sample.pressure, Some(FixedPoint::new(101, 0)));
        assert_eq!(sample.humidity, Some(FixedPoint::new(45, 0)));
    }

    #[test]
    fn missing_channel_does_not_disturb_others() {
        let dev = Fake::with(&[
            (SensorChannel::AmbientTemp, FixedPoint::new(20, 0)),
            (SensorChannel::Humidity, FixedPoint::new(50, 0)),
        ]);
        let mut p = Pipeline::new(dev, Terminate);
        let sample = p.cycle().unwrap();
        assert_eq!(sample.pressure, None);
        assert_eq!(sample.temperature, Some(FixedPoint::new(20, 0)));
        assert_eq!(sample.humidity, Some(FixedPoint::new(50, 0)));
    }

    #[test]
    fn read_failure_is_acquisition_error() {
        let mut dev = Fake::with(&[]);
        dev.read_status = Some(-5);
        let mut p = Pipeline::new(dev, Terminate);
        assert_eq!(p.cycle(), Err(AcquisitionError::Read(StatusCode(-5))));
    }

    #[test]
    fn decoder_failure_is_acquisition_error() {
        let mut dev = Fake::with(&[(SensorChannel::AmbientTemp, FixedPoint::new(1, 0))]);
        dev.decoder_status = Some(-19);
        let mut p = Pipeline::new(dev, Terminate);
        assert_eq!(p.cycle(), Err(AcquisitionError::Decoder(StatusCode(-19))));
        let termination = Termination::Failed(AcquisitionError::Decoder(StatusCode(-19)));
        assert_eq!(termination.exit_code(), -19);
    }

    #[test]
    fn absent_device_is_graceful() {
        let absent = check_device::<Fake>(None).err();
        assert_eq!(absent, Some(Termination::DeviceAbsent));
        assert_eq!(Termination::DeviceAbsent.exit_code(), 0);
    }
}
