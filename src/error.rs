//! Unified error types for tempsound.
//!
//! We avoid `alloc` - all error variants carry only fixed-size data.
//! Implements `defmt::Format` (behind the `defmt` feature) for efficient
//! on-target logging.
//!
//! Fatality follows the firmware's policy: radio and decode errors are
//! logged and swallowed where they happen, bootstrap and acquisition
//! errors end the process with a non-zero exit code.

/// Raw status returned by a platform call (errno-style or SoftDevice code).
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusCode(pub i32);

impl StatusCode {
    pub const OK: StatusCode = StatusCode(0);

    /// Turn a C-style return value into a `Result`.
    pub fn check(raw: i32) -> Result<(), StatusCode> {
        if raw == 0 {
            Ok(())
        } else {
            Err(StatusCode(raw))
        }
    }
}

/// Which radio-stack operation produced a [`RadioStackError`].
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioOp {
    AdvertisingStart,
    AdvertisingUpdate,
    ConnInfo,
    PhyUpdate,
    DataLengthUpdate,
    MtuExchange,
    Notify,
}

/// Non-fatal failure of a radio-stack call.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RadioStackError {
    pub op: RadioOp,
    pub status: StatusCode,
}

impl RadioStackError {
    pub fn new(op: RadioOp, status: StatusCode) -> Self {
        Self { op, status }
    }
}

/// Fatal failure while bringing the board up.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapError {
    /// The Bluetooth stack refused to enable.
    BluetoothEnable(StatusCode),
    /// The GATT attribute table could not be registered.
    GattServer(StatusCode),
}

impl BootstrapError {
    pub fn exit_code(&self) -> i32 {
        -1
    }
}

/// Fatal failure of the sensor read path.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquisitionError {
    /// The blocking read request returned a non-zero status.
    Read(StatusCode),
    /// No decoder could be obtained for the device.
    Decoder(StatusCode),
}

impl AcquisitionError {
    pub fn status(&self) -> StatusCode {
        match self {
            AcquisitionError::Read(s) | AcquisitionError::Decoder(s) => *s,
        }
    }

    /// The process exit code is the raw status of the failed call.
    pub fn exit_code(&self) -> i32 {
        self.status().0
    }
}

/// Per-channel decode failure; the channel is reported absent.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    /// The decoder returned a non-zero status.
    Status(StatusCode),
    /// The buffer holds no reading for the requested channel.
    NoReading,
    /// The buffer ends in the middle of a record.
    Truncated,
    /// The buffer header is not a sensor frame.
    Malformed,
}

/// A fixed-point value could not be printed.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderError {
    /// The integer part does not fit the renderer's range.
    OutOfRange,
    /// The output buffer is full.
    Capacity,
}

/// A connection event the lifecycle controller did not accept.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The radio stack reported the connection as failed (HCI error code).
    ConnectFailed(u8),
    /// A session is already live; single peripheral role.
    AlreadyConnected,
}

/// Advertising payload could not be encoded.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    /// The set does not fit the 31-byte legacy advertising PDU.
    Overflow,
}

/// Top-level error type used across the application.
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    Radio(RadioStackError),
    Bootstrap(BootstrapError),
    Acquisition(AcquisitionError),
    Decode(DecodeError),
    Render(RenderError),
    Link(LinkError),
    Payload(PayloadError),
}

impl Error {
    /// Whether this error should end the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::Bootstrap(_) | Error::Acquisition(_))
    }
}

// Convenience conversions

impl From<RadioStackError> for Error {
    fn from(e: RadioStackError) -> Self {
        Error::Radio(e)
    }
}

impl From<BootstrapError> for Error {
    fn from(e: BootstrapError) -> Self {
        Error::Bootstrap(e)
    }
}

impl From<AcquisitionError> for Error {
    fn from(e: AcquisitionError) -> Self {
        Error::Acquisition(e)
    }
}

impl From<DecodeError> for Error {
    fn from(e: DecodeError) -> Self {
        Error::Decode(e)
    }
}

impl From<RenderError> for Error {
    fn from(e: RenderError) -> Self {
        Error::Render(e)
    }
}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Error::Link(e)
    }
}

impl From<PayloadError> for Error {
    fn from(e: PayloadError) -> Self {
        Error::Payload(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_check_maps_zero_to_ok() {
        assert_eq!(StatusCode::check(0), Ok(()));
        assert_eq!(StatusCode::check(-12), Err(StatusCode(-12)));
    }

    #[test]
    fn acquisition_exit_code_is_raw_status() {
        assert_eq!(AcquisitionError::Read(StatusCode(-5)).exit_code(), -5);
        assert_eq!(AcquisitionError::Decoder(StatusCode(-19)).exit_code(), -19);
    }

    #[test]
    fn only_bootstrap_and_acquisition_are_fatal() {
        let fatal = |e: Error| e.is_fatal();
        assert!(fatal(BootstrapError::BluetoothEnable(StatusCode(-1)).into()));
        assert!(fatal(AcquisitionError::Read(StatusCode(-5)).into()));
        assert!(!fatal(RadioStackError::new(RadioOp::PhyUpdate, StatusCode(-11)).into()));
        assert!(!fatal(DecodeError::NoReading.into()));
        assert!(!fatal(LinkError::ConnectFailed(0x3e).into()));
    }

    #[test]
    fn bootstrap_exit_code_is_non_zero() {
        let enable = BootstrapError::BluetoothEnable(StatusCode(-19));
        assert_ne!(enable.exit_code(), 0);
        assert_ne!(BootstrapError::GattServer(StatusCode(4)).exit_code(), 0);
    }
}
