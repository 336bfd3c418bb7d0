//! Raw sensor frame.
//!
//! Layout:
//!
//! ```text
//! ┌───────┬───────┬──────────────────────────────────────────┐
//! │ 0x51  │ count │ count × record                           │
//! └───────┴───────┴──────────────────────────────────────────┘
//! record: channel (u8) | index (u8) | shift (i8) | mantissa (i32 LE)
//! ```

use super::{ChannelSpec, FixedPoint, SensorChannel, SensorDecoder};
use crate::error::DecodeError;

pub const MAGIC: u8 = 0x51;
pub const HEADER_LEN: usize = 2;
pub const RECORD_LEN: usize = 7;

/// Builds a frame in a caller-provided buffer.
pub struct FrameWriter<'b> {
    buf: &'b mut [u8],
    count: u8,
}

impl<'b> FrameWriter<'b> {
    pub fn new(buf: &'b mut [u8]) -> Result<Self, DecodeError> {
        if buf.len() < HEADER_LEN {
            return Err(DecodeError::Truncated);
        }
        buf[0] = MAGIC;
        buf[1] = 0;
        Ok(Self { buf, count: 0 })
    }

    /// Append one reading. Fails when the record does not fit.
    pub fn push(&mut self, spec: ChannelSpec, value: FixedPoint) -> Result<(), DecodeError> {
        let at = self.len();
        if at + RECORD_LEN > self.buf.len() || self.count == u8::MAX {
            return Err(DecodeError::Truncated);
        }
        let record = &mut self.buf[at..at + RECORD_LEN];
        record[0] = spec.channel.code();
        record[1] = spec.index;
        record[2] = value.shift as u8;
        record[3..].copy_from_slice(&value.mantissa.to_le_bytes());
        self.count += 1;
        self.buf[1] = self.count;
        Ok(())
    }

    /// Bytes used so far.
    pub fn len(&self) -> usize {
        HEADER_LEN + self.count as usize * RECORD_LEN
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Decoder for [`FrameWriter`] output.
#[derive(Clone, Copy, Debug, Default)]
pub struct FrameDecoder;

impl SensorDecoder for FrameDecoder {
    fn decode(
        &self,
        buf: &[u8],
        spec: ChannelSpec,
        fit: &mut u32,
        max_count: u16,
        out: &mut [FixedPoint],
    ) -> Result<usize, DecodeError> {
        if buf.len() < HEADER_LEN || buf[0] != MAGIC {
            return Err(DecodeError::Malformed);
        }
        let count = buf[1] as usize;
        let limit = out.len().min(max_count as usize);
        let mut written = 0;

        while (*fit as usize) < count && written < limit {
            let at = HEADER_LEN + *fit as usize * RECORD_LEN;
            let record = buf.get(at..at + RECORD_LEN).ok_or(DecodeError::Truncated)?;
            *fit += 1;

            let matches = SensorChannel::from_code(record[0]) == Some(spec.channel)
                && record[1] == spec.index;
            if !matches {
                continue;
            }
            out[written] = FixedPoint {
                mantissa: i32::from_le_bytes([record[3], record[4], record[5], record[6]]),
                shift: record[2] as i8,
            };
            written += 1;
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP: ChannelSpec = ChannelSpec::first(SensorChannel::AmbientTemp);
    const PRESS: ChannelSpec = ChannelSpec::first(SensorChannel::Pressure);
    const HUM: ChannelSpec = ChannelSpec::first(SensorChannel::Humidity);

    fn decode_one(buf: &[u8], spec: ChannelSpec) -> Result<Option<FixedPoint>, DecodeError> {
        let mut fit = 0;
        let mut out = [FixedPoint::default(); 1];
        let n = FrameDecoder.decode(buf, spec, &mut fit, 1, &mut out)?;
        Ok((n == 1).then_some(out[0]))
    }

    #[test]
    fn writes_header_and_records() {
        let mut buf = [0u8; 32];
        let mut w = FrameWriter::new(&mut buf).unwrap();
        assert!(w.is_empty());
        w.push(TEMP, FixedPoint::new(-2, -1)).unwrap();
        assert_eq!(w.len(), HEADER_LEN + RECORD_LEN);
        assert_eq!(&buf[..9], &[MAGIC, 1, 13, 0, 0xFF, 0xFE, 0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn decodes_each_channel_independently() {
        let mut buf = [0u8; 32];
        let mut w = FrameWriter::new(&mut buf).unwrap();
        w.push(TEMP, FixedPoint::new(1600, -6)).unwrap();
        w.push(HUM, FixedPoint::new(42, 0)).unwrap();
        w.push(PRESS, FixedPoint::new(101_325, -10)).unwrap();

        assert_eq!(decode_one(&buf, TEMP), Ok(Some(FixedPoint::new(1600, -6))));
        assert_eq!(
            decode_one(&buf, PRESS),
            Ok(Some(FixedPoint::new(101_325, -10)))
        );
        assert_eq!(decode_one(&buf, HUM), Ok(Some(FixedPoint::new(42, 0))));
    }

    #[test]
    fn missing_channel_yields_nothing() {
        let mut buf = [0u8; 16];
        let mut w = FrameWriter::new(&mut buf).unwrap();
        w.push(TEMP, FixedPoint::new(1, 0)).unwrap();
        assert_eq!(decode_one(&buf, HUM), Ok(None));
    }

    #[test]
    fn fit_cursor_resumes() {
        let mut buf = [0u8; 32];
        let mut w = FrameWriter::new(&mut buf).unwrap();
        w.push(TEMP, FixedPoint::new(1, 0)).unwrap();
        w.push(TEMP, FixedPoint::new(2, 0)).unwrap();

        let mut fit = 0;
        let mut out = [FixedPoint::default(); 1];
        let mut next = |out: &mut [FixedPoint]| FrameDecoder.decode(&buf, TEMP, &mut fit, 1, out);
        assert_eq!(next(&mut out), Ok(1));
        assert_eq!(out[0].mantissa, 1);
        assert_eq!(next(&mut out), Ok(1));
        assert_eq!(out[0].mantissa, 2);
        assert_eq!(next(&mut out), Ok(0));
    }

    #[test]
    fn rejects_bad_frames() {
        assert_eq!(decode_one(&[], TEMP), Err(DecodeError::Malformed));
        assert_eq!(decode_one(&[0x00, 0], TEMP), Err(DecodeError::Malformed));
        // Header claims two records, only one byte follows.
        assert_eq!(
            decode_one(&[MAGIC, 2, 13], TEMP),
            Err(DecodeError::Truncated)
        );
    }

    #[test]
    fn writer_refuses_overflow() {
        let mut buf = [0u8; HEADER_LEN + RECORD_LEN];
        let mut w = FrameWriter::new(&mut buf).unwrap();
        w.push(TEMP, FixedPoint::new(1, 0)).unwrap();
        let overflow = w.push(HUM, FixedPoint::new(1, 0));
        assert_eq!(overflow, Err(DecodeError::Truncated));
        assert!(FrameWriter::new(&mut [0u8; 1]).is_err());
    }
}
