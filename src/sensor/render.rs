//! Decimal rendering of Q-format values.
//!
//! The integer part is printed in full and the fraction is truncated
//! toward zero to the requested number of digits. All arithmetic is done
//! on the magnitude in `u128`, so every `i32` mantissa with a shift in
//! `-128..=96` is exact.

use core::fmt::Write;

use heapless::String;

use super::{FixedPoint, SensorChannel, SensorSample};
use crate::error::RenderError;

/// Longest left shift that keeps an `i32` magnitude inside `u128`.
pub const MAX_LEFT_SHIFT: i8 = 96;

/// Digits beyond this would overflow the fraction arithmetic.
pub const MAX_PRECISION: u8 = 18;

/// One rendered value: sign, up to 39 integer digits, point, fraction.
pub type Rendered = String<64>;

/// One rendered sample line.
pub type RenderedLine = String<224>;

/// Render `value` with exactly `precision` fractional digits.
pub fn render(value: FixedPoint, precision: u8) -> Result<Rendered, RenderError> {
    let precision = precision.min(MAX_PRECISION);
    let magnitude = value.mantissa.unsigned_abs() as u128;
    let scale = 10u128.pow(precision as u32);

    let (int, frac) = if value.shift >= 0 {
        if value.shift > MAX_LEFT_SHIFT {
            return Err(RenderError::OutOfRange);
        }
        (magnitude << value.shift, 0)
    } else {
        let bits = value.shift.unsigned_abs() as u32;
        let int = magnitude.checked_shr(bits).unwrap_or(0);
        let rem = magnitude - int.checked_shl(bits).unwrap_or(0);
        // rem < 2^31 and scale < 2^60, so the product cannot overflow.
        let frac = (rem * scale).checked_shr(bits).unwrap_or(0);
        (int, frac)
    };

    let mut out = Rendered::new();
    if value.mantissa < 0 && (int != 0 || frac != 0) {
        out.push('-').map_err(|_| RenderError::Capacity)?;
    }
    write!(out, "{}", int).map_err(|_| RenderError::Capacity)?;
    if precision > 0 {
        write!(out, ".{:0width$}", frac, width = precision as usize)
            .map_err(|_| RenderError::Capacity)?;
    }
    Ok(out)
}

/// `temp: <v>; press: <v>; humidity: <v>`, with `n/a` for absent channels.
pub fn render_sample(sample: &SensorSample, precision: u8) -> Result<RenderedLine, RenderError> {
    let mut line = RenderedLine::new();
    let channels = [
        SensorChannel::AmbientTemp,
        SensorChannel::Pressure,
        SensorChannel::Humidity,
    ];
    for (i, channel) in channels.iter().enumerate() {
        if i > 0 {
            line.push_str("; ").map_err(|_| RenderError::Capacity)?;
        }
        write!(line, "{}: ", channel.label()).map_err(|_| RenderError::Capacity)?;
        match sample.get(*channel) {
            Some(value) => line
                .push_str(&render(value, precision)?)
                .map_err(|_| RenderError::Capacity)?,
            None => line.push_str("n/a").map_err(|_| RenderError::Capacity)?,
        }
    }
    Ok(line)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(mantissa: i32, shift: i8) -> Rendered {
        render(FixedPoint::new(mantissa, shift), 6).unwrap()
    }

    #[test]
    fn integer_values() {
        assert_eq!(r(25, 0), "25.000000");
        assert_eq!(r(1600, -6), "25.000000");
        assert_eq!(r(0, 0), "0.000000");
    }

    #[test]
    fn fractions_are_exact() {
        assert_eq!(r(250_000, -6), "3906.250000");
        assert_eq!(r(1, -1), "0.500000");
        assert_eq!(r(3, -2), "0.750000");
    }

    #[test]
    fn fractions_truncate_toward_zero() {
        // 1/3 would need rounding; 2^-20 = 0.00000095367...
        assert_eq!(r(1, -20), "0.000000");
        assert_eq!(r(1, -19), "0.000001");
        assert_eq!(r(-1, -19), "-0.000001");
    }

    #[test]
    fn sign_only_when_visible() {
        assert_eq!(r(-1600, -6), "-25.000000");
        assert_eq!(r(-1, -1), "-0.500000");
        assert_eq!(r(-1, -30), "0.000000");
    }

    #[test]
    fn extreme_shifts() {
        assert_eq!(r(i32::MIN, -31), "-1.000000");
        assert_eq!(r(i32::MAX, -127), "0.000000");
        assert_eq!(r(1, 40), "1099511627776.000000");
        assert_eq!(
            render(FixedPoint::new(1, 97), 6),
            Err(RenderError::OutOfRange)
        );
    }

    #[test]
    fn precision_controls_digits() {
        assert_eq!(render(FixedPoint::new(7, -2), 0).unwrap(), "1");
        assert_eq!(render(FixedPoint::new(7, -2), 2).unwrap(), "1.75");
        assert_eq!(render(FixedPoint::new(7, -2), 3).unwrap(), "1.750");
    }

    #[test]
    fn sample_line_marks_absent_channels() {
        let sample = SensorSample {
            temperature: Some(FixedPoint::new(1600, -6)),
            pressure: None,
            humidity: Some(FixedPoint::new(-1, -1)),
        };
        assert_eq!(
            render_sample(&sample, 6).unwrap(),
            "temp: 25.000000; press: n/a; humidity: -0.500000"
        );
    }
}
