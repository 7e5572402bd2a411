//! Conversions between register words and physical quantities.

use super::Measurement;
use crate::sensirion::{Checksum, Error, decode_words};

/// Degrees Celsius per LSB of the temperature offset register.
///
/// The register spans 175 °C over 16 bits, the same range as the temperature
/// signal. Encoding divides by this value and decoding multiplies by it.
pub const TEMPERATURE_OFFSET_SCALE: f32 = 175.0 / 65536.0;

/// Decodes the 9-byte response of `read_measurement`.
///
/// Anything but exactly three words is rejected, so a measurement is either
/// complete or absent.
pub fn decode_measurement<E>(raw: &[u8], checksum: Checksum) -> Result<Measurement, Error<E>> {
    let [co2, temperature, humidity] = decode_words::<3, E>(raw, checksum)?;

    Ok(Measurement {
        co2_ppm: co2,
        temp_celsius: temperature_from_raw(temperature),
        humidity_percent: humidity_from_raw(humidity),
    })
}

pub fn temperature_from_raw(raw: u16) -> f32 {
    -45.0 + 175.0 * f32::from(raw) / 65536.0
}

pub fn humidity_from_raw(raw: u16) -> f32 {
    100.0 * f32::from(raw) / 65536.0
}

/// Rounds to the nearest register step. Offsets below zero or beyond the
/// 16-bit range are rejected.
pub fn encode_temperature_offset<E>(celsius: f32) -> Result<u16, Error<E>> {
    if celsius.is_nan() || celsius < 0.0 {
        return Err(Error::OutOfRange);
    }

    let steps = celsius / TEMPERATURE_OFFSET_SCALE + 0.5;
    if steps >= 65536.0 {
        return Err(Error::OutOfRange);
    }

    Ok(steps as u16)
}

pub fn decode_temperature_offset(raw: u16) -> f32 {
    f32::from(raw) * TEMPERATURE_OFFSET_SCALE
}

pub fn encode_self_calibration(enabled: bool) -> u16 {
    u16::from(enabled)
}

pub fn decode_self_calibration(raw: u16) -> bool {
    raw == 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug_utils::DummyError;

    const SAMPLE: [u8; 9] = [0x01, 0xf4, 0x00, 0x66, 0x66, 0x00, 0x80, 0x00, 0x00];

    #[test]
    fn test_decode_measurement() {
        let m = decode_measurement::<DummyError>(&SAMPLE, Checksum::Disabled).unwrap();

        assert_eq!(m.co2_ppm, 500);
        assert_eq!(m.temp_celsius, -45.0 + 175.0 * 26214.0 / 65536.0);
        assert!((m.temp_celsius - 24.998_932).abs() < 1e-4);
        assert_eq!(m.humidity_percent, 50.0);
    }

    #[test]
    fn test_decode_measurement_is_deterministic() {
        let first = decode_measurement::<DummyError>(&SAMPLE, Checksum::Disabled);
        let second = decode_measurement::<DummyError>(&SAMPLE, Checksum::Disabled);
        assert_eq!(first, second);
    }

    #[test]
    fn test_decode_measurement_short_input() {
        for len in 0..SAMPLE.len() {
            assert_eq!(
                decode_measurement::<DummyError>(&SAMPLE[..len], Checksum::Disabled),
                Err(Error::InvalidResponse)
            );
        }
    }

    #[test]
    fn test_decode_measurement_bad_checksum() {
        // Valid words, but the checksum bytes are zeroed.
        assert_eq!(
            decode_measurement::<DummyError>(&SAMPLE, Checksum::Enabled),
            Err(Error::InvalidCrc)
        );
    }

    #[test]
    fn test_signal_range() {
        assert_eq!(temperature_from_raw(0), -45.0);
        assert!(temperature_from_raw(u16::MAX) < 130.0);
        assert_eq!(humidity_from_raw(0), 0.0);
        assert!(humidity_from_raw(u16::MAX) < 100.0);
    }

    #[test]
    fn test_temperature_offset_round_trip() {
        for celsius in [0.0f32, 0.5, 1.5, 4.0, 7.25, 20.0, 174.9] {
            let raw = encode_temperature_offset::<DummyError>(celsius).unwrap();
            let decoded = decode_temperature_offset(raw);
            assert!(
                (decoded - celsius).abs() <= TEMPERATURE_OFFSET_SCALE,
                "{celsius} -> {raw} -> {decoded}"
            );
        }
    }

    #[test]
    fn test_temperature_offset_register_values() {
        assert_eq!(encode_temperature_offset::<DummyError>(4.0), Ok(1498));
        assert_eq!(encode_temperature_offset::<DummyError>(1.5), Ok(562));
        assert_eq!(decode_temperature_offset(0), 0.0);
        assert_eq!(decode_temperature_offset(1), TEMPERATURE_OFFSET_SCALE);
    }

    #[test]
    fn test_temperature_offset_out_of_range() {
        assert_eq!(
            encode_temperature_offset::<DummyError>(-0.1),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            encode_temperature_offset::<DummyError>(175.0),
            Err(Error::OutOfRange)
        );
        assert_eq!(
            encode_temperature_offset::<DummyError>(f32::NAN),
            Err(Error::OutOfRange)
        );
    }

    #[test]
    fn test_self_calibration_flag() {
        assert_eq!(encode_self_calibration(true), 1);
        assert_eq!(encode_self_calibration(false), 0);
        assert!(decode_self_calibration(1));
        assert!(!decode_self_calibration(0));
        assert!(!decode_self_calibration(2));
    }
}
