//! Measurement frame decoder
//!
//! The answer to the fetch command is 52 ASCII characters: thirteen 4-digit
//! hex fields, each a two's-complement 16-bit value. Fields are read at fixed
//! offsets and scaled according to their kind.

use thiserror::Error;

use crate::sample::Sample;

/// Characters per field
pub const FIELD_LEN: usize = 4;

/// Number of fields in a frame
pub const FIELD_COUNT: usize = 13;

/// Total frame length in characters
pub const FRAME_LEN: usize = FIELD_LEN * FIELD_COUNT;

/// Frame decoding failure
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    /// Fewer bytes than a full frame
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A field is not 4 hex digits
    #[error("field {field} at offset {offset} is not a 4-digit hex value")]
    InvalidField { field: Field, offset: usize },
}

/// How a raw 16-bit value becomes a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Tenths: magnetic field, angles, pressure, temperature
    Scaled10,
    /// Hundredths: acceleration
    Scaled100,
    /// Integer as-is: altitude, voltage
    Raw,
}

/// Frame fields in wire order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    MagX,
    MagY,
    MagZ,
    Azimuth,
    AccX,
    AccY,
    AccZ,
    Roll,
    Pitch,
    AirPressure,
    Altitude,
    Temperature,
    Voltage,
}

impl Field {
    /// All fields, in the order they appear in the frame
    pub const ALL: [Field; FIELD_COUNT] = [
        Field::MagX,
        Field::MagY,
        Field::MagZ,
        Field::Azimuth,
        Field::AccX,
        Field::AccY,
        Field::AccZ,
        Field::Roll,
        Field::Pitch,
        Field::AirPressure,
        Field::Altitude,
        Field::Temperature,
        Field::Voltage,
    ];

    /// Byte offset of the field within the frame
    pub fn offset(self) -> usize {
        self as usize * FIELD_LEN
    }

    pub fn kind(self) -> FieldKind {
        match self {
            Field::AccX | Field::AccY | Field::AccZ => FieldKind::Scaled100,
            Field::Altitude | Field::Voltage => FieldKind::Raw,
            _ => FieldKind::Scaled10,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Field::MagX => "mag_x",
            Field::MagY => "mag_y",
            Field::MagZ => "mag_z",
            Field::Azimuth => "azimuth",
            Field::AccX => "acc_x",
            Field::AccY => "acc_y",
            Field::AccZ => "acc_z",
            Field::Roll => "roll",
            Field::Pitch => "pitch",
            Field::AirPressure => "air_pressure",
            Field::Altitude => "altitude",
            Field::Temperature => "temperature",
            Field::Voltage => "voltage",
        }
    }
}

impl std::fmt::Display for Field {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Parse a 4-digit hex field as a signed 16-bit value
///
/// The digits are read as an unsigned number and the low 16 bits are
/// reinterpreted as two's complement, so `"FFCE"` is -50.
pub fn signed16(field: &[u8]) -> Option<i16> {
    if field.len() != FIELD_LEN || !field.iter().all(u8::is_ascii_hexdigit) {
        return None;
    }
    let text = std::str::from_utf8(field).ok()?;
    let value = u32::from_str_radix(text, 16).ok()?;
    Some(value as u16 as i16)
}

/// Magnetic field, angle, pressure and temperature fields: value / 10
pub fn decode_scaled10(field: &[u8]) -> Option<f32> {
    signed16(field).map(|v| v as f32 / 10.0)
}

/// Acceleration fields: value / 100
pub fn decode_scaled100(field: &[u8]) -> Option<f32> {
    signed16(field).map(|v| v as f32 / 100.0)
}

/// Altitude and voltage fields: value unscaled
pub fn decode_raw(field: &[u8]) -> Option<i32> {
    signed16(field).map(i32::from)
}

/// Decode a fetched frame into a [`Sample`]
///
/// Only the first [`FRAME_LEN`] bytes are examined; a trailing line
/// terminator is ignored.
pub fn decode(buffer: &[u8]) -> Result<Sample, FrameError> {
    if buffer.len() < FRAME_LEN {
        return Err(FrameError::Truncated {
            expected: FRAME_LEN,
            actual: buffer.len(),
        });
    }

    let invalid = |field: Field| FrameError::InvalidField {
        field,
        offset: field.offset(),
    };
    let float = |field: Field| {
        let raw = field_bytes(buffer, field);
        let value = match field.kind() {
            FieldKind::Scaled100 => decode_scaled100(raw),
            _ => decode_scaled10(raw),
        };
        value.ok_or_else(|| invalid(field))
    };
    let int = |field: Field| decode_raw(field_bytes(buffer, field)).ok_or_else(|| invalid(field));

    Ok(Sample {
        mag_x: float(Field::MagX)?,
        mag_y: float(Field::MagY)?,
        mag_z: float(Field::MagZ)?,
        azimuth: float(Field::Azimuth)?,
        acc_x: float(Field::AccX)?,
        acc_y: float(Field::AccY)?,
        acc_z: float(Field::AccZ)?,
        roll: float(Field::Roll)?,
        pitch: float(Field::Pitch)?,
        air_pressure: float(Field::AirPressure)?,
        altitude: int(Field::Altitude)?,
        temperature: float(Field::Temperature)?,
        voltage: int(Field::Voltage)?,
    })
}

fn field_bytes(buffer: &[u8], field: Field) -> &[u8] {
    &buffer[field.offset()..field.offset() + FIELD_LEN]
}
