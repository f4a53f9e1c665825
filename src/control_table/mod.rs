//! Control-table abstraction: a pluggable, per-servo-model mapping from named registers to
//! `(address, byte_length, conversion)`, plus the encode/decode machinery that converts
//! between user units and raw register bytes.

pub mod sts3215;

use thiserror::Error;

use crate::codec::integers::{decode_sign_magnitude, decode_uint, encode_sign_magnitude, encode_uint};

/// Operating mode, stored as a single byte in the `mode` register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Position,
    Velocity,
    Pwm,
    Step,
    /// A raw value the model doesn't recognise. Not an error: servos can report unexpected
    /// bytes during cold start, and `raw_to_mode` is a total function.
    Unknown(u8),
}

/// One entry in a control table: where a register lives, how wide it is, and how to convert
/// between its raw bytes and a user-facing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDef {
    pub name: &'static str,
    pub address: u8,
    pub length: u8,
    pub conversion: Conversion,
}

/// The closed set of register conversions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Conversion {
    /// Raw unsigned integer, no scaling.
    None,
    /// Zero is false, any non-zero value is true.
    Bool,
    /// `raw * scale`, no sign handling.
    Scale(f64),
    /// Sign-magnitude at bit 15, scaled by the model's `position_scale`.
    Position,
    /// `raw * speed_scale`, unsigned (no sign bit).
    Speed,
    /// Sign-magnitude at bit 15, scaled by the model's `speed_scale`.
    SpeedSigned,
    /// Sign-magnitude at bit 10, scaled by 0.1 (percent, range ±1023 raw).
    LoadSigned,
    /// Sign-magnitude at bit 11, unscaled (range ±2047 raw steps).
    PositionOffset,
    /// Small closed enum, see [`Mode`].
    Mode,
    /// Closed mapping of raw byte to a named baud rate, default 1_000_000 on unrecognised raw.
    BaudRate,
}

/// A user-facing register value. Which variant applies is determined by the register's
/// [`Conversion`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RegisterValue {
    /// Any numeric conversion: `none`, `scale`, `position`, `speed`, `speed_signed`,
    /// `load_signed`, `position_offset`.
    Number(f64),
    Bool(bool),
    Mode(Mode),
    /// Baud rate in bits per second (e.g. 1_000_000).
    BaudRate(u32),
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ControlTableError {
    #[error("unknown register {0:?}")]
    UnknownRegister(String),

    #[error("register {name:?} expects a {expected} value, not {actual:?}")]
    WrongValueType { name: &'static str, expected: &'static str, actual: RegisterValue },

    #[error("register {name:?} is {expected} bytes wide, got {actual}")]
    WrongByteWidth { name: &'static str, expected: u8, actual: usize },
}

/// Round to the nearest integer, ties away from zero. `f64::round` already has this behavior;
/// named here so callers don't have to re-derive the rounding rule from the spec each time.
fn round_ties_away(x: f64) -> i64 {
    x.round() as i64
}

/// A servo model's control table: its register map plus the scale constants and enum mappings
/// needed to convert between user units and raw bytes. Implement this trait once per model;
/// `lookup`/`encode_user`/`encode_raw`/`decode_user` are provided in terms of the methods below
/// so a new model never has to reimplement the conversion machinery.
pub trait ControlTable: Send + Sync {
    fn model_name(&self) -> &'static str;
    fn registers(&self) -> &'static [RegisterDef];
    fn position_scale(&self) -> f64;
    fn speed_scale(&self) -> f64;
    fn mode_to_raw(&self, mode: Mode) -> u8;
    fn raw_to_mode(&self, raw: u8) -> Mode;
    fn baud_rate_to_raw(&self, baud_rate: u32) -> u8;
    fn raw_to_baud_rate(&self, raw: u8) -> u32;

    /// Resolve a register by name.
    fn lookup(&self, name: &str) -> Result<RegisterDef, ControlTableError> {
        self.registers()
            .iter()
            .find(|r| r.name == name)
            .copied()
            .ok_or_else(|| ControlTableError::UnknownRegister(name.to_string()))
    }

    /// Encode a user-facing value into the register's raw bytes.
    fn encode_user(&self, name: &str, value: RegisterValue) -> Result<Vec<u8>, ControlTableError> {
        let def = self.lookup(name)?;
        let len = def.length as usize;

        let number = |expected| match value {
            RegisterValue::Number(n) => Ok(n),
            other => Err(ControlTableError::WrongValueType { name: def.name, expected, actual: other }),
        };

        match def.conversion {
            Conversion::None => Ok(encode_uint(round_ties_away(number("a number")?), len)),
            Conversion::Bool => match value {
                RegisterValue::Bool(b) => Ok(encode_uint(if b { 1 } else { 0 }, len)),
                other => Err(ControlTableError::WrongValueType { name: def.name, expected: "a bool", actual: other }),
            },
            Conversion::Scale(scale) => Ok(encode_uint(round_ties_away(number("a number")? / scale), len)),
            Conversion::Position => {
                let raw = round_ties_away(number("a number")? / self.position_scale());
                Ok(encode_sign_magnitude(raw, 15, len))
            }
            Conversion::Speed => Ok(encode_uint(round_ties_away(number("a number")? / self.speed_scale()), len)),
            Conversion::SpeedSigned => {
                let raw = round_ties_away(number("a number")? / self.speed_scale());
                Ok(encode_sign_magnitude(raw, 15, len))
            }
            Conversion::LoadSigned => {
                let raw = round_ties_away(number("a number")? / 0.1);
                Ok(encode_sign_magnitude(raw, 10, len))
            }
            Conversion::PositionOffset => {
                let raw = round_ties_away(number("a number")?);
                Ok(encode_sign_magnitude(raw, 11, len))
            }
            Conversion::Mode => match value {
                RegisterValue::Mode(mode) => Ok(encode_uint(self.mode_to_raw(mode) as i64, len)),
                other => Err(ControlTableError::WrongValueType { name: def.name, expected: "a mode", actual: other }),
            },
            Conversion::BaudRate => match value {
                RegisterValue::BaudRate(baud) => Ok(encode_uint(self.baud_rate_to_raw(baud) as i64, len)),
                other => {
                    Err(ControlTableError::WrongValueType { name: def.name, expected: "a baud rate", actual: other })
                }
            },
        }
    }

    /// Encode a raw integer directly into the register's byte width, bypassing any conversion.
    fn encode_raw(&self, name: &str, value: u32) -> Result<Vec<u8>, ControlTableError> {
        let def = self.lookup(name)?;
        Ok(encode_uint(value as i64, def.length as usize))
    }

    /// Decode raw register bytes into a user-facing value, the inverse of `encode_user`.
    fn decode_user(&self, name: &str, bytes: &[u8]) -> Result<RegisterValue, ControlTableError> {
        let def = self.lookup(name)?;
        if bytes.len() != def.length as usize {
            return Err(ControlTableError::WrongByteWidth { name: def.name, expected: def.length, actual: bytes.len() });
        }

        Ok(match def.conversion {
            Conversion::None => RegisterValue::Number(decode_uint(bytes) as f64),
            Conversion::Bool => RegisterValue::Bool(decode_uint(bytes) != 0),
            Conversion::Scale(scale) => RegisterValue::Number(decode_uint(bytes) as f64 * scale),
            Conversion::Position => {
                RegisterValue::Number(decode_sign_magnitude(bytes, 15) as f64 * self.position_scale())
            }
            Conversion::Speed => RegisterValue::Number(decode_uint(bytes) as f64 * self.speed_scale()),
            Conversion::SpeedSigned => {
                RegisterValue::Number(decode_sign_magnitude(bytes, 15) as f64 * self.speed_scale())
            }
            Conversion::LoadSigned => RegisterValue::Number(decode_sign_magnitude(bytes, 10) as f64 * 0.1),
            Conversion::PositionOffset => RegisterValue::Number(decode_sign_magnitude(bytes, 11) as f64),
            Conversion::Mode => RegisterValue::Mode(self.raw_to_mode(decode_uint(bytes) as u8)),
            Conversion::BaudRate => RegisterValue::BaudRate(self.raw_to_baud_rate(decode_uint(bytes) as u8)),
        })
    }

    /// Decode raw register bytes as a plain unsigned integer, ignoring any conversion.
    fn decode_raw(&self, bytes: &[u8]) -> u32 {
        decode_uint(bytes)
    }
}
