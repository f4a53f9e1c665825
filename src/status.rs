//! Servo status byte decoding.
//!
//! Bit layout: bit0 voltage, bit1 sensor (encoder), bit2 temperature, bit3 current,
//! bit4 torque-enabled (not an error), bit5 overload. Higher bits are reserved and ignored.

/// One of the servo-reported error conditions, in ascending bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServoStatusError {
    Voltage,
    Sensor,
    Temperature,
    Current,
    Overload,
}

/// Decoded status byte: the error flags the servo raised, and whether torque is enabled.
/// These are informational, not failures of the transaction itself — the caller decides
/// whether to treat any of them as fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusInfo {
    pub errors: Vec<ServoStatusError>,
    pub torque_enabled: bool,
}

const VOLTAGE_BIT: u8 = 1 << 0;
const SENSOR_BIT: u8 = 1 << 1;
const TEMPERATURE_BIT: u8 = 1 << 2;
const CURRENT_BIT: u8 = 1 << 3;
const TORQUE_ENABLED_BIT: u8 = 1 << 4;
const OVERLOAD_BIT: u8 = 1 << 5;

const ERROR_BITS: u8 = VOLTAGE_BIT | SENSOR_BIT | TEMPERATURE_BIT | CURRENT_BIT | OVERLOAD_BIT;

/// Decode a status byte into its error flags (ascending bit order) and torque-enabled flag.
pub fn parse_status(byte: u8) -> StatusInfo {
    let mut errors = Vec::new();
    if byte & VOLTAGE_BIT != 0 {
        errors.push(ServoStatusError::Voltage);
    }
    if byte & SENSOR_BIT != 0 {
        errors.push(ServoStatusError::Sensor);
    }
    if byte & TEMPERATURE_BIT != 0 {
        errors.push(ServoStatusError::Temperature);
    }
    if byte & CURRENT_BIT != 0 {
        errors.push(ServoStatusError::Current);
    }
    if byte & OVERLOAD_BIT != 0 {
        errors.push(ServoStatusError::Overload);
    }

    StatusInfo { errors, torque_enabled: byte & TORQUE_ENABLED_BIT != 0 }
}

/// True iff any of the five error bits (voltage, sensor, temperature, current, overload) is set.
pub fn has_error(byte: u8) -> bool {
    byte & ERROR_BITS != 0
}
