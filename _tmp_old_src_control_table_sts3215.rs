//! The STS3215 control table: the reference servo model for this driver.
//!
//! 4096 steps per revolution, speed unit = 50 steps/s, default baud rate 1_000_000.

use std::f64::consts::PI;

use super::{Conversion, ControlTable, Mode, RegisterDef};

pub const STEPS_PER_REVOLUTION: u32 = 4096;
pub const POSITION_SCALE: f64 = 2.0 * PI / STEPS_PER_REVOLUTION as f64;
pub const SPEED_SCALE: f64 = 50.0 * POSITION_SCALE;

macro_rules! register {
    ($name:literal, $address:expr, $length:expr, $conversion:expr) => {
        RegisterDef { name: $name, address: $address, length: $length, conversion: $conversion }
    };
}

static REGISTERS: &[RegisterDef] = &[
    register!("firmware_version_main", 0, 1, Conversion::None),
    register!("firmware_version_sub", 1, 1, Conversion::None),
    register!("servo_version_main", 3, 1, Conversion::None),
    register!("servo_version_sub", 4, 1, Conversion::None),
    register!("id", 5, 1, Conversion::None),
    register!("baud_rate", 6, 1, Conversion::BaudRate),
    register!("return_delay", 7, 1, Conversion::None),
    register!("status_return_level", 8, 1, Conversion::None),
    register!("min_angle_limit", 9, 2, Conversion::Position),
    register!("max_angle_limit", 11, 2, Conversion::Position),
    register!("max_temperature", 13, 1, Conversion::None),
    register!("max_input_voltage", 14, 1, Conversion::Scale(0.1)),
    register!("min_input_voltage", 15, 1, Conversion::Scale(0.1)),
    register!("max_torque", 16, 2, Conversion::Scale(0.001)),
    register!("position_p_gain", 21, 1, Conversion::None),
    register!("position_d_gain", 22, 1, Conversion::None),
    register!("position_i_gain", 23, 1, Conversion::None),
    register!("position_offset", 31, 2, Conversion::PositionOffset),
    register!("mode", 33, 1, Conversion::Mode),
    register!("torque_enable", 40, 1, Conversion::Bool),
    register!("acceleration", 41, 1, Conversion::None),
    register!("goal_position", 42, 2, Conversion::Position),
    register!("goal_time", 44, 2, Conversion::None),
    register!("goal_speed", 46, 2, Conversion::Speed),
    register!("torque_limit", 48, 2, Conversion::Scale(0.001)),
    register!("lock", 55, 1, Conversion::Bool),
    register!("present_position", 56, 2, Conversion::Position),
    register!("present_speed", 58, 2, Conversion::SpeedSigned),
    register!("present_load", 60, 2, Conversion::LoadSigned),
    register!("present_voltage", 62, 1, Conversion::Scale(0.1)),
    register!("present_temperature", 63, 1, Conversion::None),
    register!("hardware_error_status", 65, 1, Conversion::None),
    register!("moving", 66, 1, Conversion::Bool),
    register!("present_current", 69, 2, Conversion::None),
];

/// The STS3215 control table. Zero-sized: all of its data is the static register table above
/// plus the scale constants, so it's cheap to construct and to pass around by value.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sts3215Table;

impl ControlTable for Sts3215Table {
    fn model_name(&self) -> &'static str {
        "sts3215"
    }

    fn registers(&self) -> &'static [RegisterDef] {
        REGISTERS
    }

    fn position_scale(&self) -> f64 {
        POSITION_SCALE
    }

    fn speed_scale(&self) -> f64 {
        SPEED_SCALE
    }

    fn mode_to_raw(&self, mode: Mode) -> u8 {
        match mode {
            Mode::Position => 0,
            Mode::Velocity => 1,
            Mode::Pwm => 2,
            Mode::Step => 3,
            Mode::Unknown(raw) => raw,
        }
    }

    fn raw_to_mode(&self, raw: u8) -> Mode {
        match raw {
            0 => Mode::Position,
            1 => Mode::Velocity,
            2 => Mode::Pwm,
            3 => Mode::Step,
            other => Mode::Unknown(other),
        }
    }

    fn baud_rate_to_raw(&self, baud_rate: u32) -> u8 {
        match baud_rate {
            1_000_000 => 0,
            500_000 => 1,
            250_000 => 2,
            128_000 => 3,
            115_200 => 4,
            76_800 => 5,
            57_600 => 6,
            38_400 => 7,
            _ => 0, // unrecognised baud rate encodes as the default
        }
    }

    fn raw_to_baud_rate(&self, raw: u8) -> u32 {
        match raw {
            0 => 1_000_000,
            1 => 500_000,
            2 => 250_000,
            3 => 128_000,
            4 => 115_200,
            5 => 76_800,
            6 => 57_600,
            7 => 38_400,
            _ => 1_000_000, // default fallback for unrecognised raw bytes
        }
    }
}
