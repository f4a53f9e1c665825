//! Bus configuration: the small set of things a caller legitimately varies at runtime —
//! port path, baud rate, response timeout, and which control-table model a bus speaks.
//!
//! This is a thin convenience layer over [`Transactor::new`](crate::transactor::Transactor::new):
//! it does not grow into a general plugin/config framework, just a `serde`-deserializable
//! struct a caller can load from a file or environment and hand off to `BusConfig::open`.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::control_table::sts3215::Sts3215Table;
use crate::control_table::ControlTable;
use crate::transactor::Transactor;
use crate::transport::SerialTransport;

/// Default response timeout for a newly opened bus.
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Default baud rate, matching the STS3215's own default.
pub const DEFAULT_BAUD_RATE: u32 = 1_000_000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unknown control-table model {0:?}")]
    UnknownModel(String),

    #[error(transparent)]
    Serial(#[from] serialport::Error),
}

/// Everything needed to open a bus: the serial port path, its baud rate, the per-transaction
/// response timeout, and the name of the control-table model the servos on it speak.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    pub port: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_model")]
    pub control_table: String,
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

fn default_model() -> String {
    "sts3215".to_string()
}

impl BusConfig {
    pub fn new(port: impl Into<String>) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            control_table: default_model(),
        }
    }

    /// Resolve `control_table` to a concrete model. The only model this crate ships is
    /// `sts3215`; a second model is added by extending this match, not by touching the
    /// transactor or codec.
    fn resolve_control_table(&self) -> Result<Box<dyn ControlTable>, ConfigError> {
        match self.control_table.as_str() {
            "sts3215" => Ok(Box::new(Sts3215Table)),
            other => Err(ConfigError::UnknownModel(other.to_string())),
        }
    }

    /// Open the serial port named by this config and construct a [`Transactor`] over it.
    pub fn open(&self) -> Result<Transactor<SerialTransport>, ConfigError> {
        let control_table = self.resolve_control_table()?;
        let transport = SerialTransport::open(&self.port, self.baud_rate)?;
        Ok(Transactor::new(transport, control_table, Duration::from_millis(self.timeout_ms)))
    }
}
