//! Host-side driver for Feetech TTL serial-bus servos (STS/SCS family, e.g. STS3215).
//!
//! The driver mediates between a caller issuing semantic operations ("move servo 3 to
//! π/2 radians", "read the present position of servos 1, 2, 3") and a half-duplex 8-N-1
//! serial bus carrying the Feetech framed packet protocol.
//!
//! Layout, leaves first:
//! - [`codec`] — byte-exact packet framing, checksums, and the integer/sign-magnitude codecs.
//! - [`control_table`] — the pluggable register map that converts between user units and
//!   raw register bytes, with [`control_table::sts3215`] as the reference model.
//! - [`status`] — the servo status-byte bitfield decode.
//! - [`transport`] — the transport boundary the transactor is generic over.
//! - [`transactor`] — the single-owner bus state machine: ping/read/write/sync_read/...
//! - [`config`] — a thin, serde-deserializable convenience layer over transactor construction.
//!
//! This crate does not retry failed transactions, arbitrate multiple buses, or negotiate
//! protocol versions; a single bus maps to a single [`transactor::Transactor`] instance.

pub mod codec;
pub mod config;
pub mod control_table;
pub mod status;
pub mod transactor;
pub mod transport;

pub use codec::{decode_int_signed, decode_sign_magnitude, decode_uint, encode_sign_magnitude, encode_uint};
pub use config::BusConfig;
pub use control_table::sts3215::Sts3215Table;
pub use control_table::{ControlTable, ControlTableError, Mode, RegisterValue};
pub use status::{parse_status, ServoStatusError, StatusInfo};
pub use transactor::{AccessMode, ReadValue, Transactor, TransactorError, WriteValue};
pub use transport::{SerialTransport, Transport};
