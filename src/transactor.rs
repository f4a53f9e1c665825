//! The bus transactor: serializes requests onto the half-duplex bus, owns the receive buffer
//! across transactions, and turns wire replies into typed results.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::codec::packet::{self, CodecError, ParsedResponse};
use crate::codec::reframe::{extract_packet, Reframed};
use crate::control_table::{ControlTable, ControlTableError, RegisterValue};
use crate::status::{parse_status, StatusInfo};
use crate::transport::Transport;

/// The inner chunk-read timeout, kept short so the receive loop stays responsive to its own
/// deadline rather than blocking on a single long transport read.
const CHUNK_TIMEOUT: Duration = Duration::from_millis(10);

/// Whether a register access goes through the control table's semantic conversion, or moves
/// raw integers straight to/from the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    Converted,
    Raw,
}

/// A value to write to a register, tagged with the access mode it was produced for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WriteValue {
    Converted(RegisterValue),
    Raw(u32),
}

/// A value read from a register, tagged with the access mode it was read with.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReadValue {
    Converted(RegisterValue),
    Raw(u32),
}

#[derive(Debug, Error)]
pub enum TransactorError {
    #[error("no response from servo {id} within {timeout_ms}ms")]
    NoResponse { id: u8, timeout_ms: u64 },

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error(transparent)]
    ControlTable(#[from] ControlTableError),

    #[error("sync_read: missing or invalid replies from servo ids {missing:?}")]
    PartialRead { missing: Vec<u8> },

    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
}

/// Owns one transport exclusively and serializes every instruction issued through it. See the
/// module doc for the receive-buffer contract: bytes are never dropped across transactions,
/// since a stale reply tail from a timed-out transaction often completes on the next read.
pub struct Transactor<T: Transport> {
    transport: T,
    control_table: Box<dyn ControlTable>,
    timeout: Duration,
    recv_buffer: Vec<u8>,
}

impl<T: Transport> Transactor<T> {
    pub fn new(transport: T, control_table: Box<dyn ControlTable>, timeout: Duration) -> Self {
        Self { transport, control_table, timeout, recv_buffer: Vec::new() }
    }

    pub fn control_table(&self) -> &dyn ControlTable {
        self.control_table.as_ref()
    }

    fn send(&mut self, packet: &[u8]) -> Result<(), TransactorError> {
        trace!(bytes = ?packet, "writing instruction packet");
        self.transport.write_all(packet)?;
        Ok(())
    }

    /// Read and reframe exactly one response packet addressed to `expected_id`, honoring
    /// `deadline`. A complete packet whose id doesn't match `expected_id` is a stray reply (a
    /// late response to some earlier, already-timed-out transaction) and is dropped rather than
    /// returned, so the caller can never mistake servo A's reply for servo B's; the loop keeps
    /// reading until a matching packet arrives or the deadline passes. `expected_id = None`
    /// accepts any id, for callers (`sync_read`) that do their own id matching across multiple
    /// replies. The receive buffer is updated in place regardless of outcome, so a caller that
    /// times out still preserves whatever partial frame arrived for the next transaction to pick
    /// up.
    fn recv_one(&mut self, deadline: Instant, expected_id: Option<u8>) -> Result<ParsedResponse, TransactorError> {
        loop {
            match extract_packet(&self.recv_buffer) {
                Reframed::Complete { packet, rest } => {
                    self.recv_buffer = rest;
                    let response = packet::parse_response(&packet)?;
                    if let Some(expected) = expected_id {
                        if response.id != expected {
                            warn!(expected, got = response.id, "recv_one: dropping reply with mismatched id");
                            continue;
                        }
                    }
                    return Ok(response);
                }
                Reframed::Incomplete { buffer } => {
                    self.recv_buffer = buffer;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TransactorError::NoResponse {
                    id: expected_id.unwrap_or(0),
                    timeout_ms: self.timeout.as_millis() as u64,
                });
            }

            let chunk_timeout = CHUNK_TIMEOUT.min(deadline - now);
            let mut chunk = [0u8; 256];
            let n = self.transport.read_timeout(&mut chunk, chunk_timeout)?;
            if n > 0 {
                self.recv_buffer.extend_from_slice(&chunk[..n]);
            }
        }
    }

    fn deadline(&self) -> Instant {
        Instant::now() + self.timeout
    }

    /// Ping a servo. Returns its decoded status, or `NoResponse` if it doesn't answer within
    /// the transactor's timeout.
    pub fn ping(&mut self, id: u8) -> Result<StatusInfo, TransactorError> {
        self.send(&packet::ping(id))?;
        let response = self.recv_one(self.deadline(), Some(id))?;
        Ok(parse_status(response.status))
    }

    /// Read one register from one servo.
    pub fn read(&mut self, id: u8, name: &str, mode: AccessMode) -> Result<ReadValue, TransactorError> {
        let def = self.control_table.lookup(name)?;
        self.send(&packet::read(id, def.address, def.length))?;
        let response = self.recv_one(self.deadline(), Some(id))?;

        if def.length as usize != response.params.len() {
            return Err(TransactorError::Codec(CodecError::IncompletePacket));
        }

        match mode {
            AccessMode::Converted => {
                Ok(ReadValue::Converted(self.control_table.decode_user(name, &response.params)?))
            }
            AccessMode::Raw => Ok(ReadValue::Raw(self.control_table.decode_raw(&response.params))),
        }
    }

    fn encode(&self, name: &str, value: WriteValue) -> Result<Vec<u8>, TransactorError> {
        match value {
            WriteValue::Converted(v) => Ok(self.control_table.encode_user(name, v)?),
            WriteValue::Raw(raw) => Ok(self.control_table.encode_raw(name, raw)?),
        }
    }

    /// Write one register on one servo. The servo always replies on a half-duplex bus, so the
    /// reply is always consumed to keep the stream aligned; `await_reply = false` just discards
    /// the decoded status rather than skipping the read.
    pub fn write(
        &mut self,
        id: u8,
        name: &str,
        value: WriteValue,
        await_reply: bool,
    ) -> Result<Option<StatusInfo>, TransactorError> {
        let def = self.control_table.lookup(name)?;
        let data = self.encode(name, value)?;
        self.send(&packet::write(id, def.address, &data)?)?;
        let response = self.recv_one(self.deadline(), Some(id))?;
        let status = parse_status(response.status);
        debug!(id, register = name, await_reply, "write acknowledged");
        Ok(if await_reply { Some(status) } else { None })
    }

    /// Buffer a write in the servo's pending-write register (REG_WRITE); takes effect on the
    /// next `action()` broadcast.
    pub fn reg_write(&mut self, id: u8, name: &str, value: WriteValue) -> Result<StatusInfo, TransactorError> {
        let def = self.control_table.lookup(name)?;
        let data = self.encode(name, value)?;
        self.send(&packet::reg_write(id, def.address, &data)?)?;
        let response = self.recv_one(self.deadline(), Some(id))?;
        Ok(parse_status(response.status))
    }

    /// Broadcast ACTION: commits every servo's pending REG_WRITE. No reply is expected.
    pub fn action(&mut self) -> Result<(), TransactorError> {
        self.send(&packet::action())
    }

    /// Read one register from each of `ids`, matching replies by id rather than assuming they
    /// arrive in request order (a noisy bus can reorder or drop individual replies). Any
    /// missing or invalid reply collapses the whole call to `PartialRead`.
    pub fn sync_read(&mut self, ids: &[u8], name: &str, mode: AccessMode) -> Result<Vec<ReadValue>, TransactorError> {
        let def = self.control_table.lookup(name)?;
        self.send(&packet::sync_read(def.address, def.length, ids)?)?;

        let deadline = self.deadline();
        let mut received: HashMap<u8, ParsedResponse> = HashMap::new();

        while received.len() < ids.len() {
            if Instant::now() >= deadline {
                break;
            }
            match self.recv_one(deadline, None) {
                Ok(response) => {
                    if ids.contains(&response.id) && response.params.len() == def.length as usize {
                        received.entry(response.id).or_insert(response);
                    } else {
                        warn!(id = response.id, register = name, "sync_read: ignoring unexpected reply");
                    }
                }
                Err(TransactorError::NoResponse { .. }) => break,
                Err(e) => {
                    warn!(error = %e, register = name, "sync_read: reply error, continuing until deadline");
                }
            }
        }

        let missing: Vec<u8> = ids.iter().filter(|id| !received.contains_key(id)).copied().collect();
        if !missing.is_empty() {
            return Err(TransactorError::PartialRead { missing });
        }

        ids.iter()
            .map(|id| {
                let response = &received[id];
                match mode {
                    AccessMode::Converted => {
                        Ok(ReadValue::Converted(self.control_table.decode_user(name, &response.params)?))
                    }
                    AccessMode::Raw => Ok(ReadValue::Raw(self.control_table.decode_raw(&response.params))),
                }
            })
            .collect()
    }

    /// Write one register to each `(id, value)` pair in a single broadcast. No reply is
    /// expected from any servo. Each entry's `WriteValue` already self-tags whether it is
    /// converted or raw, so there is no separate mode parameter to keep consistent with it.
    pub fn sync_write(&mut self, name: &str, data: &[(u8, WriteValue)]) -> Result<(), TransactorError> {
        let def = self.control_table.lookup(name)?;
        let encoded: Vec<(u8, Vec<u8>)> =
            data.iter().map(|&(id, v)| Ok::<_, TransactorError>((id, self.encode(name, v)?))).collect::<Result<_, _>>()?;
        let entries: Vec<(u8, &[u8])> = encoded.iter().map(|(id, bytes)| (*id, bytes.as_slice())).collect();
        let packet = packet::sync_write(def.address, def.length, &entries)?;
        self.send(&packet)
    }

    /// Recovery instruction: clears a servo's error state. Not safe to retry blindly.
    pub fn recovery(&mut self, id: u8) -> Result<StatusInfo, TransactorError> {
        self.send(&packet::recovery(id))?;
        let response = self.recv_one(self.deadline(), Some(id))?;
        Ok(parse_status(response.status))
    }

    /// Reset instruction: restores factory defaults. Not safe to retry blindly.
    pub fn reset(&mut self, id: u8) -> Result<StatusInfo, TransactorError> {
        self.send(&packet::reset(id))?;
        let response = self.recv_one(self.deadline(), Some(id))?;
        Ok(parse_status(response.status))
    }
}
