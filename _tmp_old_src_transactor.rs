//! The bus transactor: serializes requests onto the half-duplex bus, owns the receive buffer
//! across transactions, and turns wire replies into typed results.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::codec::integers::decode_uint;
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

    /// Read and reframe exactly one response packet, honoring `deadline`. The receive buffer
    /// is updated in place regardless of outcome, so a caller that times out still preserves
    /// whatever partial frame arrived for the next transaction to pick up.
    fn recv_one(&mut self, deadline: Instant, expected_id: u8) -> Result<ParsedResponse, TransactorError> {
        loop {
            match extract_packet(&self.recv_buffer) {
                Reframed::Complete { packet, rest } => {
                    self.recv_buffer = rest;
                    return Ok(packet::parse_response(&packet)?);
                }
                Reframed::Incomplete { buffer } => {
                    self.recv_buffer = buffer;
                }
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(TransactorError::NoResponse {
                    id: expected_id,
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
        let response = self.recv_one(self.deadline(), id)?;
        Ok(parse_status(response.status))
    }

    /// Read one register from one servo.
    pub fn read(&mut self, id: u8, name: &str, mode: AccessMode) -> Result<ReadValue, TransactorError> {
        let def = self.control_table.lookup(name)?;
        self.send(&packet::read(id, def.address, def.length))?;
        let response = self.recv_one(self.deadline(), id)?;

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
        self.send(&packet::write(id, def.address, &data))?;
        let response = self.recv_one(self.deadline(), id)?;
        let status = parse_status(response.status);
        debug!(id, register = name, await_reply, "write acknowledged");
        Ok(if await_reply { Some(status) } else { None })
    }

    /// Buffer a write in the servo's pending-write register (REG_WRITE); takes effect on the
    /// next `action()` broadcast.
    pub fn reg_write(&mut self, id: u8, name: &str, value: WriteValue) -> Result<StatusInfo, TransactorError> {
        let def = self.control_table.lookup(name)?;
        let data = self.encode(name, value)?;
        self.send(&packet::reg_write(id, def.address, &data))?;
        let response = self.recv_one(self.deadline(), id)?;
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
        self.send(&packet::sync_read(def.address, def.length, ids))?;

        let deadline = self.deadline();
        let mut received: HashMap<u8, ParsedResponse> = HashMap::new();

        while received.len() < ids.len() {
            if Instant::now() >= deadline {
                break;
            }
            match self.recv_one(deadline, 0) {
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
    /// expected from any servo.
    pub fn sync_write(&mut self, name: &str, data: &[(u8, WriteValue)], _mode: AccessMode) -> Result<(), TransactorError> {
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
        let response = self.recv_one(self.deadline(), id)?;
        Ok(parse_status(response.status))
    }

    /// Reset instruction: restores factory defaults. Not safe to retry blindly.
    pub fn reset(&mut self, id: u8) -> Result<StatusInfo, TransactorError> {
        self.send(&packet::reset(id))?;
        let response = self.recv_one(self.deadline(), id)?;
        Ok(parse_status(response.status))
    }
}

/// Interpret a register's raw decoded bytes as a plain integer, independent of any control
/// table (used by operator tooling that wants to show raw register dumps).
pub fn raw_register_value(bytes: &[u8]) -> u32 {
    decode_uint(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control_table::sts3215::Sts3215Table;
    use crate::transport::mock::MockTransport;

    fn transactor(chunks: Vec<Vec<u8>>) -> Transactor<MockTransport> {
        Transactor::new(
            MockTransport::with_chunks(chunks),
            Box::new(Sts3215Table),
            Duration::from_millis(50),
        )
    }

    #[test]
    fn ping_success() {
        let mut t = transactor(vec![vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC]]);
        let status = t.ping(1).unwrap();
        assert!(status.errors.is_empty());
    }

    #[test]
    fn ping_times_out_with_no_reply() {
        let mut t = transactor(vec![]);
        match t.ping(1) {
            Err(TransactorError::NoResponse { id: 1, .. }) => {}
            other => panic!("expected NoResponse, got {other:?}"),
        }
    }

    #[test]
    fn read_present_position_converted() {
        // status=0, params = 0x00 0x08 (2048 steps -> pi radians)
        let mut t = transactor(vec![vec![0xFF, 0xFF, 0x01, 0x04, 0x00, 0x00, 0x08, 0xF3]]);
        let value = t.read(1, "present_position", AccessMode::Converted).unwrap();
        match value {
            ReadValue::Converted(RegisterValue::Number(n)) => {
                assert!((n - std::f64::consts::PI).abs() < 1e-3)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn write_without_await_still_consumes_reply_and_aligns_stream() {
        let mut t = transactor(vec![
            vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC], // reply to the write
            vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC], // reply to the following ping
        ]);
        let result = t.write(1, "torque_enable", WriteValue::Converted(RegisterValue::Bool(true)), false).unwrap();
        assert!(result.is_none());
        // If the write's reply had not been drained, this ping would desync and fail.
        t.ping(1).unwrap();
    }

    #[test]
    fn write_with_await_returns_status() {
        let mut t = transactor(vec![vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC]]);
        let result =
            t.write(1, "torque_enable", WriteValue::Converted(RegisterValue::Bool(true)), true).unwrap();
        assert!(result.unwrap().errors.is_empty());
    }

    #[test]
    fn sync_read_collects_in_request_order_even_when_replies_are_scrambled() {
        // Replies for ids 2 and 1 arrive swapped on the wire, each carrying one byte.
        let reply_for = |id: u8, value: u8| {
            let mut p = vec![0xFF, 0xFF, id, 0x03, 0x00, value];
            let sum: u32 = p[2..].iter().map(|&b| b as u32).sum();
            p.push((!sum & 0xFF) as u8);
            p
        };
        let mut combined = reply_for(2, 42);
        combined.extend(reply_for(1, 7));

        let mut t = transactor(vec![combined]);
        let values = t.sync_read(&[1, 2], "present_temperature", AccessMode::Converted).unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values[0], ReadValue::Converted(RegisterValue::Number(7.0)));
        assert_eq!(values[1], ReadValue::Converted(RegisterValue::Number(42.0)));
    }

    #[test]
    fn sync_read_reports_partial_read_on_missing_reply() {
        let reply_for = |id: u8, value: u8| {
            let mut p = vec![0xFF, 0xFF, id, 0x03, 0x00, value];
            let sum: u32 = p[2..].iter().map(|&b| b as u32).sum();
            p.push((!sum & 0xFF) as u8);
            p
        };
        let mut t = transactor(vec![reply_for(1, 7)]);
        match t.sync_read(&[1, 2], "present_temperature", AccessMode::Converted) {
            Err(TransactorError::PartialRead { missing }) => assert_eq!(missing, vec![2]),
            other => panic!("expected PartialRead, got {other:?}"),
        }
    }

    #[test]
    fn action_sends_broadcast_and_reads_nothing() {
        let mut t = transactor(vec![]);
        t.action().unwrap();
        assert_eq!(t.transport.written, packet::action());
    }

    #[test]
    fn unknown_register_fails_before_any_bytes_hit_the_wire() {
        let mut t = transactor(vec![]);
        let err = t.read(1, "no_such_register", AccessMode::Converted).unwrap_err();
        assert!(matches!(err, TransactorError::ControlTable(ControlTableError::UnknownRegister(_))));
        assert!(t.transport.written.is_empty());
    }

    #[test]
    fn stale_incomplete_tail_survives_across_transactions() {
        // First transaction: the reply arrives split across two reads, delivered to the bus in
        // two chunks that cross the ping() call boundary by construction of this test's mock.
        let header_only = vec![0xFF, 0xFF, 0x01, 0x02];
        let rest = vec![0x00, 0xFC];
        let mut t = transactor(vec![header_only]);
        // Not enough bytes yet within the timeout window (only one chunk queued) -> times out,
        // but the partial header-aligned bytes must remain in the buffer afterward.
        assert!(matches!(t.ping(1), Err(TransactorError::NoResponse { .. })));
        assert_eq!(t.recv_buffer, vec![0xFF, 0xFF, 0x01, 0x02]);

        // Simulate the rest of the reply arriving before the next transaction's own bytes.
        t.transport.chunks.push_back(rest);
        let status = t.ping(1).unwrap();
        assert!(status.errors.is_empty());
    }
}


