// Feetech packet framing: instruction packets going out, response packets coming back.
//
// Packet format: [0xFF, 0xFF, ID, LEN, INSTR|STATUS, PARAM..., CHECKSUM]
// LEN = params.len() + 2 (instruction/status byte + checksum byte).
// CHECKSUM = !(ID + LEN + INSTR|STATUS + sum(PARAM)) & 0xFF.

use thiserror::Error;

/// Header bytes every packet starts with.
pub const HEADER: [u8; 2] = [0xFF, 0xFF];

/// The broadcast servo ID: every servo receives it, none reply (except PING, by convention).
pub const BROADCAST_ID: u8 = 0xFE;

/// Instruction codes understood by the bus.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    Ping = 0x01,
    Read = 0x02,
    Write = 0x03,
    RegWrite = 0x04,
    Action = 0x05,
    Recovery = 0x06,
    Reset = 0x0A,
    SyncRead = 0x82,
    SyncWrite = 0x83,
}

/// Errors raised while building or parsing packets.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    #[error("response does not start with the 0xFF 0xFF header")]
    InvalidHeader,

    #[error("buffer too short to contain a full packet")]
    IncompletePacket,

    #[error("checksum mismatch: expected 0x{expected:02X}, computed 0x{computed:02X}")]
    InvalidChecksum { expected: u8, computed: u8 },

    #[error("sync_write data for id {id} is {actual} bytes, expected {expected}")]
    SyncWriteLengthMismatch { id: u8, expected: usize, actual: usize },

    #[error("instruction params are {actual} bytes, exceeding the {max} a single packet's LEN byte can address")]
    ParamsTooLong { actual: usize, max: usize },
}

/// A parsed response packet: the servo ID that replied, its status byte, and the parameter
/// bytes that followed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedResponse {
    pub id: u8,
    pub status: u8,
    pub params: Vec<u8>,
}

/// Compute the Feetech checksum over `id, len, instr_or_status, params...` (i.e. everything
/// in the packet after the two header bytes, excluding the checksum byte itself).
fn checksum(body: &[u8]) -> u8 {
    let sum: u32 = body.iter().map(|&b| b as u32).sum();
    (!sum & 0xFF) as u8
}

/// The largest `params` a packet can carry: `LEN` is a single byte covering
/// `params.len() + 2` (the instruction/status byte and the checksum byte).
const MAX_PARAMS_LEN: usize = 253;

fn build_packet(id: u8, instruction: Instruction, params: &[u8]) -> Vec<u8> {
    debug_assert!(params.len() <= MAX_PARAMS_LEN, "params of {} bytes overflow LEN", params.len());
    let len = (params.len() + 2) as u8;
    let mut packet = Vec::with_capacity(6 + params.len());
    packet.extend_from_slice(&HEADER);
    packet.push(id);
    packet.push(len);
    packet.push(instruction as u8);
    packet.extend_from_slice(params);
    packet.push(checksum(&packet[2..]));
    packet
}

/// Like [`build_packet`], but for instructions whose params grow with a caller-supplied list
/// (`sync_write`/`sync_read`) rather than a fixed-size register access — those can realistically
/// exceed what a single LEN byte can address, so this validates instead of asserting.
fn build_packet_checked(id: u8, instruction: Instruction, params: &[u8]) -> Result<Vec<u8>, CodecError> {
    if params.len() > MAX_PARAMS_LEN {
        return Err(CodecError::ParamsTooLong { actual: params.len(), max: MAX_PARAMS_LEN });
    }
    Ok(build_packet(id, instruction, params))
}

pub fn ping(id: u8) -> Vec<u8> {
    build_packet(id, Instruction::Ping, &[])
}

pub fn read(id: u8, addr: u8, len: u8) -> Vec<u8> {
    build_packet(id, Instruction::Read, &[addr, len])
}

pub fn write(id: u8, addr: u8, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut params = Vec::with_capacity(1 + data.len());
    params.push(addr);
    params.extend_from_slice(data);
    build_packet_checked(id, Instruction::Write, &params)
}

pub fn reg_write(id: u8, addr: u8, data: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut params = Vec::with_capacity(1 + data.len());
    params.push(addr);
    params.extend_from_slice(data);
    build_packet_checked(id, Instruction::RegWrite, &params)
}

pub fn action() -> Vec<u8> {
    build_packet(BROADCAST_ID, Instruction::Action, &[])
}

pub fn recovery(id: u8) -> Vec<u8> {
    build_packet(id, Instruction::Recovery, &[])
}

pub fn reset(id: u8) -> Vec<u8> {
    build_packet(id, Instruction::Reset, &[])
}

/// Build a SYNC_WRITE instruction: every `data` slice must be exactly `per_servo_len` bytes.
pub fn sync_write(addr: u8, per_servo_len: u8, entries: &[(u8, &[u8])]) -> Result<Vec<u8>, CodecError> {
    let mut params = Vec::with_capacity(2 + entries.len() * (1 + per_servo_len as usize));
    params.push(addr);
    params.push(per_servo_len);
    for &(id, data) in entries {
        if data.len() != per_servo_len as usize {
            return Err(CodecError::SyncWriteLengthMismatch {
                id,
                expected: per_servo_len as usize,
                actual: data.len(),
            });
        }
        params.push(id);
        params.extend_from_slice(data);
    }
    build_packet_checked(BROADCAST_ID, Instruction::SyncWrite, &params)
}

/// Build a SYNC_READ instruction requesting `len` bytes at `addr` from each of `ids`.
pub fn sync_read(addr: u8, len: u8, ids: &[u8]) -> Result<Vec<u8>, CodecError> {
    let mut params = Vec::with_capacity(2 + ids.len());
    params.push(addr);
    params.push(len);
    params.extend_from_slice(ids);
    build_packet_checked(BROADCAST_ID, Instruction::SyncRead, &params)
}

/// Parse a complete response packet (header through checksum, no trailing bytes).
pub fn parse_response(bytes: &[u8]) -> Result<ParsedResponse, CodecError> {
    if bytes.len() < 2 || bytes[0..2] != HEADER {
        return Err(CodecError::InvalidHeader);
    }
    if bytes.len() < 4 {
        return Err(CodecError::IncompletePacket);
    }
    let id = bytes[2];
    let len = bytes[3] as usize;
    if len < 2 {
        // LEN covers at least the status byte and the checksum byte; anything less is a
        // malformed frame, not a short read.
        return Err(CodecError::IncompletePacket);
    }
    let total = len + 4;
    if bytes.len() < total {
        return Err(CodecError::IncompletePacket);
    }

    let status = bytes[4];
    let params = bytes[5..total - 1].to_vec();

    let computed = checksum(&bytes[2..total - 1]);
    let expected = bytes[total - 1];
    if computed != expected {
        return Err(CodecError::InvalidChecksum { expected, computed });
    }

    Ok(ParsedResponse { id, status, params })
}
