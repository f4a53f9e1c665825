//! Byte-exact wire codec: integer encodings, packet framing, and stream reframing.

pub mod integers;
pub mod packet;
pub mod reframe;

pub use integers::{decode_int_signed, decode_sign_magnitude, decode_uint, encode_sign_magnitude, encode_uint};
pub use packet::{CodecError, Instruction, ParsedResponse, BROADCAST_ID};
pub use reframe::{extract_packet, Reframed};
