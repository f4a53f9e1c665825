// Stream reframer: recovers one packet at a time from an arbitrary byte buffer.
//
// The bus transactor feeds this whatever bytes the transport has delivered so far; it never
// validates the checksum (that is `parse_response`'s job), so a single malformed packet can't
// wedge the reframer — a caller can always decide to drop a bad packet and keep reading.

/// Outcome of one reframing pass over a buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reframed {
    /// A complete packet was found. `rest` is whatever followed it, ready to be fed back in.
    Complete { packet: Vec<u8>, rest: Vec<u8> },
    /// Not enough bytes yet for a full packet. `buffer` is header-aligned: any leading garbage
    /// (bytes that can't be the start of a `0xFF 0xFF` header) has already been discarded.
    Incomplete { buffer: Vec<u8> },
}

/// Find the offset of the first byte that could start a header, discarding garbage before it.
/// A lone trailing `0xFF` is treated as a possible partial header and its offset is returned
/// rather than the buffer's length.
fn find_header(buffer: &[u8]) -> usize {
    let n = buffer.len();
    let mut i = 0;
    while i < n {
        if buffer[i] == 0xFF {
            if i + 1 == n {
                return i; // trailing lone 0xFF: keep it, might complete next read
            }
            if buffer[i + 1] == 0xFF {
                return i;
            }
        }
        i += 1;
    }
    n
}

/// Scan `buffer` for one complete packet, discarding leading garbage along the way.
pub fn extract_packet(buffer: &[u8]) -> Reframed {
    let start = find_header(buffer);
    let tail = &buffer[start..];

    // Need the full 4-byte prefix (header + id + len) before LEN is even known.
    if tail.len() < 4 {
        return Reframed::Incomplete { buffer: tail.to_vec() };
    }

    let len = tail[3] as usize;
    let total = len + 4;
    if tail.len() < total {
        return Reframed::Incomplete { buffer: tail.to_vec() };
    }

    Reframed::Complete {
        packet: tail[..total].to_vec(),
        rest: tail[total..].to_vec(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_prefix_is_discarded() {
        let reframed = extract_packet(&[0x00, 0x00, 0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC]);
        assert_eq!(
            reframed,
            Reframed::Complete { packet: vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC], rest: vec![] }
        );
    }

    #[test]
    fn incomplete_header_preserves_trailing_lone_ff() {
        let reframed = extract_packet(&[0x00, 0xFF]);
        assert_eq!(reframed, Reframed::Incomplete { buffer: vec![0xFF] });
    }

    #[test]
    fn incomplete_frame_keeps_header_aligned_buffer() {
        let reframed = extract_packet(&[0xFF, 0xFF, 0x01, 0x04, 0x00]);
        assert_eq!(reframed, Reframed::Incomplete { buffer: vec![0xFF, 0xFF, 0x01, 0x04, 0x00] });
    }

    #[test]
    fn splits_packet_from_trailing_bytes() {
        let mut buf = vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC];
        buf.extend_from_slice(&[0xFF, 0xFF, 0x02, 0x02, 0x00]);
        let reframed = extract_packet(&buf);
        assert_eq!(
            reframed,
            Reframed::Complete {
                packet: vec![0xFF, 0xFF, 0x01, 0x02, 0x00, 0xFC],
                rest: vec![0xFF, 0xFF, 0x02, 0x02, 0x00],
            }
        );
    }

    #[test]
    fn no_header_discards_everything() {
        let reframed = extract_packet(&[0x00, 0x01, 0x02]);
        assert_eq!(reframed, Reframed::Incomplete { buffer: vec![] });
    }

    proptest::proptest! {
        #[test]
        fn idempotent_over_concatenated_packets(
            garbage1 in proptest::collection::vec(1u8..=0xFEu8, 0..6),
            garbage2 in proptest::collection::vec(1u8..=0xFEu8, 0..6),
            id1 in 0u8..=253,
            id2 in 0u8..=253,
        ) {
            let packet1 = crate::codec::packet::ping(id1);
            let packet2 = crate::codec::packet::ping(id2);

            let mut buffer = garbage1.clone();
            buffer.extend_from_slice(&packet1);
            buffer.extend_from_slice(&garbage2);
            buffer.extend_from_slice(&packet2);

            let first = extract_packet(&buffer);
            let Reframed::Complete { packet, rest } = first else {
                panic!("expected first packet to be complete");
            };
            proptest::prop_assert_eq!(packet, packet1);

            let second = extract_packet(&rest);
            let Reframed::Complete { packet, rest } = second else {
                panic!("expected second packet to be complete");
            };
            proptest::prop_assert_eq!(packet, packet2);
            proptest::prop_assert!(rest.is_empty());
        }
    }
}
