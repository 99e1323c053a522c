//! The DT-PCI packet header codec: big-endian, fixed-width
//! fields negotiated at bootstrap.
//!
//! ```text
//! [ dst_addr : addr_size bytes ]
//! [ qos_cube : 1 byte          ]
//! [ eid      : eid_size bytes  ]
//! [ ttl      : 1 byte          ]
//! [ payload  : rest of frame   ]
//! ```

use thiserror::Error;
use unicast_core::{Address, Eid, QosCube};

/// Errors decoding a DT-PCI header off the wire.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderError {
    /// The buffer was shorter than the fixed header portion.
    #[error("truncated header: need at least {need} bytes, have {have}")]
    Truncated {
        /// Bytes required for `addr_size + 1 + eid_size + 1`.
        need: usize,
        /// Bytes actually present.
        have: usize,
    },
    /// The wire's `qos_cube` byte named a cube past the configured bound.
    #[error("qos cube {0} out of range")]
    QosOutOfRange(u8),
}

/// A decoded DT-PCI header plus a view of the remaining payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DtPci {
    /// Destination layer address.
    pub dst_addr: Address,
    /// QoS cube this packet travels on.
    pub qos_cube: QosCube,
    /// Endpoint identifier: a reserved component or a flow endpoint.
    pub eid: Eid,
    /// Time-to-live, decremented on every forward.
    pub ttl: u8,
}

impl DtPci {
    /// Serializes the header. Field widths come from the negotiated
    /// `addr_size`/`eid_size`; `max_qos_cubes` isn't needed here, width is
    /// always one byte for the cube index.
    pub fn encode(&self, addr_size: u8, eid_size: u8) -> Vec<u8> {
        let mut out = Vec::with_capacity(addr_size as usize + 1 + eid_size as usize + 1);
        push_be(&mut out, self.dst_addr.as_u64(), addr_size);
        out.push(self.qos_cube.as_u8());
        push_be(&mut out, self.eid.as_u64(), eid_size);
        out.push(self.ttl);
        out
    }

    /// Decodes the fixed header and returns it alongside the remaining
    /// payload slice.
    pub fn decode(
        buf: &[u8],
        addr_size: u8,
        eid_size: u8,
    ) -> Result<(DtPci, &[u8]), HeaderError> {
        let need = addr_size as usize + 1 + eid_size as usize + 1;
        if buf.len() < need {
            return Err(HeaderError::Truncated {
                need,
                have: buf.len(),
            });
        }
        let mut cursor = 0usize;
        let dst_addr = pull_be(buf, &mut cursor, addr_size);
        let qos_raw = buf[cursor];
        cursor += 1;
        let eid = pull_be(buf, &mut cursor, eid_size);
        let ttl = buf[cursor];
        cursor += 1;

        if qos_raw as usize >= unicast_core::limits::MAX_QOS_CUBES {
            return Err(HeaderError::QosOutOfRange(qos_raw));
        }

        Ok((
            DtPci {
                dst_addr: Address::new(dst_addr),
                qos_cube: QosCube::new(qos_raw),
                eid: Eid::new(eid),
                ttl,
            },
            &buf[cursor..],
        ))
    }
}

fn push_be(out: &mut Vec<u8>, value: u64, width: u8) {
    let bytes = value.to_be_bytes();
    out.extend_from_slice(&bytes[8 - width as usize..]);
}

fn pull_be(buf: &[u8], cursor: &mut usize, width: u8) -> u64 {
    let mut acc = 0u64;
    for &b in &buf[*cursor..*cursor + width as usize] {
        acc = (acc << 8) | b as u64;
    }
    *cursor += width as usize;
    acc
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_round_trips() {
        let header = DtPci {
            dst_addr: Address::new(0xabcd),
            qos_cube: QosCube::new(2),
            eid: Eid::new(7),
            ttl: 42,
        };
        let mut wire = header.encode(4, 2);
        wire.extend_from_slice(b"payload");
        let (decoded, payload) = DtPci::decode(&wire, 4, 2).unwrap();
        assert_eq!(decoded, header);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn rejects_truncated_buffer() {
        let err = DtPci::decode(&[0, 0], 4, 2).unwrap_err();
        assert_eq!(
            err,
            HeaderError::Truncated {
                need: 8,
                have: 2
            }
        );
    }

    #[test]
    fn rejects_out_of_range_qos_cube() {
        let mut wire = vec![0u8; 4];
        wire.push(200); // qos_cube byte, past MAX_QOS_CUBES
        wire.extend_from_slice(&[0, 0]); // eid
        wire.push(5); // ttl
        let err = DtPci::decode(&wire, 4, 2).unwrap_err();
        assert_eq!(err, HeaderError::QosOutOfRange(200));
    }
}
