//! The hello preamble: the first (and only unframed) bytes on a connection.
//!
//! Immediately after the byte stream connects, the initiating side writes
//! exactly 8 bytes: a 4-byte literal tag followed by its process id as a
//! little-endian u32. The accepting side validates the tag before treating
//! the connection as open and keeps the pid for audit logging. A tag
//! mismatch fails the connection; no framed message is ever sent before the
//! preamble.

use std::io::{Read, Write};

use tracing::debug;

use crate::error::{Result, TransportError};

/// Literal tag opening every connection.
pub const HELLO_TAG: [u8; 4] = *b"HEL0";

/// Total preamble length: tag + pid.
pub const HELLO_LEN: usize = 8;

/// Write the hello preamble carrying this process's id.
pub fn send_hello<W: Write>(stream: &mut W) -> Result<()> {
    send_hello_as(stream, std::process::id())
}

/// Write the hello preamble with an explicit pid (testing, forwarding).
pub fn send_hello_as<W: Write>(stream: &mut W, pid: u32) -> Result<()> {
    let mut hello = [0u8; HELLO_LEN];
    hello[..4].copy_from_slice(&HELLO_TAG);
    hello[4..].copy_from_slice(&pid.to_le_bytes());
    stream.write_all(&hello)?;
    stream.flush()?;
    Ok(())
}

/// Read and validate the hello preamble; returns the peer's claimed pid.
pub fn recv_hello<R: Read>(stream: &mut R) -> Result<u32> {
    let mut hello = [0u8; HELLO_LEN];
    let mut filled = 0usize;
    while filled < HELLO_LEN {
        match stream.read(&mut hello[filled..]) {
            Ok(0) => return Err(TransportError::HelloClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(TransportError::Io(err)),
        }
    }

    let mut tag = [0u8; 4];
    tag.copy_from_slice(&hello[..4]);
    if tag != HELLO_TAG {
        return Err(TransportError::BadHello {
            found: tag,
            expected: HELLO_TAG,
        });
    }

    let pid = u32::from_le_bytes([hello[4], hello[5], hello[6], hello[7]]);
    debug!(pid, "hello preamble accepted");
    Ok(pid)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn hello_roundtrip() {
        let mut wire = Vec::new();
        send_hello_as(&mut wire, 0xDEAD_BEEF).unwrap();
        assert_eq!(wire.len(), HELLO_LEN);
        assert_eq!(&wire[..4], b"HEL0");

        let pid = recv_hello(&mut Cursor::new(wire)).unwrap();
        assert_eq!(pid, 0xDEAD_BEEF);
    }

    #[test]
    fn hello_carries_own_pid_by_default() {
        let mut wire = Vec::new();
        send_hello(&mut wire).unwrap();
        let pid = recv_hello(&mut Cursor::new(wire)).unwrap();
        assert_eq!(pid, std::process::id());
    }

    #[test]
    fn bad_tag_rejected() {
        let mut wire = Vec::new();
        wire.extend_from_slice(b"NOPE");
        wire.extend_from_slice(&1234u32.to_le_bytes());

        let err = recv_hello(&mut Cursor::new(wire)).unwrap_err();
        assert!(matches!(err, TransportError::BadHello { found, .. } if &found == b"NOPE"));
    }

    #[test]
    fn truncated_preamble_rejected() {
        let err = recv_hello(&mut Cursor::new(b"HEL0\x01".to_vec())).unwrap_err();
        assert!(matches!(err, TransportError::HelloClosed));
    }

    #[test]
    fn preamble_survives_byte_by_byte_delivery() {
        struct OneByte(Vec<u8>, usize);
        impl std::io::Read for OneByte {
            fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
                if self.1 >= self.0.len() || buf.is_empty() {
                    return Ok(0);
                }
                buf[0] = self.0[self.1];
                self.1 += 1;
                Ok(1)
            }
        }

        let mut wire = Vec::new();
        send_hello_as(&mut wire, 77).unwrap();
        let pid = recv_hello(&mut OneByte(wire, 0)).unwrap();
        assert_eq!(pid, 77);
    }
}
