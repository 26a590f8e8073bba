//! Source RCON packet framing.
//!
//! ```text
//! size: i32 LE | id: i32 LE | type: i32 LE | body bytes | 0x00 | 0x00
//! ```
//!
//! `size` counts everything after itself.

use std::io::{self, Read, Write};

use crate::{Error, Result};

/// Client to server: log in with the password as body.
pub const SERVERDATA_AUTH: i32 = 3;
/// Server to client: login result. An id of `-1` means the password was wrong.
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
/// Client to server: run the body as a console command.
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
/// Server to client: command output.
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// Largest packet accepted from a server.
pub const MAX_PACKET_SIZE: usize = 1 << 20;

const HEADER_LEN: usize = 8;
const PADDING_LEN: usize = 2;

/// One RCON packet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: &str) -> Self {
        Self {
            id,
            kind,
            body: body.to_string(),
        }
    }

    /// Serialized bytes, size prefix included.
    pub fn encode(&self) -> Vec<u8> {
        let size = HEADER_LEN + self.body.len() + PADDING_LEN;
        let mut buf = Vec::with_capacity(4 + size);
        buf.extend_from_slice(&(size as i32).to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(self.body.as_bytes());
        buf.extend_from_slice(&[0, 0]);
        buf
    }

    pub fn write_to(&self, w: &mut impl Write) -> Result<()> {
        w.write_all(&self.encode()).map_err(map_io)?;
        w.flush().map_err(map_io)
    }

    /// Reads one packet.
    ///
    /// # Errors
    ///
    /// [`Error::Timeout`] when the read deadline passes, [`Error::Protocol`]
    /// on an impossible size.
    pub fn read_from(r: &mut impl Read) -> Result<Self> {
        let mut size = [0u8; 4];
        r.read_exact(&mut size).map_err(map_io)?;
        let size = i32::from_le_bytes(size);
        let size = usize::try_from(size)
            .ok()
            .filter(|s| (HEADER_LEN + PADDING_LEN..=MAX_PACKET_SIZE).contains(s))
            .ok_or(Error::Protocol(format!("bad packet size {size}")))?;

        let mut buf = vec![0u8; size];
        r.read_exact(&mut buf).map_err(map_io)?;

        let id = i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        let kind = i32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let body = &buf[HEADER_LEN..];
        let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());

        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(&body[..end]).to_string(),
        })
    }
}

pub(crate) fn map_io(e: io::Error) -> Error {
    match e.kind() {
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => Error::Timeout,
        _ => Error::Io(e),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn encodes_known_layout() {
        let bytes = Packet::new(7, SERVERDATA_EXECCOMMAND, "ListPlayers").encode();
        assert_eq!(&bytes[..4], &21i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..23], b"ListPlayers");
        assert_eq!(&bytes[23..], &[0, 0]);
    }

    #[test]
    fn decodes_what_it_encodes() {
        let pkt = Packet::new(-1, SERVERDATA_AUTH_RESPONSE, "");
        let mut cur = Cursor::new(pkt.encode());
        assert_eq!(Packet::read_from(&mut cur).unwrap(), pkt);
    }

    #[test]
    fn rejects_bad_sizes() {
        let mut cur = Cursor::new(3i32.to_le_bytes().to_vec());
        assert!(matches!(Packet::read_from(&mut cur), Err(Error::Protocol(_))));

        let mut cur = Cursor::new((-5i32).to_le_bytes().to_vec());
        assert!(matches!(Packet::read_from(&mut cur), Err(Error::Protocol(_))));
    }

    #[test]
    fn truncated_stream_is_io_error() {
        let mut bytes = Packet::new(1, 0, "hello").encode();
        bytes.truncate(10);
        let mut cur = Cursor::new(bytes);
        assert!(matches!(Packet::read_from(&mut cur), Err(Error::Io(_))));
    }
}
