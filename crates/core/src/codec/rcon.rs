//! Source RCON wire codec.
//!
//! Every packet on the TCP stream is:
//!
//! ```text
//! int32 size    bytes that follow, little-endian
//! int32 id      caller-chosen correlation id
//! int32 type    0 = RESPONSE_VALUE, 2 = EXECCOMMAND / AUTH_RESPONSE,
//!               3 = AUTH
//! bytes body    NUL-terminated
//! byte  0       trailing NUL of the (always empty) second string
//! ```
//!
//! Type 2 is overloaded by direction: the decoder cannot tell an
//! AUTH_RESPONSE from an EXECCOMMAND, so packets carry the raw type value
//! and the session layer disambiguates by what it solicited.
//!
//! [`FrameBuffer`] turns the byte stream back into frames: partial reads
//! accumulate, and a size below the 10-byte minimum or above the
//! configured ceiling is a protocol violation that must close the
//! connection.

use byteorder::{LittleEndian, WriteBytesExt};

use crate::error::{CodecError, RconError};

/// Command output and auth echoes.
pub const TYPE_RESPONSE_VALUE: i32 = 0;
/// Outbound command; same value as [`TYPE_AUTH_RESPONSE`].
pub const TYPE_EXEC_COMMAND: i32 = 2;
/// Inbound auth verdict; same value as [`TYPE_EXEC_COMMAND`].
pub const TYPE_AUTH_RESPONSE: i32 = 2;
/// Outbound authentication request.
pub const TYPE_AUTH: i32 = 3;

/// id + type + two trailing NULs.
pub const MIN_FRAME_BYTES: usize = 10;

/// One RCON packet, without the length prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RconPacket {
    pub id: i32,
    pub packet_type: i32,
    pub body: Vec<u8>,
}

impl RconPacket {
    /// SERVERDATA_AUTH carrying the password.
    pub fn auth(id: i32, password: &str) -> Self {
        Self {
            id,
            packet_type: TYPE_AUTH,
            body: password.as_bytes().to_vec(),
        }
    }

    /// SERVERDATA_EXECCOMMAND carrying the command line.
    pub fn exec(id: i32, command: &str) -> Self {
        Self {
            id,
            packet_type: TYPE_EXEC_COMMAND,
            body: command.as_bytes().to_vec(),
        }
    }

    /// The empty RESPONSE_VALUE sent right after a command. The server
    /// answers it only after the command output, which delimits a reply
    /// that the protocol itself never terminates.
    pub fn sentinel(id: i32) -> Self {
        Self {
            id,
            packet_type: TYPE_RESPONSE_VALUE,
            body: Vec::new(),
        }
    }

    /// Serialize with the length prefix.
    pub fn encode(&self) -> Vec<u8> {
        let size = MIN_FRAME_BYTES + self.body.len();
        let mut out = Vec::with_capacity(4 + size);
        // Infallible: Vec<u8> writes cannot error.
        let _ = out.write_i32::<LittleEndian>(size as i32);
        let _ = out.write_i32::<LittleEndian>(self.id);
        let _ = out.write_i32::<LittleEndian>(self.packet_type);
        out.extend_from_slice(&self.body);
        out.push(0);
        out.push(0);
        out
    }

    /// Decode a complete frame (the bytes after the size prefix).
    pub fn decode(frame: &[u8]) -> Result<Self, CodecError> {
        if frame.len() < MIN_FRAME_BYTES {
            return Err(CodecError::ShortRead);
        }
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let packet_type = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        match packet_type {
            TYPE_RESPONSE_VALUE | TYPE_AUTH_RESPONSE => {}
            other => return Err(CodecError::UnknownHeader(other as u8)),
        }
        // Strip the body NUL and the empty-string NUL.
        let body = frame[8..frame.len() - 2].to_vec();
        Ok(Self {
            id,
            packet_type,
            body,
        })
    }

    /// Body decoded lossily as UTF-8.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Accumulates TCP stream bytes and yields complete frames.
#[derive(Debug)]
pub struct FrameBuffer {
    buf: Vec<u8>,
    max_frame_bytes: usize,
}

impl FrameBuffer {
    pub fn new(max_frame_bytes: usize) -> Self {
        Self {
            buf: Vec::new(),
            max_frame_bytes,
        }
    }

    /// Append bytes read from the stream.
    pub fn extend(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Pop the next complete frame (without its size prefix), or `None` if
    /// more bytes are needed.
    ///
    /// [`RconError::Framing`] means the stream is unrecoverable and the
    /// connection must be closed.
    pub fn next_frame(&mut self) -> Result<Option<Vec<u8>>, RconError> {
        if self.buf.len() < 4 {
            return Ok(None);
        }
        let size = i32::from_le_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        if size < MIN_FRAME_BYTES as i32 || size as usize > self.max_frame_bytes {
            tracing::warn!(size, max = self.max_frame_bytes, "frame size out of bounds");
            return Err(RconError::Framing);
        }
        let size = size as usize;
        if self.buf.len() < 4 + size {
            return Ok(None);
        }
        let frame = self.buf[4..4 + size].to_vec();
        self.buf.drain(..4 + size);
        Ok(Some(frame))
    }
}
