//! Wire message types
//!
//! A message is a fixed-size [`Header`] followed by a variable-length payload.
//! The header carries the application-defined message type (also the routing
//! key), the emitter id stamped by the server, and the payload length, which
//! is derived: every payload mutator recomputes it so that
//! `header().len() == payload().len()` holds whenever a message is observed
//! outside an in-progress read.
//!
//! All multi-byte fields are encoded big-endian so peers on different
//! platforms agree on the layout.

use bytes::{Buf, BufMut, BytesMut};
use std::fmt;

use crate::error::{MessagingError, Result};

/// Maximum payload size (16MB)
pub const MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

/// Server-assigned identifier for a connected peer
pub type ClientId = u64;

/// Application-defined opcode, used as payload discriminator and routing key
pub type MessageType = i32;

/// Emitter id meaning "no specific peer"; replies carrying it are broadcast
pub const NO_EMITTER: ClientId = 0;

/// Fixed-size metadata prefix of a wire message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    message_type: MessageType,
    emitter_id: ClientId,
    length: u64,
    reserved: [u8; 16],
}

impl Header {
    /// Encoded size on the wire, in bytes
    pub const WIRE_SIZE: usize = 4 + 8 + 8 + 16;

    fn new(emitter_id: ClientId, message_type: MessageType) -> Self {
        Self {
            message_type,
            emitter_id,
            length: 0,
            reserved: [0u8; 16],
        }
    }

    /// Message type (routing key)
    #[must_use]
    pub fn message_type(&self) -> MessageType {
        self.message_type
    }

    /// Emitter id; [`NO_EMITTER`] when no specific peer is recorded
    #[must_use]
    pub fn emitter_id(&self) -> ClientId {
        self.emitter_id
    }

    /// Payload length in bytes, always equal to the current payload size
    #[must_use]
    pub fn len(&self) -> u64 {
        self.length
    }

    /// True when the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    /// Encode the header into `buf`, big-endian
    pub(crate) fn write_to(&self, buf: &mut BytesMut) {
        buf.put_i32(self.message_type);
        buf.put_u64(self.emitter_id);
        buf.put_u64(self.length);
        buf.put_slice(&self.reserved);
    }

    /// Decode a header from exactly [`Header::WIRE_SIZE`] bytes
    pub(crate) fn from_wire(bytes: &[u8; Self::WIRE_SIZE]) -> Self {
        let mut buf = &bytes[..];
        let message_type = buf.get_i32();
        let emitter_id = buf.get_u64();
        let length = buf.get_u64();
        let mut reserved = [0u8; 16];
        buf.copy_to_slice(&mut reserved);
        Self {
            message_type,
            emitter_id,
            length,
            reserved,
        }
    }
}

impl Default for Header {
    fn default() -> Self {
        Self::new(NO_EMITTER, 0)
    }
}

/// Wire message: header plus contiguous payload buffer
///
/// Created empty or with a type, filled incrementally through the typed
/// writers or [`append`](Message::append), sent, then released back to its
/// pool. Typed readers consume the payload front-to-back through an internal
/// cursor and return [`MessagingError::PayloadUnderrun`] instead of panicking
/// when the payload runs out.
#[derive(Debug, Clone, Default)]
pub struct Message {
    header: Header,
    payload: BytesMut,
    cursor: usize,
}

impl Message {
    /// Create an empty message with type `0`
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty message of the given type
    #[must_use]
    pub fn with_type(message_type: MessageType) -> Self {
        Self {
            header: Header::new(NO_EMITTER, message_type),
            payload: BytesMut::new(),
            cursor: 0,
        }
    }

    /// Create an empty message addressed to (or recorded as coming from)
    /// a specific peer
    #[must_use]
    pub fn with_emitter(emitter_id: ClientId, message_type: MessageType) -> Self {
        Self {
            header: Header::new(emitter_id, message_type),
            payload: BytesMut::new(),
            cursor: 0,
        }
    }

    /// Message header
    #[must_use]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Payload bytes
    #[must_use]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub(crate) fn payload_mut(&mut self) -> &mut [u8] {
        &mut self.payload
    }

    /// Total encoded size: header plus payload
    #[must_use]
    pub fn size(&self) -> usize {
        Header::WIRE_SIZE + self.payload.len()
    }

    /// True when the payload is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Set the message type
    pub fn set_type(&mut self, message_type: MessageType) {
        self.header.message_type = message_type;
    }

    /// Set the emitter id
    pub fn set_emitter_id(&mut self, emitter_id: ClientId) {
        self.header.emitter_id = emitter_id;
    }

    /// Resize the payload, zero-extending when growing
    pub fn resize(&mut self, new_size: usize) {
        self.payload.resize(new_size, 0);
        self.cursor = self.cursor.min(new_size);
        self.sync_length();
    }

    /// Empty the payload without releasing its backing storage
    pub fn clear(&mut self) {
        self.payload.clear();
        self.cursor = 0;
        self.sync_length();
    }

    /// Restore the message to a fresh logical state: empty payload, rewound
    /// cursor, zeroed header. Used as the pool cleaner.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.cursor = 0;
        self.header = Header::default();
    }

    /// Append raw bytes to the payload
    pub fn append(&mut self, data: &[u8]) {
        self.payload.extend_from_slice(data);
        self.sync_length();
    }

    /// Overwrite `data.len()` bytes of the payload starting at `offset`
    ///
    /// Fails when the write would run past the end of the payload; `edit`
    /// never grows the buffer.
    pub fn edit(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        let end = offset
            .checked_add(data.len())
            .ok_or(MessagingError::PayloadUnderrun(data.len(), 0))?;
        if end > self.payload.len() {
            return Err(MessagingError::PayloadUnderrun(
                data.len(),
                self.payload.len().saturating_sub(offset),
            ));
        }
        self.payload[offset..end].copy_from_slice(data);
        Ok(())
    }

    /// Rewind the read cursor to the start of the payload
    pub fn rewind(&mut self) {
        self.cursor = 0;
    }

    /// Advance the read cursor without consuming data
    pub fn skip(&mut self, bytes: usize) -> Result<()> {
        let remaining = self.payload.len() - self.cursor;
        if bytes > remaining {
            return Err(MessagingError::PayloadUnderrun(bytes, remaining));
        }
        self.cursor += bytes;
        Ok(())
    }

    /// Bytes left to read from the cursor to the end of the payload
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.payload.len() - self.cursor
    }

    fn sync_length(&mut self) {
        self.header.length = self.payload.len() as u64;
    }

    fn take(&mut self, count: usize) -> Result<&[u8]> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(MessagingError::PayloadUnderrun(count, remaining));
        }
        let start = self.cursor;
        self.cursor += count;
        Ok(&self.payload[start..start + count])
    }

    /// Encode the full message (header then payload) into wire format
    pub fn encode(&self) -> Result<BytesMut> {
        let len = self.payload.len();
        if len > MAX_MESSAGE_SIZE {
            return Err(MessagingError::MessageTooLarge(len, MAX_MESSAGE_SIZE));
        }
        debug_assert_eq!(self.header.length as usize, len);

        let mut buf = BytesMut::with_capacity(Header::WIRE_SIZE + len);
        self.header.write_to(&mut buf);
        buf.put_slice(&self.payload);
        Ok(buf)
    }
}

macro_rules! typed_io {
    ($($write_fn:ident, $read_fn:ident, $ty:ty, $put:ident, $get:ident;)*) => {
        impl Message {
            $(
                #[doc = concat!("Append a big-endian `", stringify!($ty), "` to the payload")]
                pub fn $write_fn(&mut self, value: $ty) {
                    self.payload.$put(value);
                    self.sync_length();
                }

                #[doc = concat!("Read a big-endian `", stringify!($ty), "` at the cursor")]
                pub fn $read_fn(&mut self) -> Result<$ty> {
                    let mut bytes = self.take(std::mem::size_of::<$ty>())?;
                    Ok(bytes.$get())
                }
            )*
        }
    };
}

typed_io! {
    write_u8, read_u8, u8, put_u8, get_u8;
    write_i8, read_i8, i8, put_i8, get_i8;
    write_u16, read_u16, u16, put_u16, get_u16;
    write_i16, read_i16, i16, put_i16, get_i16;
    write_u32, read_u32, u32, put_u32, get_u32;
    write_i32, read_i32, i32, put_i32, get_i32;
    write_u64, read_u64, u64, put_u64, get_u64;
    write_i64, read_i64, i64, put_i64, get_i64;
    write_f32, read_f32, f32, put_f32, get_f32;
    write_f64, read_f64, f64, put_f64, get_f64;
}

impl Message {
    /// Append a `bool` encoded as a single byte
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Read a `bool` at the cursor
    pub fn read_bool(&mut self) -> Result<bool> {
        Ok(self.read_u8()? != 0)
    }

    /// Append raw bytes; alias of [`append`](Message::append) for symmetry
    /// with the typed writers
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.append(data);
    }

    /// Read exactly `count` raw bytes at the cursor
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        Ok(self.take(count)?.to_vec())
    }

    /// Append a string as a `u32` length prefix followed by UTF-8 bytes
    pub fn write_str(&mut self, value: &str) {
        self.write_u32(value.len() as u32);
        self.append(value.as_bytes());
    }

    /// Read a length-prefixed string at the cursor
    pub fn read_str(&mut self) -> Result<String> {
        let len = self.read_u32()? as usize;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| MessagingError::Decode(format!("invalid UTF-8 in string payload: {}", e)))
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Message[type={}, emitter={}, {} bytes]",
            self.header.message_type,
            self.header.emitter_id,
            self.payload.len()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length_tracks_payload() {
        let mut msg = Message::with_type(7);
        assert_eq!(msg.header().len(), 0);

        msg.append(b"hello");
        assert_eq!(msg.header().len(), 5);

        msg.resize(16);
        assert_eq!(msg.header().len(), 16);
        assert_eq!(&msg.payload()[..5], b"hello");
        assert_eq!(msg.payload()[5], 0);

        msg.clear();
        assert_eq!(msg.header().len(), 0);
        assert!(msg.is_empty());
    }

    #[test]
    fn test_typed_round_trip() {
        let mut msg = Message::with_type(1);
        msg.write_u32(0xDEAD_BEEF);
        msg.write_i64(-42);
        msg.write_f64(3.5);
        msg.write_bool(true);
        msg.write_str("ping");

        assert_eq!(msg.read_u32().unwrap(), 0xDEAD_BEEF);
        assert_eq!(msg.read_i64().unwrap(), -42);
        assert_eq!(msg.read_f64().unwrap(), 3.5);
        assert!(msg.read_bool().unwrap());
        assert_eq!(msg.read_str().unwrap(), "ping");
        assert_eq!(msg.remaining(), 0);
    }

    #[test]
    fn test_read_past_end() {
        let mut msg = Message::new();
        msg.write_u16(99);

        assert_eq!(msg.read_u16().unwrap(), 99);
        let err = msg.read_u32().unwrap_err();
        assert!(matches!(err, MessagingError::PayloadUnderrun(4, 0)));
    }

    #[test]
    fn test_edit_bounds() {
        let mut msg = Message::new();
        msg.append(b"abcdef");

        msg.edit(2, b"XY").unwrap();
        assert_eq!(msg.payload(), b"abXYef");
        assert_eq!(msg.header().len(), 6);

        assert!(msg.edit(5, b"ZZ").is_err());
    }

    #[test]
    fn test_header_wire_round_trip() {
        let mut msg = Message::with_emitter(10_007, -3);
        msg.append(b"xyz");

        let encoded = msg.encode().unwrap();
        assert_eq!(encoded.len(), Header::WIRE_SIZE + 3);

        let mut raw = [0u8; Header::WIRE_SIZE];
        raw.copy_from_slice(&encoded[..Header::WIRE_SIZE]);
        let header = Header::from_wire(&raw);

        assert_eq!(header.message_type(), -3);
        assert_eq!(header.emitter_id(), 10_007);
        assert_eq!(header.len(), 3);
        assert_eq!(&encoded[Header::WIRE_SIZE..], b"xyz");
    }

    #[test]
    fn test_header_is_big_endian() {
        let mut msg = Message::with_type(1);
        msg.write_u32(0x0102_0304);
        let encoded = msg.encode().unwrap();

        // type field occupies the first four bytes
        assert_eq!(&encoded[..4], &[0, 0, 0, 1]);
        // payload starts right after the reserved block
        assert_eq!(&encoded[Header::WIRE_SIZE..], &[1, 2, 3, 4]);
    }

    #[test]
    fn test_message_too_large() {
        let mut msg = Message::new();
        msg.resize(MAX_MESSAGE_SIZE + 1);
        assert!(matches!(
            msg.encode(),
            Err(MessagingError::MessageTooLarge(_, MAX_MESSAGE_SIZE))
        ));
    }

    #[test]
    fn test_reset_restores_fresh_state() {
        let mut msg = Message::with_emitter(12, 9);
        msg.write_str("stale");
        msg.read_u32().unwrap();

        msg.reset();
        assert_eq!(msg.header().message_type(), 0);
        assert_eq!(msg.header().emitter_id(), NO_EMITTER);
        assert_eq!(msg.header().len(), 0);
        assert!(msg.is_empty());
        assert_eq!(msg.remaining(), 0);
    }
}
