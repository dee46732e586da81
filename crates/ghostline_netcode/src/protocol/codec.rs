//! # Envelope Codec
//!
//! Byte-level reader/writer and the self-contained datagram envelope.
//!
//! ## Design
//!
//! - All multi-byte values are little-endian
//! - Reads never panic on short input; they report `None` and the caller maps
//!   that to a `DecodeError`
//! - The writer reuses its buffer across messages (`reset`)

use ghostline_shared::{MAX_DATAGRAM_SIZE, MAX_WIRE_STRING_LEN, PROTOCOL_VERSION};

use super::messages::{Message, MessageKind};
use crate::error::{DecodeError, EncodeError};

/// Envelope flag: an origin id follows the fixed header.
const FLAG_ORIGIN: u8 = 1 << 0;

/// Bits that must be zero in the flags byte.
const RESERVED_FLAGS: u8 = !FLAG_ORIGIN;

/// Version (1) + kind (1) + flags (1) + sent-at (8).
const FIXED_HEADER_SIZE: usize = 11;

/// Fixed header plus the payload length prefix.
const MIN_ENVELOPE_SIZE: usize = FIXED_HEADER_SIZE + 2;

/// Byte writer - appends little-endian values to a growable buffer.
///
/// Designed to be reused across messages to avoid reallocating.
#[derive(Clone, Debug, Default)]
pub struct WireWriter {
    buffer: Vec<u8>,
}

impl WireWriter {
    /// Creates a writer with room for one full datagram.
    #[must_use]
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(MAX_DATAGRAM_SIZE),
        }
    }

    /// Clears the writer for reuse, keeping its allocation.
    #[inline]
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Returns the number of bytes written.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Returns true if no bytes have been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Returns a slice of the written data.
    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// Consumes the writer, returning the written bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buffer
    }

    /// Writes a single byte.
    #[inline]
    pub fn write_u8(&mut self, value: u8) {
        self.buffer.push(value);
    }

    /// Writes a boolean as `0` or `1`.
    #[inline]
    pub fn write_bool(&mut self, value: bool) {
        self.write_u8(u8::from(value));
    }

    /// Writes a u16 in little-endian format.
    #[inline]
    pub fn write_u16(&mut self, value: u16) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u32 in little-endian format.
    #[inline]
    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a u64 in little-endian format.
    #[inline]
    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f32 in little-endian format.
    #[inline]
    pub fn write_f32(&mut self, value: f32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a f64 in little-endian format.
    #[inline]
    pub fn write_f64(&mut self, value: f64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Writes a block of 32-bit words, each little-endian.
    #[inline]
    pub fn write_words(&mut self, words: &[u32]) {
        for &word in words {
            self.write_u32(word);
        }
    }

    /// Writes a `u16` count prefix for a list of `len` items.
    pub fn write_count(&mut self, len: usize) -> Result<(), EncodeError> {
        let count = u16::try_from(len).map_err(|_| EncodeError::ListTooLong(len))?;
        self.write_u16(count);
        Ok(())
    }

    /// Writes raw bytes behind a `u16` length prefix.
    pub fn write_prefixed(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        if bytes.len() > MAX_WIRE_STRING_LEN {
            return Err(EncodeError::StringTooLong(bytes.len()));
        }
        self.write_u16(bytes.len() as u16);
        self.buffer.extend_from_slice(bytes);
        Ok(())
    }

    /// Writes a UTF-8 string behind a `u16` length prefix.
    #[inline]
    pub fn write_str(&mut self, value: &str) -> Result<(), EncodeError> {
        self.write_prefixed(value.as_bytes())
    }
}

/// Byte reader - reads little-endian values from a borrowed buffer.
#[derive(Clone, Debug)]
pub struct WireReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> WireReader<'a> {
    /// Creates a new reader over a buffer.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns true once every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Reads exactly `len` bytes.
    #[inline]
    pub fn read_bytes(&mut self, len: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(len)?;
        let slice = self.buffer.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// Reads a fixed-size array.
    #[inline]
    fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    /// Reads a single byte.
    #[inline]
    pub fn read_u8(&mut self) -> Option<u8> {
        self.read_array::<1>().map(|b| b[0])
    }

    /// Reads a strict boolean. Bytes other than `0`/`1` yield `None`.
    #[inline]
    pub fn read_bool(&mut self) -> Option<bool> {
        match self.read_u8()? {
            0 => Some(false),
            1 => Some(true),
            _ => None,
        }
    }

    /// Reads a u16 in little-endian format.
    #[inline]
    pub fn read_u16(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_le_bytes)
    }

    /// Reads a u32 in little-endian format.
    #[inline]
    pub fn read_u32(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a u64 in little-endian format.
    #[inline]
    pub fn read_u64(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }

    /// Reads a f32 in little-endian format.
    #[inline]
    pub fn read_f32(&mut self) -> Option<f32> {
        self.read_u32().map(f32::from_bits)
    }

    /// Reads a f64 in little-endian format.
    #[inline]
    pub fn read_f64(&mut self) -> Option<f64> {
        self.read_u64().map(f64::from_bits)
    }

    /// Reads `N` little-endian 32-bit words.
    #[inline]
    pub fn read_words<const N: usize>(&mut self) -> Option<[u32; N]> {
        let mut words = [0u32; N];
        for word in &mut words {
            *word = self.read_u32()?;
        }
        Some(words)
    }

    /// Reads bytes behind a `u16` length prefix.
    #[inline]
    pub fn read_prefixed(&mut self) -> Option<&'a [u8]> {
        let len = self.read_u16()?;
        self.read_bytes(usize::from(len))
    }

    /// Reads a UTF-8 string behind a `u16` length prefix.
    ///
    /// Truncated or non-UTF-8 data yields `None`.
    #[inline]
    pub fn read_str(&mut self) -> Option<&'a str> {
        std::str::from_utf8(self.read_prefixed()?).ok()
    }
}

/// Self-contained datagram envelope.
///
/// The payload stays opaque bytes until the dispatcher decodes it against the
/// schema named by `discriminator`, so an envelope with an unrecognized kind
/// still decodes and can be logged and skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Envelope {
    /// Raw kind discriminator (see `MessageKind`).
    pub discriminator: u8,
    /// Session-scoped id of the sender, where applicable.
    pub origin_id: Option<String>,
    /// Encoded message payload.
    pub payload: Vec<u8>,
    /// Sender timestamp in milliseconds since the sender's own epoch.
    ///
    /// `SyncClient` stamps its monotonic `now`; it is not wall-clock time.
    pub sent_at_ms: u64,
}

impl Envelope {
    /// Wraps an encoded message.
    pub fn from_message(
        message: &Message,
        origin_id: Option<String>,
        sent_at_ms: u64,
    ) -> Result<Self, EncodeError> {
        let mut writer = WireWriter::new();
        message.encode_payload(&mut writer)?;
        Ok(Self {
            discriminator: message.kind() as u8,
            origin_id,
            payload: writer.into_inner(),
            sent_at_ms,
        })
    }

    /// Returns the kind named by the discriminator, if it is a known one.
    #[inline]
    #[must_use]
    pub fn kind(&self) -> Option<MessageKind> {
        MessageKind::from_discriminator(self.discriminator)
    }

    /// Size of this envelope on the wire.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        let origin = self.origin_id.as_ref().map_or(0, |o| 2 + o.len());
        MIN_ENVELOPE_SIZE + origin + self.payload.len()
    }

    /// Encodes the envelope into a reusable writer (the writer is reset first).
    pub fn encode_into(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        let size = self.encoded_len();
        if size > MAX_DATAGRAM_SIZE {
            return Err(EncodeError::Oversized {
                size,
                limit: MAX_DATAGRAM_SIZE,
            });
        }

        writer.reset();
        writer.write_u8(PROTOCOL_VERSION);
        writer.write_u8(self.discriminator);
        writer.write_u8(if self.origin_id.is_some() { FLAG_ORIGIN } else { 0 });
        writer.write_u64(self.sent_at_ms);
        if let Some(origin) = &self.origin_id {
            writer.write_str(origin)?;
        }
        writer.write_prefixed(&self.payload)
    }

    /// Encodes the envelope into a fresh buffer.
    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let mut writer = WireWriter::new();
        self.encode_into(&mut writer)?;
        Ok(writer.into_inner())
    }

    /// Decodes an envelope from a received datagram.
    ///
    /// Only the structure is checked here; the payload is validated when the
    /// dispatcher decodes it.
    pub fn decode(bytes: &[u8]) -> Result<Self, DecodeError> {
        if bytes.len() < MIN_ENVELOPE_SIZE {
            return Err(DecodeError::MalformedEnvelope("shorter than envelope header"));
        }

        let mut reader = WireReader::new(bytes);
        let version = reader
            .read_u8()
            .ok_or(DecodeError::MalformedEnvelope("missing version"))?;
        if version != PROTOCOL_VERSION {
            return Err(DecodeError::UnsupportedVersion {
                found: version,
                expected: PROTOCOL_VERSION,
            });
        }

        let discriminator = reader
            .read_u8()
            .ok_or(DecodeError::MalformedEnvelope("missing discriminator"))?;
        let flags = reader
            .read_u8()
            .ok_or(DecodeError::MalformedEnvelope("missing flags"))?;
        if flags & RESERVED_FLAGS != 0 {
            return Err(DecodeError::MalformedEnvelope("reserved flag bits set"));
        }
        let sent_at_ms = reader
            .read_u64()
            .ok_or(DecodeError::MalformedEnvelope("missing timestamp"))?;

        let origin_id = if flags & FLAG_ORIGIN != 0 {
            let origin = reader
                .read_str()
                .ok_or(DecodeError::MalformedEnvelope("truncated or non-UTF-8 origin id"))?;
            Some(origin.to_owned())
        } else {
            None
        };

        let payload = reader
            .read_prefixed()
            .ok_or(DecodeError::MalformedEnvelope("payload length overruns datagram"))?;
        if !reader.is_exhausted() {
            return Err(DecodeError::MalformedEnvelope("trailing bytes after payload"));
        }

        Ok(Self {
            discriminator,
            origin_id,
            payload: payload.to_vec(),
            sent_at_ms,
        })
    }
}
