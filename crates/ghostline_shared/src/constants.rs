//! # Protocol Constants
//!
//! **CRITICAL:** Both ends must agree on these values. Changing any of them is
//! a breaking protocol change and requires a `PROTOCOL_VERSION` bump.

/// Wire protocol version, carried in the first byte of every envelope.
///
/// Field order inside payloads is positional, so any layout change bumps this.
pub const PROTOCOL_VERSION: u8 = 1;

/// Maximum datagram size (MTU-safe).
///
/// 1200 bytes stays below the 1500-byte Ethernet MTU with room for IP/UDP
/// headers and tunnelling overhead.
pub const MAX_DATAGRAM_SIZE: usize = 1200;

/// Longest string the codec will put on the wire (length prefix is `u16`).
pub const MAX_WIRE_STRING_LEN: usize = u16::MAX as usize;

/// Default fixed simulation rate (ticks per second).
pub const DEFAULT_TICK_RATE: u32 = 60;
