//! # Ghostline Shared
//!
//! Plain data shared by every participant of the Ghostline protocol.
//!
//! ## Rule
//!
//! This crate holds values, never behavior that depends on I/O. If it needs a
//! socket, a thread or a clock, it belongs in `ghostline_netcode`.

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use constants::{
    DEFAULT_TICK_RATE, MAX_DATAGRAM_SIZE, MAX_WIRE_STRING_LEN, PROTOCOL_VERSION,
};
pub use math::Vec2;
