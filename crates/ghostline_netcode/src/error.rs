//! # Error Taxonomy
//!
//! Every error here is local to the call that produced it. Per-datagram errors
//! (`DecodeError`) are logged and the datagram is dropped; nothing in this
//! crate is fatal to the process. The worst outcome is a forced return to
//! `Disconnected`.

use std::io;

use thiserror::Error;

use crate::protocol::MessageKind;
use crate::session::SessionPhase;

/// A received datagram could not be turned into a message.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The envelope structure (header, origin, payload region) did not parse.
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(&'static str),

    /// The sender speaks a different protocol version.
    #[error("unsupported protocol version {found} (expected {expected})")]
    UnsupportedVersion {
        /// Version byte found on the wire.
        found: u8,
        /// Version this build speaks.
        expected: u8,
    },

    /// The discriminator is not part of the closed `MessageKind` set.
    #[error("unknown message kind {0:#04x}")]
    UnknownKind(u8),

    /// The payload does not match the schema implied by its kind.
    #[error("malformed {kind:?} payload: {reason}")]
    MalformedPayload {
        /// Kind named by the envelope discriminator.
        kind: MessageKind,
        /// What was wrong.
        reason: &'static str,
    },
}

/// A message could not be put on the wire.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum EncodeError {
    /// A string field is longer than its `u16` length prefix allows.
    #[error("string field of {0} bytes exceeds the wire limit")]
    StringTooLong(usize),

    /// A list field has more items than its `u16` count allows.
    #[error("list field of {0} items exceeds the wire limit")]
    ListTooLong(usize),

    /// The encoded datagram would not fit in one MTU-safe datagram.
    #[error("datagram of {size} bytes exceeds the {limit}-byte limit")]
    Oversized {
        /// Encoded size.
        size: usize,
        /// Maximum allowed size.
        limit: usize,
    },
}

/// A request was not legal in the current session state.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Gameplay traffic or a disconnect was attempted without an active session.
    #[error("session is not connected")]
    NotConnected,

    /// The request is not a legal edge out of the current state.
    #[error("cannot {action} while {state:?}")]
    IllegalTransition {
        /// Requested operation.
        action: &'static str,
        /// State the session was in.
        state: SessionPhase,
    },
}

/// The datagram transport failed.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Underlying socket error.
    #[error(transparent)]
    Io(#[from] io::Error),

    /// The transport has already been closed.
    #[error("transport closed")]
    Closed,
}

/// The configuration could not be loaded.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The TOML text did not parse into a configuration.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value parsed but is outside its valid range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Errors surfaced by the client simulation loop.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Session-level rejection (e.g. `NotConnected`).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Outbound message could not be encoded.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// Transport failure on send.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
