//! # Wire Protocol
//!
//! Self-contained datagram envelope with an explicit kind discriminator.
//!
//! ## Envelope Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Version (1) │ Kind (1) │ Flags (1) │ SentAt ms (8)           │
//! ├──────────────────────────────────────────────────────────────┤
//! │ [Origin len (2) │ Origin UTF-8]        (only if flags & 1)   │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Payload len (2) │ Payload (positional schema for Kind)       │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Philosophy
//!
//! - The kind byte is read first and decides the payload schema. Payloads are
//!   never probed against several schemas.
//! - Fixed field positions, no field names on the wire
//! - Same message, same bytes (deterministic encoding)
//! - Unknown kinds still decode as envelopes so they can be logged and skipped

mod codec;
mod dispatch;
mod messages;
mod sequence;

pub use codec::{Envelope, WireReader, WireWriter};
pub use dispatch::{classify, dispatch};
pub use messages::{
    ActionFlags, ChatEvent, CombatEvent, ConnectRequest, ConnectResponse, EntityState,
    ErrorNotice, InputFrame, LobbyPhase, LobbyStatus, Message, MessageKind, PlayerId,
    WorldSnapshot,
};
pub use sequence::{sequence_greater_than, sequence_less_or_equal, SequenceNumber};

pub(crate) use sequence::next_sequence;
