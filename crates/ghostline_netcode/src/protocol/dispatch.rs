//! # Message Dispatcher
//!
//! Classifies a decoded envelope by its explicit discriminator.
//!
//! Classification is a single table lookup. The payload is then decoded
//! against exactly one schema; there is no fallback to other schemas when
//! decoding fails, because a payload can coincidentally satisfy an unrelated
//! layout.

use super::codec::Envelope;
use super::messages::{Message, MessageKind};
use crate::error::DecodeError;

/// Returns the kind named by the envelope's discriminator.
///
/// Unknown discriminators yield `DecodeError::UnknownKind`; the caller drops
/// the datagram and keeps the connection.
#[inline]
pub fn classify(envelope: &Envelope) -> Result<MessageKind, DecodeError> {
    MessageKind::try_from(envelope.discriminator)
}

/// Classifies an envelope and decodes its payload into a typed message.
pub fn dispatch(envelope: &Envelope) -> Result<Message, DecodeError> {
    let kind = classify(envelope)?;
    Message::decode(kind, &envelope.payload)
}
