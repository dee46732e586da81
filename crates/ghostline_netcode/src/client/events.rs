//! Discrete events and counters reported by the client loop.

use crate::interpolation::EntityId;
use crate::prediction::PacketLossReport;
use crate::protocol::{ChatEvent, CombatEvent, ErrorNotice, LobbyStatus};
use crate::session::SessionChange;

/// Something the presentation layer should react to.
#[derive(Clone, Debug, PartialEq)]
pub enum ClientEvent {
    /// A remote entity was observed for the first time.
    EntityAdded(EntityId),
    /// A remote entity left (omitted from a full update, absent too long, or
    /// the session ended).
    EntityRemoved(EntityId),
    /// The session changed state.
    SessionStateChanged(SessionChange),
    /// The pending-input ring overflowed.
    SustainedPacketLoss(PacketLossReport),
    /// Chat line.
    Chat(ChatEvent),
    /// Combat notification.
    Combat(CombatEvent),
    /// Lobby status update.
    Lobby(LobbyStatus),
    /// Error notice from the server.
    ServerError(ErrorNotice),
}

/// Client-side counters. Per-datagram failures land here instead of
/// propagating.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Datagrams taken off the inbound queue.
    pub datagrams_received: u64,
    /// Datagrams dropped because the envelope or payload did not decode.
    pub malformed_dropped: u64,
    /// Datagrams dropped for an unknown kind.
    pub unknown_dropped: u64,
    /// Valid messages that made no sense in the current state.
    pub unexpected_dropped: u64,
    /// World snapshots applied.
    pub snapshots_applied: u64,
    /// Local corrections (snap and replay).
    pub corrections: u64,
    /// Local snapshots rejected by validation.
    pub rejected_snapshots: u64,
    /// Local snapshots older than one already applied.
    pub stale_snapshots: u64,
    /// Input frames sent.
    pub inputs_sent: u64,
    /// Outbound datagrams that failed to encode or send.
    pub send_failures: u64,
}
