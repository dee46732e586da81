//! # Message Definitions
//!
//! The closed set of application messages carried inside envelopes.
//!
//! Every payload has a positional schema: fields are written in declaration
//! order with no names or per-field tags. Reordering fields is a breaking
//! change and needs a `PROTOCOL_VERSION` bump.

use bytemuck::{Pod, Zeroable};
use ghostline_shared::Vec2;

use super::codec::{WireReader, WireWriter};
use super::sequence::SequenceNumber;
use crate::error::{DecodeError, EncodeError};

/// Session-scoped player (and player entity) identifier assigned by the server.
pub type PlayerId = u32;

/// Message kinds (wire discriminators).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageKind {
    /// Client -> Server: handshake request.
    ConnectRequest = 1,
    /// Server -> Client: handshake verdict.
    ConnectResponse = 2,
    /// Client -> Server: one tick of player input.
    InputFrame = 3,
    /// Server -> Client: authoritative entity states.
    WorldSnapshot = 4,
    /// Server -> Client: chat line.
    ChatEvent = 5,
    /// Server -> Client: damage report.
    CombatEvent = 6,
    /// Server -> Client: lobby occupancy and phase.
    LobbyStatus = 7,
    /// Server -> Client: server-side error report.
    ErrorNotice = 8,
}

impl MessageKind {
    /// Every kind, in discriminator order.
    pub const ALL: [Self; 8] = [
        Self::ConnectRequest,
        Self::ConnectResponse,
        Self::InputFrame,
        Self::WorldSnapshot,
        Self::ChatEvent,
        Self::CombatEvent,
        Self::LobbyStatus,
        Self::ErrorNotice,
    ];

    /// Maps a wire discriminator to a kind in one `match`.
    #[inline]
    #[must_use]
    pub const fn from_discriminator(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::ConnectRequest),
            2 => Some(Self::ConnectResponse),
            3 => Some(Self::InputFrame),
            4 => Some(Self::WorldSnapshot),
            5 => Some(Self::ChatEvent),
            6 => Some(Self::CombatEvent),
            7 => Some(Self::LobbyStatus),
            8 => Some(Self::ErrorNotice),
            _ => None,
        }
    }
}

impl TryFrom<u8> for MessageKind {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::from_discriminator(value).ok_or(DecodeError::UnknownKind(value))
    }
}

/// Handshake request - Client -> Server.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectRequest {
    /// Name shown to other players.
    pub display_name: String,
    /// Role/class the player asks for. Opaque to the core.
    pub requested_role: String,
}

/// Handshake verdict - Server -> Client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectResponse {
    /// Whether the server admitted the player.
    pub success: bool,
    /// Assigned player id (meaningless when `success` is false).
    pub player_id: PlayerId,
    /// Opaque session token; carried, never interpreted.
    pub session_token: String,
    /// Human-readable refusal reason (empty on success).
    pub reason: String,
}

/// Discrete action bits carried in an input frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ActionFlags(u8);

impl ActionFlags {
    /// No action.
    pub const NONE: Self = Self(0);
    /// Primary attack.
    pub const PRIMARY: Self = Self(1 << 0);
    /// Secondary attack / aim.
    pub const SECONDARY: Self = Self(1 << 1);
    /// Use / interact.
    pub const INTERACT: Self = Self(1 << 2);
    /// Reload.
    pub const RELOAD: Self = Self(1 << 3);
    /// Class ability.
    pub const ABILITY: Self = Self(1 << 4);

    /// Creates flags from raw bits.
    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    /// Returns the raw bits.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u8 {
        self.0
    }

    /// Returns true if every bit of `other` is set.
    #[inline]
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Sets every bit of `other`.
    #[inline]
    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl std::ops::BitOr for ActionFlags {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// One tick of player input - Client -> Server.
///
/// Wire size: 28 bytes.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct InputFrame {
    /// Monotonic input sequence (starts at 1).
    pub sequence: SequenceNumber,
    /// Last input sequence the server is known to have applied.
    pub ack_sequence: SequenceNumber,
    /// Seconds since session start when the frame was produced.
    pub client_time: f32,
    /// Movement direction, length <= 1.
    pub move_vector: Vec2,
    /// Sprint modifier held.
    pub sprinting: bool,
    /// Aim direction in radians.
    pub aim_angle: f32,
    /// Discrete actions.
    pub action_flags: ActionFlags,
}

impl InputFrame {
    /// Size in bytes.
    pub const SIZE: usize = 28;

    fn encode(&self, writer: &mut WireWriter) {
        writer.write_u32(self.sequence);
        writer.write_u32(self.ack_sequence);
        writer.write_f32(self.client_time);
        writer.write_f32(self.move_vector.x);
        writer.write_f32(self.move_vector.y);
        writer.write_f32(self.aim_angle);
        writer.write_bool(self.sprinting);
        writer.write_u8(self.action_flags.bits());
        writer.write_u16(0);
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        let sequence = reader.read_u32()?;
        let ack_sequence = reader.read_u32()?;
        let client_time = reader.read_f32()?;
        let move_vector = Vec2::new(reader.read_f32()?, reader.read_f32()?);
        let aim_angle = reader.read_f32()?;
        let sprinting = reader.read_bool()?;
        let action_flags = ActionFlags::from_bits(reader.read_u8()?);
        if reader.read_u16()? != 0 {
            return None;
        }
        Some(Self {
            sequence,
            ack_sequence,
            client_time,
            move_vector,
            sprinting,
            aim_angle,
            action_flags,
        })
    }
}

/// Number of 32-bit words in an `EntityState` block.
const ENTITY_WORDS: usize = EntityState::SIZE / 4;

/// Authoritative state of one entity inside a world snapshot.
///
/// Size: 28 bytes, every field a 32-bit word so the block is written as seven
/// little-endian words.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct EntityState {
    /// Entity id (player entities share their player id).
    pub entity_id: PlayerId,
    /// Position (world units).
    pub position: Vec2,
    /// Velocity (world units per second).
    pub velocity: Vec2,
    /// Current health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
}

impl EntityState {
    /// Size in bytes.
    pub const SIZE: usize = 28;

    fn encode(&self, writer: &mut WireWriter) {
        let words: [u32; ENTITY_WORDS] = bytemuck::cast(*self);
        writer.write_words(&words);
    }

    fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
        let words = reader.read_words::<ENTITY_WORDS>()?;
        Some(bytemuck::cast(words))
    }
}

/// Authoritative world state - Server -> Client.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct WorldSnapshot {
    /// Server simulation time in seconds.
    pub server_time: f64,
    /// Highest input sequence of the receiving client the server has applied.
    pub ack_sequence: SequenceNumber,
    /// True when `entities` lists every entity in scope; absent ones departed.
    pub full_update: bool,
    /// Entity states.
    pub entities: Vec<EntityState>,
}

impl WorldSnapshot {
    /// Finds an entity's state by id.
    #[must_use]
    pub fn entity(&self, entity_id: PlayerId) -> Option<&EntityState> {
        self.entities.iter().find(|e| e.entity_id == entity_id)
    }
}

/// Chat line - Server -> Client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatEvent {
    /// Display name of the sender.
    pub sender: String,
    /// Message text.
    pub text: String,
}

/// Damage report - Server -> Client.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CombatEvent {
    /// Entity that dealt the damage.
    pub attacker: PlayerId,
    /// Entity that took the damage.
    pub target: PlayerId,
    /// Damage dealt.
    pub damage: f32,
    /// Target health after the hit.
    pub target_health: f32,
}

/// Lobby lifecycle phase.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LobbyPhase {
    /// Waiting for players.
    #[default]
    Waiting = 0,
    /// Countdown running.
    Starting = 1,
    /// Match underway.
    InProgress = 2,
    /// Match over.
    Ended = 3,
}

impl LobbyPhase {
    const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Waiting),
            1 => Some(Self::Starting),
            2 => Some(Self::InProgress),
            3 => Some(Self::Ended),
            _ => None,
        }
    }
}

/// Lobby occupancy - Server -> Client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LobbyStatus {
    /// Current phase.
    pub phase: LobbyPhase,
    /// Connected players.
    pub connected: u16,
    /// Player capacity.
    pub capacity: u16,
}

/// Server-side error report - Server -> Client.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorNotice {
    /// Application error code.
    pub code: u16,
    /// Human-readable description.
    pub message: String,
}

/// A decoded application message (tagged union keyed by `MessageKind`).
#[derive(Clone, Debug, PartialEq)]
pub enum Message {
    /// Handshake request.
    ConnectRequest(ConnectRequest),
    /// Handshake verdict.
    ConnectResponse(ConnectResponse),
    /// Player input.
    Input(InputFrame),
    /// World snapshot.
    Snapshot(WorldSnapshot),
    /// Chat line.
    Chat(ChatEvent),
    /// Damage report.
    Combat(CombatEvent),
    /// Lobby status.
    Lobby(LobbyStatus),
    /// Error report.
    Error(ErrorNotice),
}

impl Message {
    /// Returns the message kind.
    #[must_use]
    pub const fn kind(&self) -> MessageKind {
        match self {
            Self::ConnectRequest(_) => MessageKind::ConnectRequest,
            Self::ConnectResponse(_) => MessageKind::ConnectResponse,
            Self::Input(_) => MessageKind::InputFrame,
            Self::Snapshot(_) => MessageKind::WorldSnapshot,
            Self::Chat(_) => MessageKind::ChatEvent,
            Self::Combat(_) => MessageKind::CombatEvent,
            Self::Lobby(_) => MessageKind::LobbyStatus,
            Self::Error(_) => MessageKind::ErrorNotice,
        }
    }

    /// Appends this message's payload to `writer`.
    pub fn encode_payload(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        match self {
            Self::ConnectRequest(req) => {
                writer.write_str(&req.display_name)?;
                writer.write_str(&req.requested_role)?;
            }
            Self::ConnectResponse(resp) => {
                writer.write_bool(resp.success);
                writer.write_u32(resp.player_id);
                writer.write_str(&resp.session_token)?;
                writer.write_str(&resp.reason)?;
            }
            Self::Input(frame) => frame.encode(writer),
            Self::Snapshot(snapshot) => {
                writer.write_f64(snapshot.server_time);
                writer.write_u32(snapshot.ack_sequence);
                writer.write_bool(snapshot.full_update);
                writer.write_count(snapshot.entities.len())?;
                for entity in &snapshot.entities {
                    entity.encode(writer);
                }
            }
            Self::Chat(chat) => {
                writer.write_str(&chat.sender)?;
                writer.write_str(&chat.text)?;
            }
            Self::Combat(combat) => {
                writer.write_u32(combat.attacker);
                writer.write_u32(combat.target);
                writer.write_f32(combat.damage);
                writer.write_f32(combat.target_health);
            }
            Self::Lobby(lobby) => {
                writer.write_u8(lobby.phase as u8);
                writer.write_u16(lobby.connected);
                writer.write_u16(lobby.capacity);
            }
            Self::Error(notice) => {
                writer.write_u16(notice.code);
                writer.write_str(&notice.message)?;
            }
        }
        Ok(())
    }

    /// Decodes a payload against the single schema named by `kind`.
    pub fn decode(kind: MessageKind, payload: &[u8]) -> Result<Self, DecodeError> {
        let mut reader = WireReader::new(payload);
        let message = Self::decode_fields(kind, &mut reader).ok_or(DecodeError::MalformedPayload {
            kind,
            reason: "truncated or out-of-range field",
        })?;
        if !reader.is_exhausted() {
            return Err(DecodeError::MalformedPayload {
                kind,
                reason: "trailing bytes after payload",
            });
        }
        Ok(message)
    }

    fn decode_fields(kind: MessageKind, reader: &mut WireReader<'_>) -> Option<Self> {
        let message = match kind {
            MessageKind::ConnectRequest => Self::ConnectRequest(ConnectRequest {
                display_name: reader.read_str()?.to_owned(),
                requested_role: reader.read_str()?.to_owned(),
            }),
            MessageKind::ConnectResponse => Self::ConnectResponse(ConnectResponse {
                success: reader.read_bool()?,
                player_id: reader.read_u32()?,
                session_token: reader.read_str()?.to_owned(),
                reason: reader.read_str()?.to_owned(),
            }),
            MessageKind::InputFrame => Self::Input(InputFrame::decode(reader)?),
            MessageKind::WorldSnapshot => {
                let server_time = reader.read_f64()?;
                let ack_sequence = reader.read_u32()?;
                let full_update = reader.read_bool()?;
                let count = usize::from(reader.read_u16()?);
                // Reject counts the remaining bytes cannot hold before allocating.
                if reader.remaining() < count * EntityState::SIZE {
                    return None;
                }
                let mut entities = Vec::with_capacity(count);
                for _ in 0..count {
                    entities.push(EntityState::decode(reader)?);
                }
                Self::Snapshot(WorldSnapshot {
                    server_time,
                    ack_sequence,
                    full_update,
                    entities,
                })
            }
            MessageKind::ChatEvent => Self::Chat(ChatEvent {
                sender: reader.read_str()?.to_owned(),
                text: reader.read_str()?.to_owned(),
            }),
            MessageKind::CombatEvent => Self::Combat(CombatEvent {
                attacker: reader.read_u32()?,
                target: reader.read_u32()?,
                damage: reader.read_f32()?,
                target_health: reader.read_f32()?,
            }),
            MessageKind::LobbyStatus => Self::Lobby(LobbyStatus {
                phase: LobbyPhase::from_u8(reader.read_u8()?)?,
                connected: reader.read_u16()?,
                capacity: reader.read_u16()?,
            }),
            MessageKind::ErrorNotice => Self::Error(ErrorNotice {
                code: reader.read_u16()?,
                message: reader.read_str()?.to_owned(),
            }),
        };
        Some(message)
    }
}
