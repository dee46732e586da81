//! # Session State Machine
//!
//! Tracks the connection lifecycle.
//!
//! ```text
//!              connect()               ConnectResponse(success)
//! Disconnected ─────────► Connecting ─────────────────────────► Active
//!      ▲                      │                                   │
//!      │   rejected / timeout │      watchdog / disconnect()      │
//!      └──────────────────────┴───────────────────────────────────┘
//! ```
//!
//! Timeouts are wall-clock deadlines checked by `poll` once per simulation
//! tick, so every transition is observed on the simulation thread. All
//! timestamps are `Duration`s since the client's monotonic epoch.

use std::time::Duration;

use crate::error::SessionError;
use crate::protocol::{ConnectRequest, ConnectResponse, PlayerId};

/// Session state, without payload (for events and errors).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No session.
    #[default]
    Disconnected,
    /// Handshake sent, awaiting the server's verdict.
    Connecting,
    /// Session established.
    Active,
}

/// Full session state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum SessionState {
    /// No session.
    #[default]
    Disconnected,
    /// Handshake in flight.
    Connecting {
        /// Name sent in the request.
        display_name: String,
        /// Role sent in the request.
        requested_role: String,
        /// When the request was sent.
        started_at: Duration,
    },
    /// Session established.
    Active {
        /// Player id assigned by the server.
        player_id: PlayerId,
        /// Opaque session token.
        session_token: String,
    },
}

impl SessionState {
    /// Returns the phase of this state.
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        match self {
            Self::Disconnected => SessionPhase::Disconnected,
            Self::Connecting { .. } => SessionPhase::Connecting,
            Self::Active { .. } => SessionPhase::Active,
        }
    }
}

/// Why a session ended (or never started).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// The server refused the connect request.
    HandshakeRejected(String),
    /// No connect response arrived within the handshake window.
    HandshakeTimeout,
    /// Nothing was received for longer than the watchdog threshold.
    ConnectionTimeout,
    /// The local side asked to disconnect.
    LocalRequest,
}

/// A state transition, reported exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionChange {
    /// Phase before the transition.
    pub from: SessionPhase,
    /// Phase after the transition.
    pub to: SessionPhase,
    /// Set when the transition ends in `Disconnected`.
    pub reason: Option<DisconnectReason>,
}

/// Session timing configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// How long to wait for a connect response.
    pub handshake: Duration,
    /// Maximum silence on an active session.
    pub watchdog: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        Self {
            handshake: Duration::from_millis(5_000),
            watchdog: Duration::from_millis(10_000),
        }
    }
}

/// The session state machine. Transitions are its only mutators.
#[derive(Debug)]
pub struct SessionMachine {
    state: SessionState,
    timeouts: SessionTimeouts,
    last_received: Duration,
}

impl SessionMachine {
    /// Creates a disconnected session.
    #[must_use]
    pub fn new(timeouts: SessionTimeouts) -> Self {
        Self {
            state: SessionState::Disconnected,
            timeouts,
            last_received: Duration::ZERO,
        }
    }

    /// Returns the current state.
    #[inline]
    #[must_use]
    pub const fn state(&self) -> &SessionState {
        &self.state
    }

    /// Returns the current phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    /// Returns the player id and token if the session is active.
    pub fn require_active(&self) -> Result<(PlayerId, &str), SessionError> {
        match &self.state {
            SessionState::Active {
                player_id,
                session_token,
            } => Ok((*player_id, session_token.as_str())),
            _ => Err(SessionError::NotConnected),
        }
    }

    /// Starts a handshake. Legal only from `Disconnected`.
    ///
    /// Returns the request to send; the caller owns the I/O.
    pub fn connect(
        &mut self,
        display_name: &str,
        requested_role: &str,
        now: Duration,
    ) -> Result<(ConnectRequest, SessionChange), SessionError> {
        if self.phase() != SessionPhase::Disconnected {
            return Err(SessionError::IllegalTransition {
                action: "connect",
                state: self.phase(),
            });
        }

        let request = ConnectRequest {
            display_name: display_name.to_owned(),
            requested_role: requested_role.to_owned(),
        };
        let change = self.transition(
            SessionState::Connecting {
                display_name: request.display_name.clone(),
                requested_role: request.requested_role.clone(),
                started_at: now,
            },
            None,
        );
        tracing::info!(display_name, requested_role, "handshake started");
        Ok((request, change))
    }

    /// Applies the server's handshake verdict.
    ///
    /// Responses outside `Connecting` (late duplicates, replays) are ignored.
    pub fn on_connect_response(
        &mut self,
        response: &ConnectResponse,
        now: Duration,
    ) -> Option<SessionChange> {
        if self.phase() != SessionPhase::Connecting {
            tracing::warn!(
                phase = ?self.phase(),
                "ignoring connect response outside handshake"
            );
            return None;
        }

        if response.success {
            self.last_received = now;
            tracing::info!(player_id = response.player_id, "session active");
            Some(self.transition(
                SessionState::Active {
                    player_id: response.player_id,
                    session_token: response.session_token.clone(),
                },
                None,
            ))
        } else {
            tracing::warn!(reason = %response.reason, "handshake rejected");
            Some(self.transition(
                SessionState::Disconnected,
                Some(DisconnectReason::HandshakeRejected(response.reason.clone())),
            ))
        }
    }

    /// Records that a datagram arrived (feeds the watchdog).
    #[inline]
    pub fn on_datagram(&mut self, now: Duration) {
        if now > self.last_received {
            self.last_received = now;
        }
    }

    /// Checks the handshake deadline and the watchdog.
    ///
    /// Call once per simulation tick.
    pub fn poll(&mut self, now: Duration) -> Option<SessionChange> {
        match &self.state {
            SessionState::Connecting { started_at, .. }
                if now.saturating_sub(*started_at) >= self.timeouts.handshake =>
            {
                tracing::warn!(timeout = ?self.timeouts.handshake, "handshake timed out");
                Some(self.transition(
                    SessionState::Disconnected,
                    Some(DisconnectReason::HandshakeTimeout),
                ))
            }
            SessionState::Active { .. }
                if now.saturating_sub(self.last_received) > self.timeouts.watchdog =>
            {
                tracing::warn!(
                    silence = ?now.saturating_sub(self.last_received),
                    "connection watchdog expired"
                );
                Some(self.transition(
                    SessionState::Disconnected,
                    Some(DisconnectReason::ConnectionTimeout),
                ))
            }
            _ => None,
        }
    }

    /// Local disconnect request. Legal from `Connecting` and `Active`.
    pub fn disconnect(&mut self) -> Result<SessionChange, SessionError> {
        if self.phase() == SessionPhase::Disconnected {
            return Err(SessionError::NotConnected);
        }
        tracing::info!(phase = ?self.phase(), "local disconnect");
        Ok(self.transition(
            SessionState::Disconnected,
            Some(DisconnectReason::LocalRequest),
        ))
    }

    fn transition(
        &mut self,
        next: SessionState,
        reason: Option<DisconnectReason>,
    ) -> SessionChange {
        let from = self.phase();
        let to = next.phase();
        debug_assert!(is_legal_edge(from, to), "illegal edge {from:?} -> {to:?}");
        self.state = next;
        SessionChange { from, to, reason }
    }
}

/// The only edges the machine may take.
#[must_use]
pub const fn is_legal_edge(from: SessionPhase, to: SessionPhase) -> bool {
    matches!(
        (from, to),
        (SessionPhase::Disconnected, SessionPhase::Connecting)
            | (SessionPhase::Connecting, SessionPhase::Active | SessionPhase::Disconnected)
            | (SessionPhase::Active, SessionPhase::Disconnected)
    )
}
