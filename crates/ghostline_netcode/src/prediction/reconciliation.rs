//! # Reconciliation Engine
//!
//! Keeps the predicted local entity converged with authoritative state.
//!
//! ```text
//! snapshot ──► validate ──► apply health ──► ack pending prefix
//!                                                │
//!                      error = |predicted - server|
//!                                                │
//!             error <= threshold: keep prediction
//!             error >  threshold: snap to server, replay pending
//! ```
//!
//! Corrections are hard snaps. Blending toward a far-away server position
//! would show as visible lag.

use ghostline_shared::Vec2;

use super::sequencer::InputSequencer;
use super::LocalEntity;
use crate::protocol::{EntityState, SequenceNumber};

/// Authoritative state of the local entity, as carried by one snapshot.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AuthoritativeSnapshot {
    /// Server position.
    pub position: Vec2,
    /// Server velocity.
    pub velocity: Vec2,
    /// Server health.
    pub health: f32,
    /// Server maximum health.
    pub max_health: f32,
    /// Server simulation time, seconds.
    pub server_time: f64,
    /// Last input sequence the server applied.
    pub ack_sequence: SequenceNumber,
}

impl AuthoritativeSnapshot {
    /// Builds a snapshot from the local entity's block in a world snapshot.
    #[must_use]
    pub const fn from_entity(
        state: &EntityState,
        server_time: f64,
        ack_sequence: SequenceNumber,
    ) -> Self {
        Self {
            position: state.position,
            velocity: state.velocity,
            health: state.health,
            max_health: state.max_health,
            server_time,
            ack_sequence,
        }
    }

    /// Rejects non-finite values and negative maximum health.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.health.is_finite()
            && self.max_health.is_finite()
            && self.max_health >= 0.0
            && self.server_time.is_finite()
    }
}

/// Outcome of one reconciliation.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ReconciliationResult {
    /// Prediction within tolerance, position untouched.
    Accepted {
        /// Distance between prediction and server.
        error: f32,
    },
    /// Snapped to the server position and replayed pending inputs.
    Corrected {
        /// Distance between prediction and server before the snap.
        error: f32,
        /// Inputs replayed on top of the server position.
        replayed: usize,
    },
    /// Snapshot failed validation and was dropped.
    Rejected,
    /// Snapshot is older than one already applied and was dropped.
    Stale,
}

impl ReconciliationResult {
    /// True if the predicted position was corrected.
    #[inline]
    #[must_use]
    pub const fn correction_occurred(&self) -> bool {
        matches!(self, Self::Corrected { .. })
    }

    /// Position error, if the snapshot was applied.
    #[must_use]
    pub const fn error(&self) -> Option<f32> {
        match self {
            Self::Accepted { error } | Self::Corrected { error, .. } => Some(*error),
            Self::Rejected | Self::Stale => None,
        }
    }
}

/// Drift detector and corrector.
#[derive(Debug)]
pub struct Reconciler {
    threshold: f32,
    last_server_time: Option<f64>,
    corrections: u64,
}

impl Reconciler {
    /// Creates a reconciler with the given correction threshold (world units).
    #[must_use]
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold: threshold.max(0.0),
            last_server_time: None,
            corrections: 0,
        }
    }

    /// Correction threshold.
    #[inline]
    #[must_use]
    pub const fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Number of corrections applied so far.
    #[inline]
    #[must_use]
    pub const fn corrections(&self) -> u64 {
        self.corrections
    }

    /// Forgets the last applied server time (new session).
    pub fn reset(&mut self) {
        self.last_server_time = None;
    }

    /// Reconciles `entity` against one authoritative snapshot.
    ///
    /// Acknowledges the snapshot's ack sequence on `sequencer` first, so the
    /// replay covers only inputs the server has not seen.
    pub fn reconcile(
        &mut self,
        entity: &mut LocalEntity,
        snapshot: &AuthoritativeSnapshot,
        sequencer: &mut InputSequencer,
    ) -> ReconciliationResult {
        if !snapshot.is_valid() {
            tracing::warn!(?snapshot, "dropping malformed authoritative snapshot");
            return ReconciliationResult::Rejected;
        }
        if self
            .last_server_time
            .is_some_and(|last| snapshot.server_time <= last)
        {
            tracing::debug!(
                server_time = snapshot.server_time,
                "dropping stale authoritative snapshot"
            );
            return ReconciliationResult::Stale;
        }
        self.last_server_time = Some(snapshot.server_time);

        entity.health = snapshot.health;
        entity.max_health = snapshot.max_health;

        sequencer.on_acknowledged(snapshot.ack_sequence);

        let error = entity.position.distance(snapshot.position);
        if error <= self.threshold {
            return ReconciliationResult::Accepted { error };
        }

        let (position, replayed) = sequencer.replay_from(snapshot.position);
        entity.position = position;
        self.corrections += 1;
        tracing::debug!(error, replayed, "prediction corrected");

        ReconciliationResult::Corrected { error, replayed }
    }
}

impl Default for Reconciler {
    fn default() -> Self {
        Self::new(2.0)
    }
}
