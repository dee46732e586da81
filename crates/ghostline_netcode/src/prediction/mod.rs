//! # Client-Side Prediction
//!
//! Local input is applied immediately and corrected later against the
//! server's authoritative state.
//!
//! ## How It Works
//!
//! 1. Each simulation tick the sequencer stamps one input frame
//! 2. The frame's movement is applied to the local entity at once
//! 3. The frame is kept in the pending ring until the server acknowledges it
//! 4. When a snapshot disagrees beyond the threshold, the reconciler snaps to
//!    the server position and replays everything still pending
//!
//! ```text
//! Input:      [1] [2] [3] [4] [5]
//!              │   │   │   │   │
//! Prediction: [P1][P2][P3][P4][P5]
//!                      │
//! Server Ack: ─────────[S3]
//!                      │
//! Reconcile:  drop [1..=3], compare P5 with S3
//!             if off: snap to S3, replay [4,5]
//! ```

mod movement;
mod reconciliation;
mod sequencer;

pub use movement::MovementModel;
pub use reconciliation::{AuthoritativeSnapshot, ReconciliationResult, Reconciler};
pub use sequencer::{InputSequencer, PacketLossReport, PendingInputEntry};

use ghostline_shared::Vec2;

use crate::protocol::ActionFlags;

/// One tick's worth of local control state, read from the input provider.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct LocalInput {
    /// Desired movement direction. Longer than 1 is normalized.
    pub move_vector: Vec2,
    /// Sprint held.
    pub sprinting: bool,
    /// Aim direction in radians.
    pub aim_angle: f32,
    /// Held action buttons.
    pub action_flags: ActionFlags,
}

/// The locally controlled entity's predicted state.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalEntity {
    /// Predicted position.
    pub position: Vec2,
    /// Health (authoritative only).
    pub health: f32,
    /// Maximum health (authoritative only).
    pub max_health: f32,
}

impl LocalEntity {
    /// Creates an entity at full health.
    #[must_use]
    pub const fn new(position: Vec2, max_health: f32) -> Self {
        Self {
            position,
            health: max_health,
            max_health,
        }
    }
}

impl Default for LocalEntity {
    fn default() -> Self {
        Self::new(Vec2::ZERO, 100.0)
    }
}
