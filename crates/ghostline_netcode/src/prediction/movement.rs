//! Deterministic movement step shared by prediction and replay.

use ghostline_shared::Vec2;
use serde::{Deserialize, Serialize};

use crate::protocol::InputFrame;

/// Kinematic movement model: `position + direction * speed * dt`.
///
/// The same model drives the initial prediction and every replay, so a replay
/// from the same origin reproduces the same positions.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MovementModel {
    /// Walking speed in world units per second.
    pub base_speed: f32,
    /// Speed factor while sprinting.
    pub sprint_multiplier: f32,
}

impl MovementModel {
    /// Creates a model.
    #[must_use]
    pub const fn new(base_speed: f32, sprint_multiplier: f32) -> Self {
        Self {
            base_speed,
            sprint_multiplier,
        }
    }

    /// Effective speed for the sprint state.
    #[inline]
    #[must_use]
    pub fn speed(&self, sprinting: bool) -> f32 {
        if sprinting {
            self.base_speed * self.sprint_multiplier
        } else {
            self.base_speed
        }
    }

    /// Applies one frame of movement.
    #[must_use]
    pub fn apply(&self, position: Vec2, frame: &InputFrame, delta_time: f32) -> Vec2 {
        let direction = frame.move_vector.clamp_length_one();
        if !direction.is_finite() || !delta_time.is_finite() || delta_time <= 0.0 {
            return position;
        }
        position + direction * (self.speed(frame.sprinting) * delta_time)
    }
}

impl Default for MovementModel {
    fn default() -> Self {
        Self::new(5.0, 2.0)
    }
}
