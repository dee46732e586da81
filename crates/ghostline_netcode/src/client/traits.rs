//! # Collaborator Traits
//!
//! The client loop reads input from, and publishes state to, collaborators it
//! does not own.
//!
//! ```text
//! InputProvider ──LocalInput──► SyncClient ──views/events──► Presentation
//! ```

use ghostline_shared::Vec2;

use super::events::ClientEvent;
use crate::interpolation::EntityId;
use crate::prediction::LocalInput;

/// Per-tick snapshot of local controls.
pub trait InputProvider {
    /// Returns this tick's input. Pure read, no side effects expected.
    fn sample(&mut self) -> LocalInput;
}

impl<F> InputProvider for F
where
    F: FnMut() -> LocalInput,
{
    fn sample(&mut self) -> LocalInput {
        self()
    }
}

/// Local entity as it should be drawn this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LocalView {
    /// Predicted position.
    pub predicted_position: Vec2,
    /// Health.
    pub health: f32,
    /// Maximum health.
    pub max_health: f32,
    /// True if a snapshot this tick forced a correction.
    pub correction_occurred: bool,
}

/// Remote entity as it should be drawn this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteView {
    /// Entity id.
    pub entity_id: EntityId,
    /// Interpolated position.
    pub render_position: Vec2,
    /// Interpolated health.
    pub health: f32,
}

/// Receives views and events from the client loop.
pub trait Presentation {
    /// Local entity view, once per tick while a session is active.
    fn present_local(&mut self, view: &LocalView);

    /// Remote entity views, once per tick.
    fn present_remote(&mut self, views: &[RemoteView]);

    /// Discrete event, delivered in the order it occurred.
    fn on_event(&mut self, event: ClientEvent);
}
