//! # Client Configuration
//!
//! Every knob the sync core exposes, loadable from TOML. Reading the file (or
//! the environment) is the launcher's job; the core only parses text it is
//! handed.
//!
//! ```toml
//! tick_rate = 60
//!
//! [session]
//! handshake_timeout_ms = 5000
//! watchdog_timeout_ms = 10000
//!
//! [prediction]
//! pending_capacity = 128
//! reconciliation_threshold = 2.0
//!
//! [interpolation]
//! delay = 0.1
//! ```

use std::time::Duration;

use ghostline_shared::DEFAULT_TICK_RATE;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::interpolation::InterpolationConfig;
use crate::prediction::MovementModel;
use crate::session::SessionTimeouts;
use crate::transport::TransportConfig;

/// Top-level client configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Simulation ticks per second.
    pub tick_rate: u32,
    /// Handshake and watchdog timing.
    pub session: SessionConfig,
    /// Input sequencing and reconciliation.
    pub prediction: PredictionConfig,
    /// Remote entity interpolation.
    pub interpolation: InterpolationConfig,
    /// Socket worker tuning.
    pub transport: TransportConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            tick_rate: DEFAULT_TICK_RATE,
            session: SessionConfig::default(),
            prediction: PredictionConfig::default(),
            interpolation: InterpolationConfig::default(),
            transport: TransportConfig::default(),
        }
    }
}

/// Session timing, in milliseconds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Handshake window.
    pub handshake_timeout_ms: u64,
    /// Maximum silence on an active session.
    pub watchdog_timeout_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            handshake_timeout_ms: 5_000,
            watchdog_timeout_ms: 10_000,
        }
    }
}

impl SessionConfig {
    /// Converts to the state machine's timeouts.
    #[must_use]
    pub const fn timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            handshake: Duration::from_millis(self.handshake_timeout_ms),
            watchdog: Duration::from_millis(self.watchdog_timeout_ms),
        }
    }
}

/// Prediction and reconciliation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictionConfig {
    /// Pending-input ring capacity.
    pub pending_capacity: usize,
    /// Position error (world units) beyond which prediction is corrected.
    pub reconciliation_threshold: f32,
    /// Movement model shared by prediction and replay.
    pub movement: MovementModel,
}

impl Default for PredictionConfig {
    fn default() -> Self {
        Self {
            pending_capacity: 128,
            reconciliation_threshold: 2.0,
            movement: MovementModel::default(),
        }
    }
}

/// Longest accepted remote absence window, seconds.
const MAX_ABSENCE_WINDOW_SECS: f64 = 86_400.0;

impl ClientConfig {
    /// Parses and validates a TOML document. Missing fields take defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        fn invalid(what: &str) -> Result<(), ConfigError> {
            Err(ConfigError::Invalid(what.to_owned()))
        }

        if self.tick_rate == 0 || self.tick_rate > 1_000 {
            return invalid("tick_rate must be in 1..=1000");
        }
        if self.session.handshake_timeout_ms == 0 {
            return invalid("session.handshake_timeout_ms must be positive");
        }
        if self.session.watchdog_timeout_ms == 0 {
            return invalid("session.watchdog_timeout_ms must be positive");
        }
        if self.prediction.pending_capacity == 0 {
            return invalid("prediction.pending_capacity must be positive");
        }
        let threshold = self.prediction.reconciliation_threshold;
        if !threshold.is_finite() || threshold < 0.0 {
            return invalid("prediction.reconciliation_threshold must be finite and >= 0");
        }
        let movement = self.prediction.movement;
        if !movement.base_speed.is_finite()
            || movement.base_speed < 0.0
            || !movement.sprint_multiplier.is_finite()
            || movement.sprint_multiplier < 0.0
        {
            return invalid("prediction.movement speeds must be finite and >= 0");
        }

        let interp = &self.interpolation;
        if !interp.delay.is_finite() || interp.delay < 0.0 {
            return invalid("interpolation.delay must be finite and >= 0");
        }
        if interp.buffer_capacity < 2 {
            return invalid("interpolation.buffer_capacity must be at least 2");
        }
        if !interp.stale_after.is_finite() || interp.stale_after <= 0.0 {
            return invalid("interpolation.stale_after must be positive");
        }
        if !interp.absence_window.is_finite()
            || interp.absence_window <= 0.0
            || interp.absence_window > MAX_ABSENCE_WINDOW_SECS
        {
            return invalid("interpolation.absence_window must be in (0, 86400] seconds");
        }
        if !interp.approach_rate.is_finite() || interp.approach_rate <= 0.0 {
            return invalid("interpolation.approach_rate must be positive");
        }

        if self.transport.read_timeout_ms == 0 {
            return invalid("transport.read_timeout_ms must be positive");
        }
        if self.transport.queue_high_water == 0 {
            return invalid("transport.queue_high_water must be positive");
        }
        Ok(())
    }

    /// Fixed simulation step.
    #[must_use]
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(1) / self.tick_rate.max(1)
    }

    /// Fixed simulation step in seconds.
    #[must_use]
    pub fn tick_seconds(&self) -> f32 {
        1.0 / self.tick_rate.max(1) as f32
    }
}
