//! # Remote Entity Interpolation
//!
//! Renders other participants from a delayed, buffered timeline.
//!
//! ```text
//! server time ─────────────────────────────────────────────►
//! buffer:        [0.8]      [1.0]      [1.2]
//!                              ▲   render_time = now - delay
//!                              └── lerp between 1.0 and 1.2
//! ```
//!
//! Each entity owns a bounded buffer ordered by server time. Out-of-order
//! arrivals are inserted in place. When no pair brackets the render time the
//! entity approaches its latest known state exponentially instead of
//! freezing or teleporting.

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use ghostline_shared::Vec2;
use serde::{Deserialize, Serialize};

use crate::protocol::{EntityState, PlayerId};

/// Remote entity identifier.
pub type EntityId = PlayerId;

/// One buffered observation of a remote entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RemoteEntitySnapshot {
    /// Entity id.
    pub entity_id: EntityId,
    /// Position.
    pub position: Vec2,
    /// Velocity.
    pub velocity: Vec2,
    /// Health.
    pub health: f32,
    /// Server time of the observation, seconds.
    pub server_time: f64,
}

impl RemoteEntitySnapshot {
    /// Builds an observation from an entity block.
    #[must_use]
    pub const fn from_entity(state: &EntityState, server_time: f64) -> Self {
        Self {
            entity_id: state.entity_id,
            position: state.position,
            velocity: state.velocity,
            health: state.health,
            server_time,
        }
    }

    fn is_finite(&self) -> bool {
        self.position.is_finite()
            && self.velocity.is_finite()
            && self.health.is_finite()
            && self.server_time.is_finite()
    }
}

/// What the presentation layer draws for a remote entity.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RenderState {
    /// Rendered position.
    pub position: Vec2,
    /// Rendered health.
    pub health: f32,
}

impl From<&RemoteEntitySnapshot> for RenderState {
    fn from(snapshot: &RemoteEntitySnapshot) -> Self {
        Self {
            position: snapshot.position,
            health: snapshot.health,
        }
    }
}

/// Interpolator tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InterpolationConfig {
    /// Rendering lag behind the newest server time, seconds.
    pub delay: f64,
    /// Snapshots buffered per entity.
    pub buffer_capacity: usize,
    /// Snapshots older than `render_time - stale_after` are evicted, seconds.
    pub stale_after: f64,
    /// An entity unseen for this long is reported departed, seconds.
    pub absence_window: f64,
    /// Exponential approach rate toward the latest state, per second.
    pub approach_rate: f32,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            delay: 0.1,
            buffer_capacity: 32,
            stale_after: 1.0,
            absence_window: 3.0,
            approach_rate: 10.0,
        }
    }
}

#[derive(Debug, Default)]
struct RemoteTrack {
    buffer: VecDeque<RemoteEntitySnapshot>,
    last_seen: Duration,
    rendered: Option<(RenderState, f64)>,
}

impl RemoteTrack {
    fn insert(&mut self, snapshot: RemoteEntitySnapshot, capacity: usize) {
        let index = self
            .buffer
            .partition_point(|s| s.server_time < snapshot.server_time);
        match self.buffer.get_mut(index) {
            Some(existing) if existing.server_time == snapshot.server_time => *existing = snapshot,
            _ => self.buffer.insert(index, snapshot),
        }
        while self.buffer.len() > capacity {
            self.buffer.pop_front();
        }
    }

    fn evict_stale(&mut self, cutoff: f64) {
        while self.buffer.len() > 1 && self.buffer.front().is_some_and(|s| s.server_time < cutoff) {
            self.buffer.pop_front();
        }
    }

    fn bracket(&self, render_time: f64) -> Option<(&RemoteEntitySnapshot, &RemoteEntitySnapshot)> {
        (1..self.buffer.len()).find_map(|i| {
            let from = &self.buffer[i - 1];
            let to = &self.buffer[i];
            (from.server_time <= render_time && render_time <= to.server_time).then_some((from, to))
        })
    }
}

/// Per-entity snapshot buffers and the render-time sampler.
///
/// A departed entity leaves a tombstone holding the server time of its
/// departure. Late observations at or before that time are dropped, so a
/// reordered datagram cannot bring the entity back.
#[derive(Debug)]
pub struct RemoteInterpolator {
    config: InterpolationConfig,
    absence_window: Duration,
    tracks: BTreeMap<EntityId, RemoteTrack>,
    departed: BTreeMap<EntityId, f64>,
}

impl RemoteInterpolator {
    /// Creates an empty interpolator.
    ///
    /// An absence window too large for a `Duration` saturates to
    /// `Duration::MAX`; negative or NaN windows count as zero.
    #[must_use]
    pub fn new(config: InterpolationConfig) -> Self {
        let absence_window = Duration::try_from_secs_f64(config.absence_window.max(0.0))
            .unwrap_or(Duration::MAX);
        Self {
            config,
            absence_window,
            tracks: BTreeMap::new(),
            departed: BTreeMap::new(),
        }
    }

    /// Returns the configuration.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &InterpolationConfig {
        &self.config
    }

    /// Buffers one observation, received at local time `now`.
    ///
    /// Returns the entity id when this is the first observation of it.
    pub fn insert(&mut self, snapshot: RemoteEntitySnapshot, now: Duration) -> Option<EntityId> {
        if !snapshot.is_finite() {
            tracing::warn!(entity = snapshot.entity_id, "dropping non-finite remote snapshot");
            return None;
        }

        if let Some(&departed_at) = self.departed.get(&snapshot.entity_id) {
            if snapshot.server_time <= departed_at {
                tracing::debug!(
                    entity = snapshot.entity_id,
                    server_time = snapshot.server_time,
                    departed_at,
                    "dropping late snapshot of departed entity"
                );
                return None;
            }
            self.departed.remove(&snapshot.entity_id);
        }

        let capacity = self.config.buffer_capacity.max(2);
        let mut added = None;
        let track = self.tracks.entry(snapshot.entity_id).or_insert_with(|| {
            added = Some(snapshot.entity_id);
            RemoteTrack::default()
        });
        track.insert(snapshot, capacity);
        if now > track.last_seen {
            track.last_seen = now;
        }
        added
    }

    /// Samples an entity at `now_server_time` minus the interpolation delay.
    pub fn render(&mut self, entity_id: EntityId, now_server_time: f64) -> Option<RenderState> {
        let config = self.config;
        let track = self.tracks.get_mut(&entity_id)?;
        let render_time = now_server_time - config.delay;
        track.evict_stale(render_time - config.stale_after);

        let state = if let Some((from, to)) = track.bracket(render_time) {
            let span = to.server_time - from.server_time;
            let t = if span > 0.0 {
                ((render_time - from.server_time) / span).clamp(0.0, 1.0) as f32
            } else {
                1.0
            };
            RenderState {
                position: from.position.lerp(to.position, t),
                health: lerp(from.health, to.health, t),
            }
        } else {
            let target = RenderState::from(track.buffer.back()?);
            match track.rendered {
                Some((previous, at)) => {
                    let dt = (render_time - at).max(0.0) as f32;
                    let k = 1.0 - (-config.approach_rate * dt).exp();
                    RenderState {
                        position: previous.position.lerp(target.position, k),
                        health: lerp(previous.health, target.health, k),
                    }
                }
                None => target,
            }
        };

        track.rendered = Some((state, render_time));
        Some(state)
    }

    /// Renders every tracked entity.
    pub fn render_all(&mut self, now_server_time: f64) -> Vec<(EntityId, RenderState)> {
        let ids: Vec<EntityId> = self.tracks.keys().copied().collect();
        ids.into_iter()
            .filter_map(|id| self.render(id, now_server_time).map(|state| (id, state)))
            .collect()
    }

    /// Drops every entity missing from a full update taken at `server_time`.
    /// Returns the departed ids.
    pub fn apply_full_update(&mut self, present: &[EntityId], server_time: f64) -> Vec<EntityId> {
        let mut departed = Vec::new();
        self.tracks.retain(|id, _| {
            let keep = present.contains(id);
            if !keep {
                departed.push(*id);
            }
            keep
        });
        for &id in &departed {
            self.departed.insert(id, server_time);
        }
        // Tombstones older than one absence window are forgotten.
        let horizon = server_time - self.config.absence_window;
        self.departed.retain(|_, &mut at| at >= horizon);
        departed
    }

    /// Drops every entity unseen for longer than the absence window.
    pub fn collect_departed(&mut self, now: Duration) -> Vec<EntityId> {
        let window = self.absence_window;
        let mut departed = Vec::new();
        let mut tombstones = Vec::new();
        self.tracks.retain(|id, track| {
            let keep = now.saturating_sub(track.last_seen) <= window;
            if !keep {
                departed.push(*id);
                if let Some(newest) = track.buffer.back() {
                    tombstones.push((*id, newest.server_time));
                }
            }
            keep
        });
        self.departed.extend(tombstones);
        departed
    }

    /// Removes one entity. Returns true if it was tracked.
    pub fn remove(&mut self, entity_id: EntityId) -> bool {
        self.tracks.remove(&entity_id).is_some()
    }

    /// Drops all entities and tombstones.
    pub fn clear(&mut self) {
        self.tracks.clear();
        self.departed.clear();
    }

    /// Buffered observations of an entity, oldest first.
    pub fn buffered(
        &self,
        entity_id: EntityId,
    ) -> Option<impl ExactSizeIterator<Item = &RemoteEntitySnapshot> + '_> {
        self.tracks.get(&entity_id).map(|track| track.buffer.iter())
    }

    /// Tracked entity ids, ascending.
    pub fn entity_ids(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.tracks.keys().copied()
    }

    /// Number of tracked entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    /// True if no entity is tracked.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}

impl Default for RemoteInterpolator {
    fn default() -> Self {
        Self::new(InterpolationConfig::default())
    }
}

/// Estimates the offset between local monotonic time and server time.
#[derive(Clone, Copy, Debug)]
pub struct ServerClock {
    offset: Option<f64>,
    smoothing: f64,
}

impl ServerClock {
    /// Creates a clock with the given smoothing factor in `(0, 1]`.
    #[must_use]
    pub fn new(smoothing: f64) -> Self {
        Self {
            offset: None,
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
        }
    }

    /// Feeds one server timestamp received at local time `local_now`.
    pub fn observe(&mut self, server_time: f64, local_now: Duration) {
        if !server_time.is_finite() {
            return;
        }
        let sample = server_time - local_now.as_secs_f64();
        self.offset = Some(match self.offset {
            None => sample,
            Some(offset) => offset + (sample - offset) * self.smoothing,
        });
    }

    /// Maps local time into server time, once a sample exists.
    #[must_use]
    pub fn server_time(&self, local_now: Duration) -> Option<f64> {
        self.offset.map(|offset| local_now.as_secs_f64() + offset)
    }

    /// Forgets the estimate.
    pub fn reset(&mut self) {
        self.offset = None;
    }
}

impl Default for ServerClock {
    fn default() -> Self {
        Self::new(0.1)
    }
}

#[inline]
fn lerp(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> InterpolationConfig {
        InterpolationConfig {
            delay: 0.125,
            ..InterpolationConfig::default()
        }
    }

    fn snap(entity_id: EntityId, server_time: f64, x: f32, health: f32) -> RemoteEntitySnapshot {
        RemoteEntitySnapshot {
            entity_id,
            position: Vec2::new(x, -x),
            velocity: Vec2::ZERO,
            health,
            server_time,
        }
    }

    fn times(interp: &RemoteInterpolator, id: EntityId) -> Vec<f64> {
        interp.buffered(id).unwrap().map(|s| s.server_time).collect()
    }

    #[test]
    fn test_out_of_order_insert_is_sorted() {
        let mut interp = RemoteInterpolator::new(config());
        let now = Duration::ZERO;

        assert_eq!(interp.insert(snap(7, 1.0, 0.0, 100.0), now), Some(7));
        assert_eq!(interp.insert(snap(7, 0.8, 0.0, 100.0), now), None);
        assert_eq!(interp.insert(snap(7, 1.2, 0.0, 100.0), now), None);

        assert_eq!(times(&interp, 7), vec![0.8, 1.0, 1.2]);
    }

    #[test]
    fn test_duplicate_time_replaces() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(1, 1.0, 0.0, 100.0), Duration::ZERO);
        interp.insert(snap(1, 1.0, 4.0, 50.0), Duration::ZERO);

        let buffered: Vec<_> = interp.buffered(1).unwrap().copied().collect();
        assert_eq!(buffered, vec![snap(1, 1.0, 4.0, 50.0)]);
    }

    #[test]
    fn test_endpoints_exact_and_midpoint_linear() {
        let mut interp = RemoteInterpolator::new(config());
        let from = snap(3, 1.0, 2.0, 100.0);
        let to = snap(3, 1.5, 6.0, 60.0);
        interp.insert(from, Duration::ZERO);
        interp.insert(to, Duration::ZERO);

        let at_from = interp.render(3, 1.125).unwrap();
        assert_eq!(at_from.position, from.position);
        assert_eq!(at_from.health, from.health);

        let middle = interp.render(3, 1.375).unwrap();
        assert_eq!(middle.position, Vec2::new(4.0, -4.0));
        assert_eq!(middle.health, 80.0);

        let at_to = interp.render(3, 1.625).unwrap();
        assert_eq!(at_to.position, to.position);
        assert_eq!(at_to.health, to.health);
    }

    #[test]
    fn test_fallback_approaches_latest() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(5, 1.0, 0.0, 100.0), Duration::ZERO);

        let first = interp.render(5, 2.0).unwrap();
        assert_eq!(first.position, Vec2::ZERO);

        interp.insert(snap(5, 1.5, 10.0, 100.0), Duration::ZERO);
        let next = interp.render(5, 2.1).unwrap();

        let expected = 10.0 * (1.0 - (-1.0f32).exp());
        assert!((next.position.x - expected).abs() < 1e-3);
        assert!(next.position.x > 0.0 && next.position.x < 10.0);
    }

    #[test]
    fn test_capacity_drops_oldest() {
        let mut interp = RemoteInterpolator::new(InterpolationConfig {
            buffer_capacity: 4,
            ..config()
        });
        for i in 0..6 {
            interp.insert(snap(2, f64::from(i), 0.0, 1.0), Duration::ZERO);
        }
        assert_eq!(times(&interp, 2), vec![2.0, 3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_stale_eviction_keeps_newest() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(4, 1.0, 0.0, 1.0), Duration::ZERO);
        interp.insert(snap(4, 2.0, 0.0, 1.0), Duration::ZERO);

        interp.render(4, 10.0).unwrap();
        assert_eq!(times(&interp, 4), vec![2.0]);
    }

    #[test]
    fn test_full_update_reports_omitted() {
        let mut interp = RemoteInterpolator::new(config());
        for id in [1, 2, 3] {
            interp.insert(snap(id, 1.0, 0.0, 1.0), Duration::ZERO);
        }

        assert_eq!(interp.apply_full_update(&[1, 3], 1.0), vec![2]);
        assert_eq!(interp.entity_ids().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn test_absence_window() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(1, 1.0, 0.0, 1.0), Duration::from_secs(1));
        interp.insert(snap(2, 1.0, 0.0, 1.0), Duration::from_secs(3));

        assert!(interp.collect_departed(Duration::from_secs(4)).is_empty());
        assert_eq!(interp.collect_departed(Duration::from_millis(4_001)), vec![1]);
        assert_eq!(interp.len(), 1);
    }

    #[test]
    fn test_late_snapshot_does_not_revive_departed_entity() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(9, 1.0, 0.0, 1.0), Duration::ZERO);
        assert_eq!(interp.apply_full_update(&[], 2.0), vec![9]);

        assert_eq!(interp.insert(snap(9, 1.5, 0.0, 1.0), Duration::ZERO), None);
        assert_eq!(interp.insert(snap(9, 2.0, 0.0, 1.0), Duration::ZERO), None);
        assert!(interp.is_empty());

        assert_eq!(interp.insert(snap(9, 2.5, 0.0, 1.0), Duration::ZERO), Some(9));
        assert_eq!(times(&interp, 9), vec![2.5]);
    }

    #[test]
    fn test_absent_entity_tombstoned_at_newest_observation() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(4, 1.0, 0.0, 1.0), Duration::ZERO);
        interp.insert(snap(4, 1.2, 0.0, 1.0), Duration::ZERO);
        assert_eq!(interp.collect_departed(Duration::from_secs(10)), vec![4]);

        let late = Duration::from_secs(10);
        assert_eq!(interp.insert(snap(4, 1.1, 0.0, 1.0), late), None);
        assert_eq!(interp.insert(snap(4, 5.0, 0.0, 1.0), late), Some(4));
    }

    #[test]
    fn test_clear_forgets_tombstones() {
        let mut interp = RemoteInterpolator::new(config());
        interp.insert(snap(3, 1.0, 0.0, 1.0), Duration::ZERO);
        interp.apply_full_update(&[], 2.0);
        interp.clear();

        assert_eq!(interp.insert(snap(3, 1.0, 0.0, 1.0), Duration::ZERO), Some(3));
    }

    #[test]
    fn test_huge_absence_window_saturates() {
        let mut interp = RemoteInterpolator::new(InterpolationConfig {
            absence_window: 1e20,
            ..config()
        });
        interp.insert(snap(1, 1.0, 0.0, 1.0), Duration::ZERO);

        assert!(interp.collect_departed(Duration::from_secs(1_000_000)).is_empty());
        assert_eq!(interp.len(), 1);
    }

    #[test]
    fn test_non_finite_snapshot_dropped() {
        let mut interp = RemoteInterpolator::new(config());
        assert_eq!(interp.insert(snap(1, f64::NAN, 0.0, 1.0), Duration::ZERO), None);
        assert!(interp.is_empty());
    }

    #[test]
    fn test_server_clock() {
        let mut clock = ServerClock::new(0.5);
        assert_eq!(clock.server_time(Duration::ZERO), None);

        clock.observe(12.0, Duration::from_secs(2));
        assert_eq!(clock.server_time(Duration::from_secs(3)), Some(13.0));

        clock.observe(15.0, Duration::from_secs(3));
        assert_eq!(clock.server_time(Duration::from_secs(3)), Some(14.0));
    }
}
