//! # Input Sequencer
//!
//! Produces one sequenced input frame per simulation tick, predicts its
//! movement, and keeps it until the server acknowledges it.
//!
//! The pending ring is ordered by sequence. Acknowledgments always cover a
//! contiguous prefix, so acknowledging is a front drain.

use std::collections::VecDeque;
use std::time::Duration;

use ghostline_shared::Vec2;

use super::movement::MovementModel;
use super::{LocalEntity, LocalInput};
use crate::protocol::{
    next_sequence, sequence_greater_than, sequence_less_or_equal, InputFrame, SequenceNumber,
};

/// Smoothing factor for the round-trip estimate.
const RTT_SMOOTHING: f32 = 0.1;

/// An input frame retained for replay.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PendingInputEntry {
    /// The frame as sent.
    pub frame: InputFrame,
    /// Simulation step the frame was applied with.
    pub delta_time: f32,
    /// Predicted position after applying the frame.
    pub predicted_position_after: Vec2,
    /// When the frame was produced (client epoch).
    pub sent_at: Duration,
}

/// The pending ring overflowed: acknowledgments are not keeping up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PacketLossReport {
    /// Ring capacity at the time of overflow.
    pub capacity: usize,
    /// First sequence evicted without acknowledgment.
    pub first_evicted: SequenceNumber,
}

/// Sequenced input producer with a bounded pending ring.
#[derive(Debug)]
pub struct InputSequencer {
    pending: VecDeque<PendingInputEntry>,
    capacity: usize,
    movement: MovementModel,
    next: SequenceNumber,
    last_acked: SequenceNumber,
    session_start: Duration,
    overflowing: bool,
    loss_report: Option<PacketLossReport>,
    evicted_total: u64,
    rtt: Option<Duration>,
}

impl InputSequencer {
    /// Creates a sequencer. A zero capacity is raised to 1.
    #[must_use]
    pub fn new(capacity: usize, movement: MovementModel) -> Self {
        let capacity = capacity.max(1);
        Self {
            pending: VecDeque::with_capacity(capacity),
            capacity,
            movement,
            next: 1,
            last_acked: 0,
            session_start: Duration::ZERO,
            overflowing: false,
            loss_report: None,
            evicted_total: 0,
            rtt: None,
        }
    }

    /// Resets sequencing for a new session starting at `now`.
    pub fn begin_session(&mut self, now: Duration) {
        self.pending.clear();
        self.next = 1;
        self.last_acked = 0;
        self.session_start = now;
        self.overflowing = false;
        self.loss_report = None;
        self.rtt = None;
    }

    /// Produces the frame for this tick and applies its movement to `entity`.
    pub fn tick(
        &mut self,
        input: &LocalInput,
        delta_time: f32,
        now: Duration,
        entity: &mut LocalEntity,
    ) -> InputFrame {
        let sequence = self.next;
        self.next = next_sequence(sequence);

        let frame = InputFrame {
            sequence,
            ack_sequence: self.last_acked,
            client_time: now.saturating_sub(self.session_start).as_secs_f32(),
            move_vector: input.move_vector.clamp_length_one(),
            sprinting: input.sprinting,
            aim_angle: input.aim_angle,
            action_flags: input.action_flags,
        };

        entity.position = self.movement.apply(entity.position, &frame, delta_time);
        self.push(PendingInputEntry {
            frame,
            delta_time,
            predicted_position_after: entity.position,
            sent_at: now,
        });

        frame
    }

    fn push(&mut self, entry: PendingInputEntry) {
        if self.pending.len() >= self.capacity {
            if let Some(evicted) = self.pending.pop_front() {
                self.evicted_total += 1;
                if !self.overflowing {
                    self.overflowing = true;
                    self.loss_report = Some(PacketLossReport {
                        capacity: self.capacity,
                        first_evicted: evicted.frame.sequence,
                    });
                    tracing::warn!(
                        capacity = self.capacity,
                        sequence = evicted.frame.sequence,
                        "pending input ring overflowed, evicting unacknowledged input"
                    );
                }
            }
        }
        self.pending.push_back(entry);
    }

    /// Drops every pending entry with `sequence <= ack`.
    ///
    /// Returns the number removed. Acks older than the latest one remove
    /// nothing.
    pub fn on_acknowledged(&mut self, ack: SequenceNumber) -> usize {
        self.acknowledge(ack).0
    }

    /// Like [`on_acknowledged`](Self::on_acknowledged), also sampling the
    /// round-trip time from the acknowledged frame's send time.
    pub fn on_acknowledged_at(&mut self, ack: SequenceNumber, now: Duration) -> usize {
        let (removed, newest) = self.acknowledge(ack);
        if let Some(entry) = newest.filter(|e| e.frame.sequence == ack) {
            self.sample_rtt(now.saturating_sub(entry.sent_at));
        }
        removed
    }

    fn acknowledge(&mut self, ack: SequenceNumber) -> (usize, Option<PendingInputEntry>) {
        if ack == 0 {
            return (0, None);
        }
        if self.last_acked == 0 || sequence_greater_than(ack, self.last_acked) {
            self.last_acked = ack;
        }

        let mut removed = 0;
        let mut newest = None;
        while let Some(front) = self.pending.front() {
            if !sequence_less_or_equal(front.frame.sequence, ack) {
                break;
            }
            newest = self.pending.pop_front();
            removed += 1;
        }

        if self.overflowing && self.pending.len() < self.capacity {
            tracing::debug!(pending = self.pending.len(), "pending input ring recovered");
            self.overflowing = false;
        }
        (removed, newest)
    }

    fn sample_rtt(&mut self, sample: Duration) {
        self.rtt = Some(match self.rtt {
            None => sample,
            Some(current) => current.mul_f32(1.0 - RTT_SMOOTHING) + sample.mul_f32(RTT_SMOOTHING),
        });
    }

    /// Pending entries, oldest first.
    pub fn pending_inputs(&self) -> impl ExactSizeIterator<Item = &PendingInputEntry> + '_ {
        self.pending.iter()
    }

    /// Replays every pending entry from `origin`.
    ///
    /// Rewrites each entry's predicted position and returns the final position
    /// and the number of entries replayed.
    pub fn replay_from(&mut self, origin: Vec2) -> (Vec2, usize) {
        let mut position = origin;
        for entry in &mut self.pending {
            position = self.movement.apply(position, &entry.frame, entry.delta_time);
            entry.predicted_position_after = position;
        }
        (position, self.pending.len())
    }

    /// Takes the overflow report, once per overflow episode.
    pub fn take_packet_loss(&mut self) -> Option<PacketLossReport> {
        self.loss_report.take()
    }

    /// Number of pending entries.
    #[inline]
    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ring capacity.
    #[inline]
    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    /// Highest sequence acknowledged so far (0 if none).
    #[inline]
    #[must_use]
    pub const fn last_acknowledged(&self) -> SequenceNumber {
        self.last_acked
    }

    /// Total entries evicted without acknowledgment.
    #[inline]
    #[must_use]
    pub const fn evicted_total(&self) -> u64 {
        self.evicted_total
    }

    /// Smoothed round-trip estimate, once at least one sample exists.
    #[inline]
    #[must_use]
    pub const fn rtt(&self) -> Option<Duration> {
        self.rtt
    }

    /// Movement model used for prediction and replay.
    #[inline]
    #[must_use]
    pub const fn movement(&self) -> &MovementModel {
        &self.movement
    }
}
