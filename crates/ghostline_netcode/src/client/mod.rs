//! # Sync Client
//!
//! The single-threaded simulation loop that wires the protocol, session,
//! prediction and interpolation together.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        SYNC CLIENT                          │
//! ├─────────────────────────────────────────────────────────────┤
//! │  transport queue ──► decode ──► dispatch ──┬──► session     │
//! │                                            ├──► reconciler  │
//! │                                            └──► interpolator│
//! │                                                             │
//! │  input provider ──► sequencer ──► encode ──► transport      │
//! │                                                             │
//! │  local view / remote views / events ──► presentation        │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! All game state is mutated from `tick`, on the caller's thread. The only
//! state shared with another thread is the transport's inbound queue.

mod events;
mod traits;

pub use events::{ClientEvent, ClientStats};
pub use traits::{InputProvider, LocalView, Presentation, RemoteView};

use std::time::Duration;

use crate::config::ClientConfig;
use crate::error::{ClientError, ConfigError, DecodeError};
use crate::interpolation::{EntityId, RemoteEntitySnapshot, RemoteInterpolator, ServerClock};
use crate::prediction::{
    AuthoritativeSnapshot, InputSequencer, LocalEntity, ReconciliationResult, Reconciler,
};
use crate::protocol::{dispatch, Envelope, Message, WireWriter, WorldSnapshot};
use crate::session::{DisconnectReason, SessionChange, SessionMachine, SessionPhase};
use crate::transport::Transport;

/// Client-side synchronization loop.
///
/// Built from an explicit context: configuration plus the transport, input
/// provider and presentation collaborators.
pub struct SyncClient<T, I, P> {
    config: ClientConfig,
    transport: T,
    input: I,
    presentation: P,
    session: SessionMachine,
    sequencer: InputSequencer,
    reconciler: Reconciler,
    interpolator: RemoteInterpolator,
    clock: ServerClock,
    local: LocalEntity,
    corrected_this_tick: bool,
    last_full_update: Option<f64>,
    writer: WireWriter,
    stats: ClientStats,
}

impl<T, I, P> SyncClient<T, I, P>
where
    T: Transport,
    I: InputProvider,
    P: Presentation,
{
    /// Creates a disconnected client.
    pub fn new(
        config: ClientConfig,
        transport: T,
        input: I,
        presentation: P,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            session: SessionMachine::new(config.session.timeouts()),
            sequencer: InputSequencer::new(
                config.prediction.pending_capacity,
                config.prediction.movement,
            ),
            reconciler: Reconciler::new(config.prediction.reconciliation_threshold),
            interpolator: RemoteInterpolator::new(config.interpolation),
            clock: ServerClock::default(),
            local: LocalEntity::default(),
            corrected_this_tick: false,
            last_full_update: None,
            writer: WireWriter::new(),
            stats: ClientStats::default(),
            config,
            transport,
            input,
            presentation,
        })
    }

    /// Starts the handshake.
    ///
    /// A send failure is returned, but the session stays in `Connecting` and
    /// times out normally.
    pub fn connect(
        &mut self,
        display_name: &str,
        requested_role: &str,
        now: Duration,
    ) -> Result<(), ClientError> {
        let (request, change) = self.session.connect(display_name, requested_role, now)?;
        self.apply_change(change);
        self.send_message(&Message::ConnectRequest(request), None, now)
    }

    /// Ends the session and closes the transport.
    pub fn disconnect(&mut self) -> Result<(), ClientError> {
        let change = self.session.disconnect()?;
        self.apply_change(change);
        Ok(())
    }

    /// Sends a gameplay message. Rejected locally unless the session is active.
    pub fn send(&mut self, message: &Message, now: Duration) -> Result<(), ClientError> {
        let (_, token) = self.session.require_active()?;
        let origin = Some(token.to_owned());
        self.send_message(message, origin, now)
    }

    /// Runs one simulation tick.
    ///
    /// 1. Drains every queued datagram
    /// 2. Checks session timeouts
    /// 3. Sends one input frame if active
    /// 4. Publishes local and remote views
    /// 5. Reports departed entities
    pub fn tick(&mut self, now: Duration) {
        self.corrected_this_tick = false;

        while let Some(datagram) = self.transport.try_receive() {
            self.handle_datagram(&datagram, now);
        }

        if let Some(change) = self.session.poll(now) {
            self.apply_change(change);
        }

        if self.session.phase() == SessionPhase::Active {
            self.send_input(now);
        }

        self.publish(now);

        for id in self.interpolator.collect_departed(now) {
            tracing::debug!(entity = id, "remote entity absent too long");
            self.presentation.on_event(ClientEvent::EntityRemoved(id));
        }
    }

    fn send_input(&mut self, now: Duration) {
        let input = self.input.sample();
        let frame = self
            .sequencer
            .tick(&input, self.config.tick_seconds(), now, &mut self.local);

        match self.send(&Message::Input(frame), now) {
            Ok(()) => self.stats.inputs_sent += 1,
            Err(e) => tracing::warn!(sequence = frame.sequence, error = %e, "input frame not sent"),
        }

        if let Some(report) = self.sequencer.take_packet_loss() {
            self.presentation
                .on_event(ClientEvent::SustainedPacketLoss(report));
        }
    }

    fn send_message(
        &mut self,
        message: &Message,
        origin: Option<String>,
        now: Duration,
    ) -> Result<(), ClientError> {
        let sent_at_ms = u64::try_from(now.as_millis()).unwrap_or(u64::MAX);
        let result = Envelope::from_message(message, origin, sent_at_ms)
            .and_then(|envelope| {
                self.writer.reset();
                envelope.encode_into(&mut self.writer)
            })
            .map_err(ClientError::from)
            .and_then(|()| {
                self.transport
                    .send(self.writer.as_slice())
                    .map_err(ClientError::from)
            });

        if let Err(e) = &result {
            self.stats.send_failures += 1;
            tracing::warn!(kind = ?message.kind(), error = %e, "send failed");
        }
        result
    }

    fn handle_datagram(&mut self, datagram: &[u8], now: Duration) {
        self.stats.datagrams_received += 1;

        let envelope = match Envelope::decode(datagram) {
            Ok(envelope) => envelope,
            Err(e) => {
                self.stats.malformed_dropped += 1;
                tracing::warn!(len = datagram.len(), error = %e, "dropping malformed datagram");
                return;
            }
        };
        self.session.on_datagram(now);

        let message = match dispatch(&envelope) {
            Ok(message) => message,
            Err(DecodeError::UnknownKind(kind)) => {
                self.stats.unknown_dropped += 1;
                tracing::warn!(kind, "dropping datagram of unknown kind");
                return;
            }
            Err(e) => {
                self.stats.malformed_dropped += 1;
                tracing::warn!(error = %e, "dropping undecodable payload");
                return;
            }
        };

        self.route(message, now);
    }

    fn route(&mut self, message: Message, now: Duration) {
        match message {
            Message::ConnectResponse(response) => {
                if let Some(change) = self.session.on_connect_response(&response, now) {
                    if change.to == SessionPhase::Active {
                        self.begin_session(now);
                    }
                    self.apply_change(change);
                } else {
                    self.stats.unexpected_dropped += 1;
                }
            }
            Message::Snapshot(snapshot) => self.handle_snapshot(&snapshot, now),
            Message::Chat(chat) => self.presentation.on_event(ClientEvent::Chat(chat)),
            Message::Combat(combat) => self.presentation.on_event(ClientEvent::Combat(combat)),
            Message::Lobby(lobby) => self.presentation.on_event(ClientEvent::Lobby(lobby)),
            Message::Error(notice) => {
                tracing::warn!(code = notice.code, text = %notice.message, "server error notice");
                self.presentation.on_event(ClientEvent::ServerError(notice));
            }
            Message::ConnectRequest(_) | Message::Input(_) => {
                self.stats.unexpected_dropped += 1;
                tracing::warn!(kind = ?message.kind(), "dropping client-bound copy of a server-bound message");
            }
        }
    }

    fn begin_session(&mut self, now: Duration) {
        self.sequencer.begin_session(now);
        self.local = LocalEntity::default();
        self.reconciler.reset();
        self.clock.reset();
        self.last_full_update = None;
    }

    fn handle_snapshot(&mut self, snapshot: &WorldSnapshot, now: Duration) {
        let Ok((player_id, _)) = self.session.require_active() else {
            self.stats.unexpected_dropped += 1;
            tracing::debug!("dropping snapshot outside an active session");
            return;
        };
        if !snapshot.server_time.is_finite() {
            self.stats.malformed_dropped += 1;
            tracing::warn!("dropping snapshot with non-finite server time");
            return;
        }

        self.stats.snapshots_applied += 1;
        self.clock.observe(snapshot.server_time, now);

        let authoritative = snapshot.entity(player_id).map(|entity| {
            AuthoritativeSnapshot::from_entity(entity, snapshot.server_time, snapshot.ack_sequence)
        });
        // A rejected local block must not prune pending inputs.
        if authoritative.map_or(true, |local| local.is_valid()) {
            self.sequencer.on_acknowledged_at(snapshot.ack_sequence, now);
        }
        if let Some(local) = authoritative {
            let result = self
                .reconciler
                .reconcile(&mut self.local, &local, &mut self.sequencer);
            self.record_reconciliation(result);
        }

        for entity in snapshot.entities.iter().filter(|e| e.entity_id != player_id) {
            if let Some(id) = self
                .interpolator
                .insert(RemoteEntitySnapshot::from_entity(entity, snapshot.server_time), now)
            {
                tracing::debug!(entity = id, "remote entity added");
                self.presentation.on_event(ClientEvent::EntityAdded(id));
            }
        }

        if snapshot.full_update
            && self
                .last_full_update
                .map_or(true, |last| snapshot.server_time > last)
        {
            self.last_full_update = Some(snapshot.server_time);
            let present: Vec<EntityId> = snapshot
                .entities
                .iter()
                .map(|e| e.entity_id)
                .filter(|&id| id != player_id)
                .collect();
            for id in self
                .interpolator
                .apply_full_update(&present, snapshot.server_time)
            {
                tracing::debug!(entity = id, "remote entity omitted from full update");
                self.presentation.on_event(ClientEvent::EntityRemoved(id));
            }
        }
    }

    fn record_reconciliation(&mut self, result: ReconciliationResult) {
        match result {
            ReconciliationResult::Accepted { .. } => {}
            ReconciliationResult::Corrected { .. } => {
                self.stats.corrections += 1;
                self.corrected_this_tick = true;
            }
            ReconciliationResult::Rejected => self.stats.rejected_snapshots += 1,
            ReconciliationResult::Stale => self.stats.stale_snapshots += 1,
        }
    }

    fn publish(&mut self, now: Duration) {
        if self.session.phase() == SessionPhase::Active {
            self.presentation.present_local(&LocalView {
                predicted_position: self.local.position,
                health: self.local.health,
                max_health: self.local.max_health,
                correction_occurred: self.corrected_this_tick,
            });
        }

        let Some(server_now) = self.clock.server_time(now) else {
            return;
        };
        let views: Vec<RemoteView> = self
            .interpolator
            .render_all(server_now)
            .into_iter()
            .map(|(entity_id, state)| RemoteView {
                entity_id,
                render_position: state.position,
                health: state.health,
            })
            .collect();
        self.presentation.present_remote(&views);
    }

    fn apply_change(&mut self, change: SessionChange) {
        let ended = change.to == SessionPhase::Disconnected;
        let close_transport = matches!(
            change.reason,
            Some(DisconnectReason::ConnectionTimeout | DisconnectReason::LocalRequest)
        );
        let was_active = change.from == SessionPhase::Active;

        self.presentation
            .on_event(ClientEvent::SessionStateChanged(change));

        if ended && was_active {
            let departed: Vec<EntityId> = self.interpolator.entity_ids().collect();
            self.interpolator.clear();
            for id in departed {
                self.presentation.on_event(ClientEvent::EntityRemoved(id));
            }
        }
        if close_transport {
            self.transport.close();
        }
    }

    /// Session state machine.
    #[inline]
    #[must_use]
    pub const fn session(&self) -> &SessionMachine {
        &self.session
    }

    /// Current session phase.
    #[inline]
    #[must_use]
    pub const fn phase(&self) -> SessionPhase {
        self.session.phase()
    }

    /// Predicted local entity.
    #[inline]
    #[must_use]
    pub const fn local_entity(&self) -> &LocalEntity {
        &self.local
    }

    /// Input sequencer (pending inputs, RTT).
    #[inline]
    #[must_use]
    pub const fn sequencer(&self) -> &InputSequencer {
        &self.sequencer
    }

    /// Remote interpolator.
    #[inline]
    #[must_use]
    pub const fn interpolator(&self) -> &RemoteInterpolator {
        &self.interpolator
    }

    /// Counters.
    #[inline]
    #[must_use]
    pub const fn stats(&self) -> &ClientStats {
        &self.stats
    }

    /// Smoothed round-trip estimate.
    #[inline]
    #[must_use]
    pub const fn rtt(&self) -> Option<Duration> {
        self.sequencer.rtt()
    }

    /// Configuration in use.
    #[inline]
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Transport.
    #[inline]
    #[must_use]
    pub const fn transport(&self) -> &T {
        &self.transport
    }

    /// Transport, mutably.
    #[inline]
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Presentation collaborator.
    #[inline]
    #[must_use]
    pub const fn presentation(&self) -> &P {
        &self.presentation
    }

    /// Presentation collaborator, mutably.
    #[inline]
    pub fn presentation_mut(&mut self) -> &mut P {
        &mut self.presentation
    }
}
