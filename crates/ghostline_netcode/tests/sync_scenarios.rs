//! End-to-end client scenarios against a scripted server over an in-memory
//! transport.

use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};
use ghostline_netcode::protocol::{
    ChatEvent, ConnectResponse, EntityState, InputFrame, WorldSnapshot,
};
use ghostline_netcode::{
    ClientConfig, ClientError, ClientEvent, ConfigError, DisconnectReason, Envelope, LocalInput,
    LocalView, Message, MovementModel, Presentation, RemoteView, SessionChange, SessionError,
    SessionPhase, SyncClient, Transport, TransportError,
};
use ghostline_shared::Vec2;

const LOCAL_ID: u32 = 7;
const REMOTE_ID: u32 = 9;
const OTHER_ID: u32 = 11;

// ============================================================================
// Harness
// ============================================================================

struct LoopbackTransport {
    inbound: Receiver<Vec<u8>>,
    outbound: Sender<Vec<u8>>,
    closed: bool,
}

impl Transport for LoopbackTransport {
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.outbound
            .send(datagram.to_vec())
            .map_err(|_| TransportError::Closed)
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

struct ScriptedServer {
    to_client: Sender<Vec<u8>>,
    from_client: Receiver<Vec<u8>>,
}

impl ScriptedServer {
    fn send(&self, message: Message) {
        let bytes = Envelope::from_message(&message, None, 0)
            .unwrap()
            .encode()
            .unwrap();
        self.to_client.send(bytes).unwrap();
    }

    fn send_raw(&self, bytes: Vec<u8>) {
        self.to_client.send(bytes).unwrap();
    }

    fn received(&self) -> Vec<(Envelope, Message)> {
        self.from_client
            .try_iter()
            .map(|bytes| {
                let envelope = Envelope::decode(&bytes).unwrap();
                let message = ghostline_netcode::dispatch(&envelope).unwrap();
                (envelope, message)
            })
            .collect()
    }

    fn inputs(&self) -> Vec<InputFrame> {
        self.received()
            .into_iter()
            .filter_map(|(_, message)| match message {
                Message::Input(frame) => Some(frame),
                _ => None,
            })
            .collect()
    }
}

#[derive(Default)]
struct Recorder {
    events: Vec<ClientEvent>,
    locals: Vec<LocalView>,
    remotes: Vec<Vec<RemoteView>>,
}

impl Recorder {
    fn session_changes(&self) -> Vec<SessionChange> {
        self.events
            .iter()
            .filter_map(|event| match event {
                ClientEvent::SessionStateChanged(change) => Some(change.clone()),
                _ => None,
            })
            .collect()
    }

    fn count(&self, wanted: &ClientEvent) -> usize {
        self.events.iter().filter(|event| *event == wanted).count()
    }
}

impl Presentation for Recorder {
    fn present_local(&mut self, view: &LocalView) {
        self.locals.push(*view);
    }

    fn present_remote(&mut self, views: &[RemoteView]) {
        self.remotes.push(views.to_vec());
    }

    fn on_event(&mut self, event: ClientEvent) {
        self.events.push(event);
    }
}

fn walk_right() -> LocalInput {
    LocalInput {
        move_vector: Vec2::new(1.0, 0.0),
        ..LocalInput::default()
    }
}

type Client = SyncClient<LoopbackTransport, fn() -> LocalInput, Recorder>;

fn ms(value: u64) -> Duration {
    Duration::from_millis(value)
}

fn setup(config: ClientConfig) -> (Client, ScriptedServer) {
    let (to_client, inbound) = unbounded();
    let (outbound, from_client) = unbounded();
    let transport = LoopbackTransport {
        inbound,
        outbound,
        closed: false,
    };
    let input: fn() -> LocalInput = walk_right;
    let client = SyncClient::new(config, transport, input, Recorder::default()).unwrap();
    (
        client,
        ScriptedServer {
            to_client,
            from_client,
        },
    )
}

fn accept() -> Message {
    Message::ConnectResponse(ConnectResponse {
        success: true,
        player_id: LOCAL_ID,
        session_token: "tok-7".into(),
        reason: String::new(),
    })
}

fn connected(config: ClientConfig) -> (Client, ScriptedServer) {
    let (mut client, server) = setup(config);
    client.connect("Ada", "ranger", ms(0)).unwrap();
    server.send(accept());
    client.tick(ms(10));
    assert_eq!(client.phase(), SessionPhase::Active);
    server.received();
    (client, server)
}

fn entity(entity_id: u32, position: Vec2, health: f32) -> EntityState {
    EntityState {
        entity_id,
        position,
        velocity: Vec2::ZERO,
        health,
        max_health: 100.0,
    }
}

fn snapshot(server_time: f64, ack_sequence: u32, entities: Vec<EntityState>) -> Message {
    Message::Snapshot(WorldSnapshot {
        server_time,
        ack_sequence,
        full_update: true,
        entities,
    })
}

// ============================================================================
// Session lifecycle
// ============================================================================

#[test]
fn test_handshake_then_inputs_flow() {
    let (mut client, server) = setup(ClientConfig::default());
    client.connect("Ada", "ranger", ms(0)).unwrap();

    let sent = server.received();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0.origin_id, None);
    assert!(matches!(
        &sent[0].1,
        Message::ConnectRequest(request)
            if request.display_name == "Ada" && request.requested_role == "ranger"
    ));

    server.send(accept());
    client.tick(ms(10));
    client.tick(ms(26));

    let sent = server.received();
    let sequences: Vec<u32> = sent
        .iter()
        .filter_map(|(_, message)| match message {
            Message::Input(frame) => Some(frame.sequence),
            _ => None,
        })
        .collect();
    assert_eq!(sequences, vec![1, 2]);
    assert!(sent
        .iter()
        .all(|(envelope, _)| envelope.origin_id.as_deref() == Some("tok-7")));

    let phases: Vec<_> = client
        .presentation()
        .session_changes()
        .iter()
        .map(|c| (c.from, c.to))
        .collect();
    assert_eq!(
        phases,
        vec![
            (SessionPhase::Disconnected, SessionPhase::Connecting),
            (SessionPhase::Connecting, SessionPhase::Active),
        ]
    );
    assert!(client.local_entity().position.x > 0.0);
}

#[test]
fn test_handshake_timeout_reported_once() {
    let (mut client, server) = setup(ClientConfig::default());
    client.connect("Ada", "ranger", ms(0)).unwrap();

    for t in (16..5_000).step_by(16) {
        client.tick(ms(t));
    }
    assert_eq!(client.phase(), SessionPhase::Connecting);

    client.tick(ms(5_000));
    for t in (5_016..8_000).step_by(16) {
        client.tick(ms(t));
    }

    assert_eq!(client.phase(), SessionPhase::Disconnected);
    let timeouts = client
        .presentation()
        .session_changes()
        .into_iter()
        .filter(|c| c.reason == Some(DisconnectReason::HandshakeTimeout))
        .count();
    assert_eq!(timeouts, 1);
    assert!(!client.transport().closed);
    assert!(server.inputs().is_empty());
}

#[test]
fn test_handshake_rejection_surfaces_reason() {
    let (mut client, server) = setup(ClientConfig::default());
    client.connect("Ada", "ranger", ms(0)).unwrap();
    server.send(Message::ConnectResponse(ConnectResponse {
        success: false,
        player_id: 0,
        session_token: String::new(),
        reason: "lobby full".into(),
    }));
    client.tick(ms(16));

    assert_eq!(client.phase(), SessionPhase::Disconnected);
    let last = client.presentation().session_changes().pop().unwrap();
    assert_eq!(
        last.reason,
        Some(DisconnectReason::HandshakeRejected("lobby full".into()))
    );
}

#[test]
fn test_gameplay_send_requires_active_session() {
    let (mut client, server) = setup(ClientConfig::default());
    let chat = Message::Chat(ChatEvent {
        sender: "Ada".into(),
        text: "hi".into(),
    });

    assert!(matches!(
        client.send(&chat, ms(0)),
        Err(ClientError::Session(SessionError::NotConnected))
    ));
    assert!(server.received().is_empty());
}

#[test]
fn test_watchdog_forces_disconnect_and_closes_transport() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::new(3.0, 4.0), 100.0)]));
    client.tick(ms(20));

    client.tick(ms(10_100));

    assert_eq!(client.phase(), SessionPhase::Disconnected);
    let last = client.presentation().session_changes().pop().unwrap();
    assert_eq!(last.reason, Some(DisconnectReason::ConnectionTimeout));
    assert!(client.transport().closed);
    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityRemoved(REMOTE_ID)),
        1
    );
}

#[test]
fn test_local_disconnect() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)]));
    client.tick(ms(26));

    client.disconnect().unwrap();

    assert_eq!(client.phase(), SessionPhase::Disconnected);
    assert!(client.transport().closed);
    assert_eq!(
        client.presentation().session_changes().pop().unwrap().reason,
        Some(DisconnectReason::LocalRequest)
    );
    assert!(client.interpolator().is_empty());
    assert!(matches!(
        client.disconnect(),
        Err(ClientError::Session(SessionError::NotConnected))
    ));
}

// ============================================================================
// Datagram robustness
// ============================================================================

#[test]
fn test_bad_datagrams_are_dropped_without_teardown() {
    let (mut client, server) = connected(ClientConfig::default());

    server.send_raw(vec![0xFF; 3]);
    let mut unknown = Envelope::from_message(&accept(), None, 0).unwrap();
    unknown.discriminator = 0x42;
    server.send_raw(unknown.encode().unwrap());
    server.send(Message::Chat(ChatEvent {
        sender: "Bo".into(),
        text: "still here".into(),
    }));
    client.tick(ms(26));

    assert_eq!(client.phase(), SessionPhase::Active);
    assert_eq!(client.stats().malformed_dropped, 1);
    assert_eq!(client.stats().unknown_dropped, 1);
    assert_eq!(
        client.presentation().events.last(),
        Some(&ClientEvent::Chat(ChatEvent {
            sender: "Bo".into(),
            text: "still here".into(),
        }))
    );
}

#[test]
fn test_duplicate_connect_response_is_ignored() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(accept());
    client.tick(ms(26));

    assert_eq!(client.phase(), SessionPhase::Active);
    assert_eq!(client.presentation().session_changes().len(), 2);
    assert_eq!(client.stats().unexpected_dropped, 1);
}

// ============================================================================
// Prediction and reconciliation
// ============================================================================

#[test]
fn test_snapshot_correction_replays_pending_inputs() {
    let config = ClientConfig::default();
    let dt = config.tick_seconds();
    let (mut client, server) = connected(config);
    client.tick(ms(26));
    client.tick(ms(42));
    assert_eq!(server.inputs().len(), 2);

    let authority = Vec2::new(50.0, 50.0);
    server.send(snapshot(1.0, 1, vec![entity(LOCAL_ID, authority, 55.0)]));
    client.tick(ms(58));

    let model = MovementModel::default();
    let step = InputFrame {
        move_vector: Vec2::new(1.0, 0.0),
        ..InputFrame::default()
    };
    let mut expected = authority;
    for _ in 0..3 {
        expected = model.apply(expected, &step, dt);
    }

    let local = client.local_entity();
    assert_eq!(local.position, expected);
    assert_eq!(local.health, 55.0);
    assert_eq!(client.stats().corrections, 1);
    assert!(client.presentation().locals.last().unwrap().correction_occurred);

    client.tick(ms(74));
    assert!(!client.presentation().locals.last().unwrap().correction_occurred);
}

#[test]
fn test_accurate_prediction_is_kept() {
    let (mut client, server) = connected(ClientConfig::default());
    client.tick(ms(26));
    let predicted = client.local_entity().position;

    server.send(snapshot(1.0, 2, vec![entity(LOCAL_ID, predicted, 100.0)]));
    client.tick(ms(42));

    assert_eq!(client.stats().corrections, 0);
    assert_eq!(client.sequencer().pending_len(), 1);
    assert!(client.local_entity().position.x > predicted.x);
}

#[test]
fn test_sustained_packet_loss_reported_once() {
    let mut config = ClientConfig::default();
    config.prediction.pending_capacity = 8;
    let (mut client, _server) = connected(config);

    for i in 1..=20u64 {
        client.tick(ms(10 + i * 16));
    }

    let reports = client
        .presentation()
        .events
        .iter()
        .filter(|e| matches!(e, ClientEvent::SustainedPacketLoss(_)))
        .count();
    assert_eq!(reports, 1);
    assert_eq!(client.sequencer().pending_len(), 8);
}

// ============================================================================
// Remote entities
// ============================================================================

#[test]
fn test_remote_entity_lifecycle() {
    let (mut client, server) = connected(ClientConfig::default());

    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::new(1.0, 1.0), 90.0)]));
    client.tick(ms(26));
    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityAdded(REMOTE_ID)),
        1
    );
    let views = client.presentation().remotes.last().unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views[0].entity_id, REMOTE_ID);
    assert_eq!(views[0].render_position, Vec2::new(1.0, 1.0));

    server.send(snapshot(1.5, 0, vec![entity(REMOTE_ID, Vec2::new(2.0, 1.0), 90.0)]));
    client.tick(ms(42));
    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityAdded(REMOTE_ID)),
        1
    );

    server.send(snapshot(2.0, 0, Vec::new()));
    client.tick(ms(58));
    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityRemoved(REMOTE_ID)),
        1
    );
    assert!(client.interpolator().is_empty());
}

#[test]
fn test_silent_remote_entity_departs_after_absence_window() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)]));
    client.tick(ms(26));

    let mut t = 26;
    while t < 3_100 {
        t += 16;
        server.send(Message::Snapshot(WorldSnapshot {
            server_time: 1.0 + t as f64 / 1_000.0,
            ..WorldSnapshot::default()
        }));
        client.tick(ms(t));
    }

    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityRemoved(REMOTE_ID)),
        1
    );
    assert_eq!(client.phase(), SessionPhase::Active);
}

#[test]
fn test_late_partial_snapshot_does_not_revive_departed_entity() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)]));
    client.tick(ms(26));
    server.send(snapshot(2.0, 0, Vec::new()));
    client.tick(ms(42));

    server.send(Message::Snapshot(WorldSnapshot {
        server_time: 1.5,
        ack_sequence: 0,
        full_update: false,
        entities: vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)],
    }));
    client.tick(ms(58));

    let recorder = client.presentation();
    assert_eq!(recorder.count(&ClientEvent::EntityAdded(REMOTE_ID)), 1);
    assert_eq!(recorder.count(&ClientEvent::EntityRemoved(REMOTE_ID)), 1);
    assert!(client.interpolator().is_empty());
}

#[test]
fn test_reordered_older_full_update_does_not_evict() {
    let (mut client, server) = connected(ClientConfig::default());
    server.send(snapshot(
        2.0,
        0,
        vec![
            entity(REMOTE_ID, Vec2::ZERO, 100.0),
            entity(OTHER_ID, Vec2::new(5.0, 5.0), 100.0),
        ],
    ));
    client.tick(ms(26));

    server.send(snapshot(1.5, 0, vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)]));
    client.tick(ms(42));

    assert_eq!(
        client
            .presentation()
            .count(&ClientEvent::EntityRemoved(OTHER_ID)),
        0
    );
    assert_eq!(
        client.interpolator().entity_ids().collect::<Vec<_>>(),
        vec![REMOTE_ID, OTHER_ID]
    );
}

// ============================================================================
// Watchdog, reconnect and configuration
// ============================================================================

#[test]
fn test_unknown_kind_refreshes_watchdog() {
    let (mut client, server) = connected(ClientConfig::default());

    let mut unknown = Envelope::from_message(&accept(), None, 0).unwrap();
    unknown.discriminator = 0x42;
    server.send_raw(unknown.encode().unwrap());
    client.tick(ms(9_000));

    client.tick(ms(15_000));
    assert_eq!(client.phase(), SessionPhase::Active);
    assert_eq!(client.stats().unknown_dropped, 1);

    client.tick(ms(19_100));
    assert_eq!(client.phase(), SessionPhase::Disconnected);
    assert_eq!(
        client.presentation().session_changes().pop().unwrap().reason,
        Some(DisconnectReason::ConnectionTimeout)
    );
}

#[test]
fn test_garbage_datagram_does_not_refresh_watchdog() {
    let (mut client, server) = connected(ClientConfig::default());

    server.send_raw(vec![0xFF; 3]);
    client.tick(ms(9_000));
    client.tick(ms(10_100));

    assert_eq!(client.phase(), SessionPhase::Disconnected);
}

#[test]
fn test_rejected_local_snapshot_keeps_pending_inputs() {
    let (mut client, server) = connected(ClientConfig::default());
    client.tick(ms(26));
    client.tick(ms(42));
    assert_eq!(client.sequencer().pending_len(), 3);
    let before = *client.local_entity();

    server.send(snapshot(
        1.0,
        3,
        vec![entity(LOCAL_ID, Vec2::new(f32::NAN, 0.0), 10.0)],
    ));
    client.tick(ms(58));

    assert_eq!(client.stats().rejected_snapshots, 1);
    assert_eq!(client.sequencer().pending_len(), 4);
    assert_eq!(
        client.sequencer().pending_inputs().next().unwrap().frame.sequence,
        1
    );
    assert_eq!(client.rtt(), None);
    assert_eq!(client.local_entity().health, before.health);

    server.send(snapshot(1.1, 3, vec![entity(LOCAL_ID, before.position, 100.0)]));
    client.tick(ms(74));
    assert_eq!(client.sequencer().pending_len(), 2);
    assert!(client.rtt().is_some());
}

#[test]
fn test_reconnect_starts_from_fresh_local_entity() {
    let config = ClientConfig::default();
    let dt = config.tick_seconds();
    let (mut client, server) = connected(config);
    client.tick(ms(26));
    let predicted = client.local_entity().position;
    server.send(snapshot(1.0, 2, vec![entity(LOCAL_ID, predicted, 40.0)]));
    client.tick(ms(42));
    assert_eq!(client.local_entity().health, 40.0);

    client.disconnect().unwrap();
    client.transport_mut().closed = false;
    client.connect("Ada", "ranger", ms(1_000)).unwrap();
    server.send(accept());
    client.tick(ms(1_010));

    let step = InputFrame {
        move_vector: Vec2::new(1.0, 0.0),
        ..InputFrame::default()
    };
    let local = client.local_entity();
    assert_eq!(client.phase(), SessionPhase::Active);
    assert_eq!(
        local.position,
        MovementModel::default().apply(Vec2::ZERO, &step, dt)
    );
    assert_eq!(local.health, 100.0);
    assert_eq!(local.max_health, 100.0);
}

#[test]
fn test_oversized_absence_window_rejected() {
    assert!(matches!(
        ClientConfig::from_toml_str("[interpolation]\nabsence_window = 1e20"),
        Err(ConfigError::Invalid(_))
    ));

    let mut config = ClientConfig::default();
    config.interpolation.absence_window = 1e20;
    let (to_client, inbound) = unbounded();
    let (outbound, _from_client) = unbounded::<Vec<u8>>();
    drop(to_client);
    let transport = LoopbackTransport {
        inbound,
        outbound,
        closed: false,
    };
    let input: fn() -> LocalInput = walk_right;
    assert!(matches!(
        SyncClient::new(config, transport, input, Recorder::default()),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_longest_accepted_absence_window_ticks() {
    let config =
        ClientConfig::from_toml_str("[interpolation]\nabsence_window = 86400.0").unwrap();
    let (mut client, server) = connected(config);
    server.send(snapshot(1.0, 0, vec![entity(REMOTE_ID, Vec2::ZERO, 100.0)]));
    client.tick(ms(26));
    client.tick(ms(9_000));

    assert_eq!(client.interpolator().len(), 1);
}
