//! # Ghostline Netcode
//!
//! Client-side half of a real-time multiplayer synchronization protocol over
//! an unreliable, unordered datagram transport.
//!
//! ## Architecture
//!
//! - **Protocol**: self-contained envelope with an explicit kind byte, one
//!   positional binary schema per kind
//! - **Session**: `Disconnected → Connecting → Active` with handshake timeout
//!   and receive watchdog
//! - **Prediction**: sequenced input frames applied locally at once, kept in a
//!   bounded ring until acknowledged
//! - **Reconciliation**: snap to authoritative state beyond a threshold, then
//!   replay every unacknowledged input
//! - **Interpolation**: remote entities rendered from a delayed, buffered
//!   timeline
//!
//! ## Threading
//!
//! ```text
//! [recv thread] socket.recv ──► queue ──► [sim thread] decode/dispatch/
//!                                                      reconcile/interpolate
//! ```
//!
//! The receive thread never touches game state. Everything else runs inside
//! [`SyncClient::tick`].
//!
//! ## Example
//!
//! ```rust,ignore
//! use ghostline_netcode::{ClientConfig, SyncClient, UdpTransport};
//!
//! let config = ClientConfig::from_toml_str(&text)?;
//! let transport = UdpTransport::connect(server_addr, &config.transport)?;
//! let mut client = SyncClient::new(config, transport, read_controls, hud)?;
//!
//! client.connect("Ada", "ranger", epoch.elapsed())?;
//! loop {
//!     client.tick(epoch.elapsed());
//!     sleep_until_next_tick();
//! }
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]

pub mod client;
pub mod config;
pub mod error;
pub mod interpolation;
pub mod prediction;
pub mod protocol;
pub mod session;
pub mod transport;

pub use client::{
    ClientEvent, ClientStats, InputProvider, LocalView, Presentation, RemoteView, SyncClient,
};
pub use config::{ClientConfig, PredictionConfig, SessionConfig};
pub use error::{ClientError, ConfigError, DecodeError, EncodeError, SessionError, TransportError};
pub use interpolation::{
    EntityId, InterpolationConfig, RemoteEntitySnapshot, RemoteInterpolator, RenderState,
    ServerClock,
};
pub use prediction::{
    AuthoritativeSnapshot, InputSequencer, LocalEntity, LocalInput, MovementModel,
    PacketLossReport, PendingInputEntry, ReconciliationResult, Reconciler,
};
pub use protocol::{classify, dispatch, Envelope, Message, MessageKind};
pub use session::{
    DisconnectReason, SessionChange, SessionMachine, SessionPhase, SessionState, SessionTimeouts,
};
pub use transport::{Transport, TransportConfig, TransportStats, UdpTransport};
