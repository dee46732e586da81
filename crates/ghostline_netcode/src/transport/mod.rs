//! # Transport Layer
//!
//! Unreliable datagram transport behind a small trait.
//!
//! ## Design
//!
//! - One worker thread owns the blocking receive and nothing else
//! - Received buffers cross to the simulation thread over a channel
//! - The simulation thread polls with `try_receive`; it never blocks on I/O

mod udp;

pub use udp::UdpTransport;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

/// Datagram transport used by the client.
pub trait Transport {
    /// Sends one datagram to the server.
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError>;

    /// Returns the next received datagram, if any. Never blocks.
    fn try_receive(&mut self) -> Option<Vec<u8>>;

    /// Stops receiving and releases the socket. Idempotent.
    fn close(&mut self);
}

/// Transport statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TransportStats {
    /// Datagrams sent.
    pub datagrams_sent: u64,
    /// Datagrams received by the worker.
    pub datagrams_received: u64,
    /// Bytes sent.
    pub bytes_sent: u64,
    /// Bytes received.
    pub bytes_received: u64,
    /// Send errors.
    pub send_errors: u64,
    /// Receive errors.
    pub recv_errors: u64,
    /// Deepest inbound queue observed.
    pub queue_peak: usize,
    /// Times the inbound queue crossed its high-water mark.
    pub high_water_crossings: u64,
}

/// Transport tuning.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Worker read timeout; bounds how long it takes to notice shutdown.
    pub read_timeout_ms: u64,
    /// How long `close` waits for the worker before abandoning it.
    pub shutdown_timeout_ms: u64,
    /// Inbound queue depth that triggers a warning.
    pub queue_high_water: usize,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 50,
            shutdown_timeout_ms: 2_000,
            queue_high_water: 1_024,
        }
    }
}
