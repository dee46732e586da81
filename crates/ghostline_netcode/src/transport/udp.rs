//! UDP transport with a background receive worker.

use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use ghostline_shared::MAX_DATAGRAM_SIZE;
use parking_lot::Mutex;

use super::{Transport, TransportConfig, TransportStats};
use crate::error::TransportError;

/// Receive buffer size. Larger than the protocol limit so oversized
/// datagrams arrive whole and fail decoding instead of being truncated.
const RECV_BUFFER_SIZE: usize = MAX_DATAGRAM_SIZE * 2;

/// Connected UDP socket plus its receive worker.
///
/// ```text
/// socket ──recv──► [worker] ──unbounded queue──► try_receive (sim thread)
/// ```
pub struct UdpTransport {
    /// Socket used for sending, dropped on close.
    socket: Option<UdpSocket>,
    /// Local address.
    local_addr: SocketAddr,
    /// Server address.
    peer_addr: SocketAddr,
    /// Inbound datagrams from the worker.
    inbound: Receiver<Vec<u8>>,
    /// Worker stop flag.
    shutdown: Arc<AtomicBool>,
    /// Signalled by the worker as it exits.
    exited: Receiver<()>,
    /// Worker handle, taken on close.
    worker: Option<JoinHandle<()>>,
    /// Statistics shared with the worker.
    stats: Arc<Mutex<TransportStats>>,
    /// Bounded wait for the worker on close.
    shutdown_timeout: Duration,
    /// Set once closed.
    closed: bool,
}

impl UdpTransport {
    /// Binds an ephemeral socket, connects it to `server_addr` and starts the
    /// receive worker.
    pub fn connect(
        server_addr: SocketAddr,
        config: &TransportConfig,
    ) -> Result<Self, TransportError> {
        let bind_addr: SocketAddr = if server_addr.is_ipv4() {
            (Ipv4Addr::UNSPECIFIED, 0).into()
        } else {
            (Ipv6Addr::UNSPECIFIED, 0).into()
        };
        let socket = UdpSocket::bind(bind_addr)?;
        socket.connect(server_addr)?;
        let local_addr = socket.local_addr()?;

        let recv_socket = socket.try_clone()?;
        recv_socket.set_read_timeout(Some(Duration::from_millis(config.read_timeout_ms.max(1))))?;

        let (queue_tx, inbound) = unbounded();
        let (exit_tx, exited) = bounded(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let stats = Arc::new(Mutex::new(TransportStats::default()));

        let worker = ReceiveWorker {
            socket: recv_socket,
            queue: queue_tx,
            shutdown: Arc::clone(&shutdown),
            stats: Arc::clone(&stats),
            high_water: config.queue_high_water.max(1),
            exit: exit_tx,
        };
        let handle = thread::Builder::new()
            .name("ghostline-recv".into())
            .spawn(move || worker.run())?;

        tracing::info!(%local_addr, %server_addr, "udp transport connected");

        Ok(Self {
            socket: Some(socket),
            local_addr,
            peer_addr: server_addr,
            inbound,
            shutdown,
            exited,
            worker: Some(handle),
            stats,
            shutdown_timeout: Duration::from_millis(config.shutdown_timeout_ms),
            closed: false,
        })
    }

    /// Returns the local address.
    #[must_use]
    pub const fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Returns the server address.
    #[must_use]
    pub const fn peer_addr(&self) -> SocketAddr {
        self.peer_addr
    }

    /// Returns a copy of the statistics.
    #[must_use]
    pub fn stats(&self) -> TransportStats {
        *self.stats.lock()
    }

    /// Datagrams waiting for the simulation thread.
    #[must_use]
    pub fn queue_depth(&self) -> usize {
        self.inbound.len()
    }

    /// True once `close` has run.
    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Transport for UdpTransport {
    fn send(&mut self, datagram: &[u8]) -> Result<(), TransportError> {
        let Some(socket) = &self.socket else {
            return Err(TransportError::Closed);
        };
        match socket.send(datagram) {
            Ok(sent) => {
                let mut stats = self.stats.lock();
                stats.datagrams_sent += 1;
                stats.bytes_sent += sent as u64;
                Ok(())
            }
            Err(e) => {
                self.stats.lock().send_errors += 1;
                Err(e.into())
            }
        }
    }

    fn try_receive(&mut self) -> Option<Vec<u8>> {
        self.inbound.try_recv().ok()
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.shutdown.store(true, Ordering::Release);
        // The worker owns a clone and releases it as it exits.
        self.socket = None;

        let Some(handle) = self.worker.take() else {
            return;
        };
        match self.exited.recv_timeout(self.shutdown_timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                if handle.join().is_err() {
                    tracing::warn!("receive worker panicked");
                }
                tracing::debug!(local_addr = %self.local_addr, "udp transport closed");
            }
            Err(RecvTimeoutError::Timeout) => {
                tracing::warn!(
                    timeout = ?self.shutdown_timeout,
                    "receive worker did not exit in time, abandoning it"
                );
            }
        }
    }
}

impl Drop for UdpTransport {
    fn drop(&mut self) {
        self.close();
    }
}

/// State moved into the receive thread.
struct ReceiveWorker {
    socket: UdpSocket,
    queue: Sender<Vec<u8>>,
    shutdown: Arc<AtomicBool>,
    stats: Arc<Mutex<TransportStats>>,
    high_water: usize,
    exit: Sender<()>,
}

impl ReceiveWorker {
    fn run(self) {
        let mut buffer = vec![0u8; RECV_BUFFER_SIZE];
        let mut above_high_water = false;

        while !self.shutdown.load(Ordering::Acquire) {
            let len = match self.socket.recv(&mut buffer) {
                Ok(len) => len,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    continue;
                }
                Err(e) => {
                    self.stats.lock().recv_errors += 1;
                    tracing::debug!(error = %e, "udp receive failed");
                    if e.kind() != io::ErrorKind::ConnectionRefused {
                        thread::sleep(Duration::from_millis(1));
                    }
                    continue;
                }
            };

            if self.queue.send(buffer[..len].to_vec()).is_err() {
                break;
            }

            let depth = self.queue.len();
            let mut stats = self.stats.lock();
            stats.datagrams_received += 1;
            stats.bytes_received += len as u64;
            stats.queue_peak = stats.queue_peak.max(depth);

            if depth >= self.high_water {
                if !above_high_water {
                    above_high_water = true;
                    stats.high_water_crossings += 1;
                    tracing::warn!(depth, high_water = self.high_water, "inbound queue above high-water mark");
                }
            } else {
                above_high_water = false;
            }
        }

        let _ = self.exit.send(());
    }
}
