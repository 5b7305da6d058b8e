//! Datagram forwarder - sends console output to the recipient port.
//!
//! The forwarder binds its own UDP socket in a background task. Writes issued
//! while the socket is still binding are queued in call order and flushed as
//! individual datagrams once the socket is writable; afterwards every write
//! becomes exactly one datagram.

use std::io;
use std::net::{SocketAddr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tracing::debug;

use crate::error::Error;
use crate::ports::{Liveness, OutputSink};

/// Callback receiving startup errors of a background component.
pub type ErrorCallback = Arc<dyn Fn(&Error) + Send + Sync>;

/// Lifecycle phase of a forwarder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderPhase {
    /// Socket not bound yet; writes are queued.
    Binding,
    /// Socket bound and writable; writes are sent immediately.
    Listening,
    /// Binding failed; writes are dropped.
    Failed,
}

enum ForwarderState {
    Binding { pending: Vec<Vec<u8>> },
    Listening { socket: StdUdpSocket },
    Failed,
}

/// UDP sink for one process's console output.
pub struct DatagramForwarder {
    bind_addr: SocketAddrV4,
    destination: SocketAddr,
    state: Mutex<ForwarderState>,
    phase: watch::Sender<ForwarderPhase>,
    local_port: Mutex<Option<u16>>,
}

impl DatagramForwarder {
    /// Create a forwarder and start binding `bind_addr` in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        bind_addr: SocketAddrV4,
        destination: SocketAddr,
        on_error: Option<ErrorCallback>,
    ) -> Arc<Self> {
        let forwarder = Arc::new(Self::new(bind_addr, destination));
        let task = Arc::clone(&forwarder);
        tokio::spawn(async move {
            task.bind(on_error).await;
        });
        forwarder
    }

    fn new(bind_addr: SocketAddrV4, destination: SocketAddr) -> Self {
        let (phase, _) = watch::channel(ForwarderPhase::Binding);
        Self {
            bind_addr,
            destination,
            state: Mutex::new(ForwarderState::Binding {
                pending: Vec::new(),
            }),
            phase,
            local_port: Mutex::new(None),
        }
    }

    async fn bind(&self, on_error: Option<ErrorCallback>) {
        let result = async {
            let socket = UdpSocket::bind(self.bind_addr).await?;
            socket.writable().await?;
            socket.into_std()
        }
        .await;

        match result {
            Ok(socket) => self.on_listening(socket),
            Err(source) => {
                let err = Error::Bind {
                    port: self.bind_addr.port(),
                    source,
                };
                debug!(error = %err, "Forwarder failed to start");
                *self.state.lock() = ForwarderState::Failed;
                self.phase.send_replace(ForwarderPhase::Failed);
                if let Some(callback) = on_error {
                    callback(&err);
                }
            }
        }
    }

    fn on_listening(&self, socket: StdUdpSocket) {
        *self.local_port.lock() = socket.local_addr().ok().map(|addr| addr.port());

        let mut state = self.state.lock();
        let previous = std::mem::replace(&mut *state, ForwarderState::Failed);
        if let ForwarderState::Binding { pending } = previous {
            for chunk in &pending {
                send_datagram(&socket, chunk, self.destination);
            }
        }
        *state = ForwarderState::Listening { socket };
        drop(state);

        self.phase.send_replace(ForwarderPhase::Listening);
        debug!(
            bind = %self.bind_addr,
            destination = %self.destination,
            "Forwarder listening"
        );
    }

    /// Forward one chunk of output.
    pub fn send(&self, chunk: &[u8]) {
        match &mut *self.state.lock() {
            ForwarderState::Binding { pending } => pending.push(chunk.to_vec()),
            ForwarderState::Listening { socket } => {
                send_datagram(socket, chunk, self.destination)
            }
            ForwarderState::Failed => {}
        }
    }

    /// Wait until binding finished. Returns true if the forwarder is listening.
    pub async fn wait_ready(&self) -> bool {
        let mut phase = self.phase.subscribe();
        let ready = match phase.wait_for(|p| *p != ForwarderPhase::Binding).await {
            Ok(p) => *p == ForwarderPhase::Listening,
            Err(_) => false,
        };
        ready
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> ForwarderPhase {
        *self.phase.borrow()
    }

    /// Returns true once the socket is bound.
    pub fn is_listening(&self) -> bool {
        self.phase() == ForwarderPhase::Listening
    }

    /// Port requested at construction.
    pub fn bind_port(&self) -> u16 {
        self.bind_addr.port()
    }

    /// Port actually bound, once listening.
    pub fn local_port(&self) -> Option<u16> {
        *self.local_port.lock()
    }

    /// Where datagrams are sent.
    pub fn destination(&self) -> SocketAddr {
        self.destination
    }

    /// Number of writes queued while binding.
    pub fn pending_len(&self) -> usize {
        match &*self.state.lock() {
            ForwarderState::Binding { pending } => pending.len(),
            _ => 0,
        }
    }
}

// Send failures are dropped; delivery is best-effort.
fn send_datagram(socket: &StdUdpSocket, chunk: &[u8], destination: SocketAddr) {
    let _ = socket.send_to(chunk, destination);
}

impl OutputSink for DatagramForwarder {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        self.send(buf);
        Ok(buf.len())
    }
}

impl Liveness for DatagramForwarder {
    fn is_live(&self) -> bool {
        self.is_listening()
    }
}
