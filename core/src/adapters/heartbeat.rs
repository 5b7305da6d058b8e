//! Heartbeat announcer - presence discovery for collectors.
//!
//! Binds the shared heartbeat port (address reuse lets every exporting
//! process on the host bind it), then repeatedly sends
//! `PONG:<forwarder port>:<name>` to the announcement destination, sleeping
//! for the interval after each send. A single `BONG:<forwarder port>` is sent
//! on shutdown.

use std::io;
use std::net::{Ipv4Addr, SocketAddrV4, UdpSocket as StdUdpSocket};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use parking_lot::Mutex;
use socket2::{Domain, Protocol, SockAddr, SockRef, Socket, Type};
use tokio::net::UdpSocket;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::domain::Announcement;
use crate::error::Error;
use crate::ports::Liveness;

use super::forwarder::ErrorCallback;

/// Lifecycle phase of an announcer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnouncerPhase {
    Binding,
    Live,
    Failed,
    Stopped,
}

/// Where and how often to announce.
#[derive(Debug, Clone)]
pub struct HeartbeatSettings {
    /// Shared local port the announcer binds.
    pub bind_port: u16,
    /// Multicast group (or any address) plus recipient port.
    pub destination: SocketAddrV4,
    /// Delay between the end of one send and the next.
    pub interval: Duration,
}

/// Periodically announces a forwarder to collectors.
pub struct HeartbeatAnnouncer {
    forwarder_port: u16,
    process_name: String,
    settings: HeartbeatSettings,
    socket: OnceLock<UdpSocket>,
    phase: watch::Sender<AnnouncerPhase>,
    farewell_sent: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl HeartbeatAnnouncer {
    /// Create an announcer and start it in the background.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        forwarder_port: u16,
        process_name: impl Into<String>,
        settings: HeartbeatSettings,
        on_error: Option<ErrorCallback>,
    ) -> Arc<Self> {
        let (phase, _) = watch::channel(AnnouncerPhase::Binding);
        let announcer = Arc::new(Self {
            forwarder_port,
            process_name: process_name.into(),
            settings,
            socket: OnceLock::new(),
            phase,
            farewell_sent: AtomicBool::new(false),
            task: Mutex::new(None),
        });

        let runner = Arc::clone(&announcer);
        let handle = tokio::spawn(async move {
            runner.run(on_error).await;
        });
        *announcer.task.lock() = Some(handle);
        announcer
    }

    async fn run(&self, on_error: Option<ErrorCallback>) {
        let socket = match bind_shared(self.settings.bind_port).and_then(UdpSocket::from_std) {
            Ok(socket) => socket,
            Err(source) => {
                let err = Error::Bind {
                    port: self.settings.bind_port,
                    source,
                };
                debug!(error = %err, "Heartbeat announcer failed to start");
                self.phase.send_replace(AnnouncerPhase::Failed);
                if let Some(callback) = on_error {
                    callback(&err);
                }
                return;
            }
        };

        let socket = self.socket.get_or_init(|| socket);
        self.phase.send_replace(AnnouncerPhase::Live);
        debug!(
            heartbeat_port = self.settings.bind_port,
            destination = %self.settings.destination,
            "Heartbeat announcer live"
        );

        let presence = self.presence().encode();
        while !self.farewell_sent.load(Ordering::SeqCst) {
            let _ = socket
                .send_to(presence.as_bytes(), self.settings.destination)
                .await;
            tokio::time::sleep(self.settings.interval).await;
        }
    }

    /// The presence message this announcer sends.
    pub fn presence(&self) -> Announcement {
        Announcement::Presence {
            port: self.forwarder_port,
            name: self.process_name.clone(),
        }
    }

    /// Stop the heartbeat and send the farewell message once.
    ///
    /// Waits for the heartbeat task to stop first, so no presence message
    /// follows the farewell. Later calls do nothing. Delivery is not
    /// guaranteed.
    pub async fn farewell(&self) {
        let heartbeat = self.task.lock().take();
        if let Some(handle) = heartbeat {
            handle.abort();
            // Cancellation is the expected outcome.
            let _ = handle.await;
        }
        self.send_farewell();
    }

    /// Synchronous variant of [`farewell`](Self::farewell) for drop paths.
    ///
    /// Aborts the heartbeat task without waiting for it.
    pub fn farewell_now(&self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
        self.send_farewell();
    }

    fn send_farewell(&self) {
        if self.farewell_sent.swap(true, Ordering::SeqCst) {
            return;
        }

        if let Some(socket) = self.socket.get() {
            let farewell = Announcement::Farewell {
                port: self.forwarder_port,
            };
            // Goes straight to the socket so it also works outside a runtime.
            let sent = SockRef::from(socket).send_to(
                farewell.encode().as_bytes(),
                &SockAddr::from(self.settings.destination),
            );
            if sent.is_ok() {
                info!(port = self.forwarder_port, "Sent farewell announcement");
            }
        }
        self.phase.send_replace(AnnouncerPhase::Stopped);
    }

    /// Wait until binding finished. Returns true if the announcer went live.
    pub async fn wait_ready(&self) -> bool {
        let mut phase = self.phase.subscribe();
        let ready = match phase.wait_for(|p| *p != AnnouncerPhase::Binding).await {
            Ok(p) => *p == AnnouncerPhase::Live,
            Err(_) => false,
        };
        ready
    }

    /// Current lifecycle phase.
    pub fn phase(&self) -> AnnouncerPhase {
        *self.phase.borrow()
    }

    /// Forwarder port carried in announcements.
    pub fn forwarder_port(&self) -> u16 {
        self.forwarder_port
    }
}

impl Liveness for HeartbeatAnnouncer {
    fn is_live(&self) -> bool {
        self.phase() == AnnouncerPhase::Live
    }
}

/// Bind a broadcast-capable UDP socket that other processes may share.
fn bind_shared(port: u16) -> io::Result<StdUdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;

    socket.set_reuse_address(true)?;
    #[cfg(unix)]
    socket.set_reuse_port(true)?;
    socket.set_broadcast(true)?;
    socket.set_multicast_loop_v4(true)?;
    socket.set_nonblocking(true)?;
    socket.bind(&SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port).into())?;

    Ok(socket.into())
}
