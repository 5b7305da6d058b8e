//! Mter Engine - activation and session management.
//!
//! The engine decides whether the current process is selected by any target
//! rule and, on the first match, wires the pieces together: it resolves the
//! forwarder port, starts the heartbeat announcer and the datagram forwarder,
//! and installs interceptors on stdout and stderr.

use std::net::{Ipv4Addr, SocketAddrV4};
use std::sync::Arc;

use tracing::{debug, info};

use crate::adapters::{
    DatagramForwarder, ErrorCallback, FilePortAllocator, HeartbeatAnnouncer, HeartbeatSettings,
    StreamInterceptor, StreamRegistry,
};
use crate::config::MterConfig;
use crate::domain::{ProcessIdentity, StreamKind, TargetRule};
use crate::error::Result;
use crate::ports::PortAllocatorPort;

/// Activation engine for one process.
pub struct MterEngine<A: PortAllocatorPort = FilePortAllocator> {
    config: MterConfig,
    identity: ProcessIdentity,
    allocator: A,
    registry: &'static StreamRegistry,
    announce_destination: SocketAddrV4,
    on_error: Option<ErrorCallback>,
}

impl MterEngine<FilePortAllocator> {
    /// Create an engine allocating ports from the configured record file.
    pub fn new(config: MterConfig, identity: ProcessIdentity) -> Self {
        let allocator =
            FilePortAllocator::in_temp_dir(&config.lock_file_name, config.default_bind_port);
        Self::with_allocator(config, identity, allocator)
    }
}

impl<A: PortAllocatorPort> MterEngine<A> {
    /// Create an engine with a custom allocator.
    pub fn with_allocator(config: MterConfig, identity: ProcessIdentity, allocator: A) -> Self {
        let announce_destination = config.announce_destination();
        Self {
            config,
            identity,
            allocator,
            registry: StreamRegistry::global(),
            announce_destination,
            on_error: None,
        }
    }

    /// Install interceptors into `registry` instead of the process-wide one.
    pub fn with_registry(mut self, registry: &'static StreamRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Send announcements to `host` instead of the multicast group.
    ///
    /// Useful when the collector runs on the same host and multicast is not
    /// routed.
    pub fn with_announce_host(mut self, host: Ipv4Addr) -> Self {
        self.announce_destination = SocketAddrV4::new(host, self.config.recipient_port);
        self
    }

    /// Receive startup errors of the forwarder and announcer.
    pub fn on_error(mut self, callback: ErrorCallback) -> Self {
        self.on_error = Some(callback);
        self
    }

    pub fn config(&self) -> &MterConfig {
        &self.config
    }

    pub fn identity(&self) -> &ProcessIdentity {
        &self.identity
    }

    /// First configured rule selecting this process.
    pub fn find_rule(&self) -> Option<TargetRule> {
        self.config
            .rules()
            .into_iter()
            .find(|rule| rule.matches(&self.identity.name))
    }

    /// Forwarder port for `rule`: the explicit one, or a freshly allocated one.
    pub async fn resolve_port(&self, rule: &TargetRule) -> Result<u16> {
        match rule.explicit_port {
            Some(port) => Ok(port),
            None => self.allocator.allocate().await,
        }
    }

    /// Activate export if a rule selects this process.
    ///
    /// Returns `Ok(None)` when nothing matches or the streams are already
    /// intercepted. An allocation failure is returned as an error; the
    /// process keeps running without export either way.
    pub async fn activate(&self) -> Result<Option<MterSession>> {
        if !self.config.is_active() {
            debug!("No target rules configured");
            return Ok(None);
        }

        let Some(rule) = self.find_rule() else {
            debug!(name = %self.identity.name, "No target rule matches this process");
            return Ok(None);
        };

        if self.registry.is_installed(StreamKind::Stdout) {
            debug!(name = %self.identity.name, "Console export already active");
            return Ok(None);
        }

        let port = self.resolve_port(&rule).await?;
        let host = rule.explicit_host.unwrap_or(Ipv4Addr::UNSPECIFIED);
        info!(
            pattern = %rule.pattern,
            port = port,
            host = %host,
            "Exporting console output over UDP"
        );

        let announcer = HeartbeatAnnouncer::start(
            port,
            self.identity.name.clone(),
            HeartbeatSettings {
                bind_port: self.config.heartbeat_port(),
                destination: self.announce_destination,
                interval: self.config.heartbeat_interval(),
            },
            self.on_error.clone(),
        );
        let forwarder = DatagramForwarder::start(
            SocketAddrV4::new(host, port),
            self.config.recipient_addr(),
            self.on_error.clone(),
        );

        let mut streams = Vec::new();
        for kind in StreamKind::ALL {
            let interceptor = StreamInterceptor::new(
                kind,
                forwarder.clone(),
                self.config.local_echo(kind),
            )
            .watch(forwarder.clone())
            .watch(announcer.clone());

            if self.registry.install(Arc::new(interceptor)) {
                streams.push(kind);
            }
        }

        Ok(Some(MterSession {
            rule,
            port,
            announcer,
            forwarder,
            streams,
        }))
    }
}

/// A running export: announcer, forwarder and installed interceptors.
pub struct MterSession {
    rule: TargetRule,
    port: u16,
    announcer: Arc<HeartbeatAnnouncer>,
    forwarder: Arc<DatagramForwarder>,
    streams: Vec<StreamKind>,
}

impl MterSession {
    /// The rule that selected this process.
    pub fn rule(&self) -> &TargetRule {
        &self.rule
    }

    /// Forwarder port, as announced.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Streams intercepted by this session.
    pub fn streams(&self) -> &[StreamKind] {
        &self.streams
    }

    pub fn announcer(&self) -> &Arc<HeartbeatAnnouncer> {
        &self.announcer
    }

    pub fn forwarder(&self) -> &Arc<DatagramForwarder> {
        &self.forwarder
    }

    /// Wait for both background components. Returns true if both are live.
    pub async fn wait_ready(&self) -> bool {
        let forwarder = self.forwarder.wait_ready().await;
        let announcer = self.announcer.wait_ready().await;
        forwarder && announcer
    }

    /// Stop the heartbeat and send the farewell announcement.
    ///
    /// Interceptors stay installed; output keeps flowing to the forwarder
    /// until the process exits. Dropping the session without calling this
    /// still sends the farewell.
    pub async fn shutdown(&self) {
        self.announcer.farewell().await;
    }
}

impl Drop for MterSession {
    fn drop(&mut self) {
        self.announcer.farewell_now();
    }
}
