//! Stream interception.
//!
//! A [`StreamInterceptor`] decorates one output stream: every chunk is teed to
//! the forwarder and, depending on the [`LocalEcho`] policy, also written to
//! the local console. Interceptors live in a [`StreamRegistry`] with one slot
//! per stream; a slot is filled at most once.
//!
//! Code that wants its output exported writes through [`StreamWriter`]s
//! obtained from the registry (see [`crate::stdout`] and [`crate::stderr`]).
//! With nothing installed a writer behaves exactly like the plain console.

use std::io;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::domain::StreamKind;
use crate::ports::{Liveness, OutputSink};

use super::console::ConsoleSink;

/// Writes still echoed locally after the forwarder goes live.
const HANDOFF_ECHOES: u8 = 2;

/// Written locally once local output stops.
pub const HANDOFF_NOTICE: &[u8] = b"LOG TURN TO UDP SERVER\n";

/// Whether intercepted output is also written to the local console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LocalEcho {
    /// Always write locally as well.
    Always,
    /// Stop writing locally once every watched component is live.
    #[default]
    SuppressWhenLive,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Echo {
    Local,
    LastLocal,
    Suppressed,
}

/// Decorator teeing one stream's output to a forwarder.
pub struct StreamInterceptor {
    kind: StreamKind,
    local: Arc<dyn OutputSink>,
    forwarder: Arc<dyn OutputSink>,
    watched: Vec<Arc<dyn Liveness>>,
    policy: LocalEcho,
    handoff_remaining: AtomicU8,
}

impl StreamInterceptor {
    /// Intercept `kind`, echoing to the real console.
    pub fn new(kind: StreamKind, forwarder: Arc<dyn OutputSink>, policy: LocalEcho) -> Self {
        Self::with_local(kind, Arc::new(ConsoleSink::new(kind)), forwarder, policy)
    }

    /// Intercept `kind` with a custom local sink.
    pub fn with_local(
        kind: StreamKind,
        local: Arc<dyn OutputSink>,
        forwarder: Arc<dyn OutputSink>,
        policy: LocalEcho,
    ) -> Self {
        Self {
            kind,
            local,
            forwarder,
            watched: Vec::new(),
            policy,
            handoff_remaining: AtomicU8::new(HANDOFF_ECHOES),
        }
    }

    /// Add a component that must be live before local output is suppressed.
    pub fn watch(mut self, component: Arc<dyn Liveness>) -> Self {
        self.watched.push(component);
        self
    }

    pub fn kind(&self) -> StreamKind {
        self.kind
    }

    pub fn policy(&self) -> LocalEcho {
        self.policy
    }

    /// True when every watched component is live.
    pub fn is_live(&self) -> bool {
        self.watched.iter().all(|c| c.is_live())
    }

    fn echo(&self) -> Echo {
        if self.policy == LocalEcho::Always || !self.is_live() {
            return Echo::Local;
        }
        match self
            .handoff_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        {
            Ok(1) => Echo::LastLocal,
            Ok(_) => Echo::Local,
            Err(_) => Echo::Suppressed,
        }
    }
}

impl OutputSink for StreamInterceptor {
    fn write(&self, buf: &[u8]) -> io::Result<usize> {
        let echo = self.echo();
        if echo != Echo::Suppressed {
            let _ = self.local.write(buf);
        }
        let _ = self.forwarder.write(buf);
        if echo == Echo::LastLocal {
            let _ = self.local.write(HANDOFF_NOTICE);
        }
        Ok(buf.len())
    }

    fn flush(&self) -> io::Result<()> {
        self.local.flush()
    }
}

/// Process-wide table of installed interceptors, one slot per stream.
pub struct StreamRegistry {
    slots: RwLock<[Option<Arc<StreamInterceptor>>; 2]>,
}

static GLOBAL_REGISTRY: StreamRegistry = StreamRegistry::new();

impl StreamRegistry {
    pub const fn new() -> Self {
        Self {
            slots: parking_lot::const_rwlock([None, None]),
        }
    }

    /// The registry shared by the whole process.
    pub fn global() -> &'static StreamRegistry {
        &GLOBAL_REGISTRY
    }

    /// Install an interceptor into its stream's slot.
    ///
    /// Returns false, leaving the existing interceptor in place, if the slot
    /// is already taken.
    pub fn install(&self, interceptor: Arc<StreamInterceptor>) -> bool {
        let mut slots = self.slots.write();
        let slot = &mut slots[interceptor.kind().slot()];
        if slot.is_some() {
            return false;
        }
        *slot = Some(interceptor);
        true
    }

    pub fn is_installed(&self, kind: StreamKind) -> bool {
        self.slots.read()[kind.slot()].is_some()
    }

    pub fn get(&self, kind: StreamKind) -> Option<Arc<StreamInterceptor>> {
        self.slots.read()[kind.slot()].clone()
    }

    /// Remove and return the interceptor for `kind`.
    pub fn uninstall(&self, kind: StreamKind) -> Option<Arc<StreamInterceptor>> {
        self.slots.write()[kind.slot()].take()
    }

    /// Writer for `kind` routed through this registry.
    pub fn writer(&self, kind: StreamKind) -> StreamWriter<'_> {
        StreamWriter {
            registry: self,
            kind,
        }
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// `io::Write` handle for one stream.
///
/// Each `write` call is forwarded as a single chunk, so one call becomes one
/// datagram once the stream is intercepted.
#[derive(Clone, Copy)]
pub struct StreamWriter<'a> {
    registry: &'a StreamRegistry,
    kind: StreamKind,
}

impl io::Write for StreamWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.registry.get(self.kind) {
            Some(interceptor) => interceptor.write(buf),
            None => ConsoleSink::new(self.kind).write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.registry.get(self.kind) {
            Some(interceptor) => interceptor.flush(),
            None => ConsoleSink::new(self.kind).flush(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::io::Write;
    use std::sync::atomic::AtomicBool;

    #[derive(Default)]
    struct RecordingSink {
        chunks: Mutex<Vec<Vec<u8>>>,
    }

    impl RecordingSink {
        fn chunks(&self) -> Vec<Vec<u8>> {
            self.chunks.lock().clone()
        }
    }

    impl OutputSink for RecordingSink {
        fn write(&self, buf: &[u8]) -> io::Result<usize> {
            self.chunks.lock().push(buf.to_vec());
            Ok(buf.len())
        }
    }

    struct Switch(AtomicBool);

    impl Switch {
        fn new(on: bool) -> Arc<Self> {
            Arc::new(Self(AtomicBool::new(on)))
        }

        fn set(&self, on: bool) {
            self.0.store(on, Ordering::SeqCst);
        }
    }

    impl Liveness for Switch {
        fn is_live(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn interceptor(
        policy: LocalEcho,
    ) -> (StreamInterceptor, Arc<RecordingSink>, Arc<RecordingSink>) {
        let local = Arc::new(RecordingSink::default());
        let remote = Arc::new(RecordingSink::default());
        let interceptor =
            StreamInterceptor::with_local(StreamKind::Stdout, local.clone(), remote.clone(), policy);
        (interceptor, local, remote)
    }

    #[test]
    fn test_always_echoes_locally() {
        let (interceptor, local, remote) = interceptor(LocalEcho::Always);
        let interceptor = interceptor.watch(Switch::new(true));

        for line in [&b"a\n"[..], b"b\n", b"c\n", b"d\n"] {
            interceptor.write(line).unwrap();
        }

        assert_eq!(local.chunks().len(), 4);
        assert_eq!(remote.chunks(), local.chunks());
    }

    #[test]
    fn test_suppress_waits_for_every_component() {
        let forwarder = Switch::new(true);
        let announcer = Switch::new(false);
        let (interceptor, local, remote) = interceptor(LocalEcho::SuppressWhenLive);
        let interceptor = interceptor.watch(forwarder.clone()).watch(announcer.clone());

        for _ in 0..5 {
            interceptor.write(b"x").unwrap();
        }
        assert_eq!(local.chunks().len(), 5);
        assert_eq!(remote.chunks().len(), 5);

        announcer.set(true);
        forwarder.set(false);
        interceptor.write(b"y").unwrap();
        assert_eq!(local.chunks().len(), 6);
    }

    #[test]
    fn test_handoff_then_suppression() {
        let live = Switch::new(false);
        let (interceptor, local, remote) = interceptor(LocalEcho::SuppressWhenLive);
        let interceptor = interceptor.watch(live.clone());

        interceptor.write(b"before\n").unwrap();
        live.set(true);
        interceptor.write(b"one\n").unwrap();
        interceptor.write(b"two\n").unwrap();
        interceptor.write(b"three\n").unwrap();
        interceptor.write(b"four\n").unwrap();

        assert_eq!(
            local.chunks(),
            vec![
                b"before\n".to_vec(),
                b"one\n".to_vec(),
                b"two\n".to_vec(),
                HANDOFF_NOTICE.to_vec(),
            ]
        );
        assert_eq!(
            remote.chunks(),
            vec![
                b"before\n".to_vec(),
                b"one\n".to_vec(),
                b"two\n".to_vec(),
                b"three\n".to_vec(),
                b"four\n".to_vec(),
            ]
        );
    }

    #[test]
    fn test_install_is_idempotent() {
        let registry = StreamRegistry::new();
        let (first, _, first_remote) = interceptor(LocalEcho::Always);
        let (second, _, second_remote) = interceptor(LocalEcho::Always);

        assert!(!registry.is_installed(StreamKind::Stdout));
        assert!(registry.install(Arc::new(first)));
        assert!(!registry.install(Arc::new(second)));
        assert!(!registry.is_installed(StreamKind::Stderr));

        registry.writer(StreamKind::Stdout).write_all(b"hi").unwrap();
        assert_eq!(first_remote.chunks(), vec![b"hi".to_vec()]);
        assert!(second_remote.chunks().is_empty());
    }

    #[test]
    fn test_writer_without_interceptor_uses_console() {
        let registry = StreamRegistry::new();
        let mut writer = registry.writer(StreamKind::Stderr);
        assert_eq!(writer.write(b"").unwrap(), 0);
        writer.flush().unwrap();
        assert!(registry.get(StreamKind::Stderr).is_none());
    }

    #[test]
    fn test_uninstall() {
        let registry = StreamRegistry::new();
        let (first, _, _) = interceptor(LocalEcho::Always);
        registry.install(Arc::new(first));

        assert!(registry.uninstall(StreamKind::Stdout).is_some());
        assert!(!registry.is_installed(StreamKind::Stdout));
        assert!(registry.uninstall(StreamKind::Stdout).is_none());
    }
}
