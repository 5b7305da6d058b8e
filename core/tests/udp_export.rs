//! End-to-end tests: activation, forwarding and announcements over loopback UDP.

use std::io::Write;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use mter_core::adapters::ErrorCallback;
use mter_core::{
    Announcement, FilePortAllocator, MterConfig, MterEngine, ProcessIdentity, ProcessRole,
    StreamKind, StreamRegistry,
};
use tempfile::tempdir;
use tokio::net::UdpSocket;

fn registry() -> &'static StreamRegistry {
    Box::leak(Box::new(StreamRegistry::new()))
}

fn free_port() -> u16 {
    std::net::UdpSocket::bind((Ipv4Addr::LOCALHOST, 0))
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

async fn collector() -> (UdpSocket, u16) {
    let socket = UdpSocket::bind((Ipv4Addr::LOCALHOST, 0)).await.unwrap();
    let port = socket.local_addr().unwrap().port();
    (socket, port)
}

async fn recv(socket: &UdpSocket, wait: Duration) -> Option<(Vec<u8>, SocketAddr)> {
    let mut buf = vec![0u8; 4096];
    match tokio::time::timeout(wait, socket.recv_from(&mut buf)).await {
        Ok(Ok((n, from))) => {
            buf.truncate(n);
            Some((buf, from))
        }
        _ => None,
    }
}

fn worker_config(targets: Vec<String>, recipient_port: u16) -> MterConfig {
    MterConfig {
        targets,
        recipient_port,
        heartbeat_port: Some(0),
        heartbeat_interval_ms: 50,
        ..MterConfig::default()
    }
}

fn worker_identity() -> ProcessIdentity {
    ProcessIdentity::new("worker-3", 4242, ProcessRole::Worker)
}

#[tokio::test]
async fn test_worker_exports_output_and_announces() {
    let (collector, recipient_port) = collector().await;
    let port = free_port();
    let registry = registry();

    let engine = MterEngine::new(
        worker_config(vec![format!("{}:worker-*", port)], recipient_port),
        worker_identity(),
    )
    .with_registry(registry)
    .with_announce_host(Ipv4Addr::LOCALHOST);

    let session = engine
        .activate()
        .await
        .unwrap()
        .expect("worker-3 should match worker-*");
    assert_eq!(session.port(), port);

    // Issued before the forwarder is ready; must still arrive first.
    registry
        .writer(StreamKind::Stdout)
        .write_all(b"hello\n")
        .unwrap();
    assert!(session.wait_ready().await);
    registry
        .writer(StreamKind::Stderr)
        .write_all(b"oops\n")
        .unwrap();

    let mut presences = 0;
    let mut logs = Vec::new();
    while presences < 2 || logs.len() < 2 {
        let (payload, from) = recv(&collector, Duration::from_secs(3))
            .await
            .expect("collector timed out");
        match Announcement::decode(&payload) {
            Some(Announcement::Presence { port: p, name }) => {
                assert_eq!(p, port);
                assert_eq!(name, "worker-3");
                presences += 1;
            }
            Some(Announcement::Farewell { .. }) => panic!("farewell before shutdown"),
            None => {
                assert_eq!(from.port(), port, "log data must come from the forwarder port");
                logs.push(payload);
            }
        }
    }
    assert_eq!(logs, vec![b"hello\n".to_vec(), b"oops\n".to_vec()]);

    session.shutdown().await;

    let expected = format!("BONG:{}", port);
    let mut farewells = 0;
    while let Some((payload, _)) = recv(&collector, Duration::from_millis(300)).await {
        if payload == expected.as_bytes() {
            farewells += 1;
        }
    }
    assert_eq!(farewells, 1);
}

#[tokio::test]
async fn test_dropped_session_says_farewell() {
    let (collector, recipient_port) = collector().await;
    let port = free_port();

    let engine = MterEngine::new(
        worker_config(vec![format!("{}:worker-*", port)], recipient_port),
        worker_identity(),
    )
    .with_registry(registry())
    .with_announce_host(Ipv4Addr::LOCALHOST);

    let session = engine.activate().await.unwrap().unwrap();
    assert!(session.wait_ready().await);
    let (first, _) = recv(&collector, Duration::from_secs(3))
        .await
        .expect("no presence before drop");
    assert_eq!(first, format!("PONG:{}:worker-3", port).into_bytes());

    drop(session);

    let farewell = format!("BONG:{}", port).into_bytes();
    let mut farewells = 0;
    while let Some((payload, _)) = recv(&collector, Duration::from_millis(400)).await {
        match Announcement::decode(&payload) {
            Some(Announcement::Farewell { port: p }) => {
                assert_eq!(payload, farewell);
                assert_eq!(p, port);
                farewells += 1;
            }
            Some(Announcement::Presence { .. }) => {
                assert_eq!(farewells, 0, "presence after farewell");
            }
            None => {}
        }
    }
    assert_eq!(farewells, 1);
}

#[tokio::test]
async fn test_empty_configuration_leaves_streams_alone() {
    let registry = registry();
    let engine = MterEngine::new(MterConfig::default(), worker_identity()).with_registry(registry);

    assert!(engine.activate().await.unwrap().is_none());
    assert!(!registry.is_installed(StreamKind::Stdout));
    assert!(!registry.is_installed(StreamKind::Stderr));

    let mut writer = registry.writer(StreamKind::Stdout);
    assert_eq!(writer.write(b"").unwrap(), 0);
}

#[tokio::test]
async fn test_processes_get_consecutive_ports() {
    let dir = tempdir().unwrap();
    let record = dir.path().join("ports.lock");
    let (_collector, recipient_port) = collector().await;

    let mut ports = Vec::new();
    for pid in 0..3 {
        let identity = ProcessIdentity::new(format!("worker-{}", pid), pid, ProcessRole::Worker);
        let engine = MterEngine::with_allocator(
            worker_config(vec!["worker-*".to_string()], recipient_port),
            identity,
            FilePortAllocator::new(&record, 4600),
        )
        .with_registry(registry())
        .with_announce_host(Ipv4Addr::LOCALHOST);

        let session = engine.activate().await.unwrap().unwrap();
        ports.push(session.port());
        session.shutdown().await;
    }

    assert_eq!(ports, vec![4600, 4601, 4602]);
    assert_eq!(std::fs::read(&record).unwrap(), 4602u16.to_be_bytes().to_vec());
}

#[tokio::test]
async fn test_bind_failure_degrades_to_local_output() {
    let occupied = std::net::UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).unwrap();
    let port = occupied.local_addr().unwrap().port();
    let (_collector, recipient_port) = collector().await;
    let registry = registry();

    let failed = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&failed);
    let callback: ErrorCallback = Arc::new(move |_| flag.store(true, Ordering::SeqCst));

    let engine = MterEngine::new(
        worker_config(vec![format!("{}:*", port)], recipient_port),
        worker_identity(),
    )
    .with_registry(registry)
    .with_announce_host(Ipv4Addr::LOCALHOST)
    .on_error(callback);

    let session = engine.activate().await.unwrap().unwrap();
    assert!(!session.wait_ready().await);
    assert!(failed.load(Ordering::SeqCst));

    let interceptor = registry.get(StreamKind::Stdout).unwrap();
    assert!(!interceptor.is_live());
    registry
        .writer(StreamKind::Stdout)
        .write_all(b"still printed locally\n")
        .unwrap();
}
