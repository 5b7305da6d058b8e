//! Adapters layer - External system implementations.
//!
//! This module contains implementations of the port traits defined in `ports`.
//! Each adapter owns one OS resource: the allocation record file, a UDP
//! socket, or a console stream.

pub mod allocator;
pub mod console;
pub mod forwarder;
pub mod heartbeat;
pub mod interceptor;

// Re-export main types for convenience
pub use allocator::FilePortAllocator;
pub use console::ConsoleSink;
pub use forwarder::{DatagramForwarder, ErrorCallback, ForwarderPhase};
pub use heartbeat::{AnnouncerPhase, HeartbeatAnnouncer, HeartbeatSettings};
pub use interceptor::{LocalEcho, StreamInterceptor, StreamRegistry, StreamWriter};
