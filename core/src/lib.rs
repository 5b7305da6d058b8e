//! Mter Core Library
//!
//! Exports a process's console output over UDP so a collector can aggregate
//! output from many processes (for example forked workers) without changes
//! to application code.
//! Provides functionality to:
//! - Select processes by case-insensitive glob rules (`MTER=5001:worker-*`)
//! - Allocate non-colliding forwarder ports per host, across restarts
//! - Forward every stdout/stderr write as one UDP datagram
//! - Announce forwarders with a `PONG`/`BONG` heartbeat protocol
//!
//! # Architecture
//! This library follows hexagonal architecture (ports & adapters):
//! - `domain`: Pure data models, rule grammar and wire messages
//! - `ports`: Trait definitions (interfaces)
//! - `adapters`: Sockets, the allocation record and console streams
//! - `engine`: Activation and session lifecycle
//!
//! # Usage
//! ```no_run
//! use std::io::Write;
//!
//! # async fn run() -> mter_core::Result<()> {
//! let session = mter_core::activate_from_env().await?;
//! writeln!(mter_core::stdout(), "hello from a worker")?;
//! if let Some(session) = session {
//!     session.shutdown().await;
//! }
//! # Ok(())
//! # }
//! ```

pub mod adapters;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod ports;

// Re-export domain types (primary API)
pub use domain::{Announcement, ProcessIdentity, ProcessRole, StreamKind, TargetRule};

// Re-export other commonly used types
pub use adapters::{FilePortAllocator, LocalEcho, StreamRegistry, StreamWriter};
pub use config::MterConfig;
pub use engine::{MterEngine, MterSession};
pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Writer for the process's stdout, exported when a session is active.
pub fn stdout() -> StreamWriter<'static> {
    StreamRegistry::global().writer(StreamKind::Stdout)
}

/// Writer for the process's stderr, exported when a session is active.
pub fn stderr() -> StreamWriter<'static> {
    StreamRegistry::global().writer(StreamKind::Stderr)
}

/// Read the environment and activate export for the current process.
///
/// Must be called from within a tokio runtime.
pub async fn activate_from_env() -> Result<Option<MterSession>> {
    let config = MterConfig::from_env()?;
    let identity = ProcessIdentity::current(config.process_name.as_deref());
    MterEngine::new(config, identity).activate().await
}
