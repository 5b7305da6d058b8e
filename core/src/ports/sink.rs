//! Output sink port (interface).

use std::io;

/// Anything that can receive a chunk of console output.
///
/// The local console, the datagram forwarder and the stream interceptor
/// (which composes both) all implement this trait.
pub trait OutputSink: Send + Sync {
    /// Write one chunk. Implementations treat the chunk as a unit.
    fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Flush any buffered output.
    fn flush(&self) -> io::Result<()> {
        Ok(())
    }
}

/// Readiness of a background component.
pub trait Liveness: Send + Sync {
    /// Returns true once the component is confirmed live.
    fn is_live(&self) -> bool;
}
