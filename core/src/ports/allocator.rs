//! Port allocator port (interface).

use crate::error::Result;

/// Port for host-local forwarder port assignment.
///
/// Implementations must hand out distinct ports to concurrent callers on the
/// same host.
pub trait PortAllocatorPort: Send + Sync {
    /// Allocate the next forwarder port.
    fn allocate(&self) -> impl std::future::Future<Output = Result<u16>> + Send;
}
