//! Ports layer - Trait definitions (interfaces).
//!
//! This module defines the interfaces that the engine uses to interact
//! with external systems. Implementations live in `adapters`.

mod allocator;
mod sink;

pub use allocator::PortAllocatorPort;
pub use sink::{Liveness, OutputSink};
