//! Domain layer - Pure business logic and data models.
//!
//! This module contains domain entities that represent core concepts:
//! who the process is, which rules select it and what goes on the wire.
//! These types have no I/O dependencies and can be tested in isolation.

mod announcement;
mod identity;
pub mod matcher;
mod rule;
mod stream;

// Re-export all domain types
pub use announcement::{
    is_announce_multicast, resolve_multicast, Announcement, DEFAULT_MULTICAST_ADDR,
};
pub use identity::{ProcessIdentity, ProcessRole, WORKER_ID_ENV};
pub use rule::{classify_field, RuleField, TargetRule};
pub use stream::StreamKind;
