//! CLI command implementations

pub mod allocate;
pub mod check;
pub mod run;
