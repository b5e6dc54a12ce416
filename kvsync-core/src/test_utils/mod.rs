//! Test utilities and helpers for kvsync
//!
//! Fixtures for stored collections plus helpers for waiting on
//! asynchronous effects.

pub mod async_helpers;
pub mod fixtures;

pub use async_helpers::*;
pub use fixtures::*;
