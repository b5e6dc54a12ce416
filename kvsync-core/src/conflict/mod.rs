//! Conflict resolution
//!
//! A conflict is two versions of one item: the local snapshot and the
//! server's. Resolution is referentially transparent for the named
//! policies; a custom handler may be async and may fail.

pub mod policy;
pub mod resolver;

pub use policy::{ConflictStrategy, ResolutionPolicy};
pub use resolver::{
    first_write_wins, last_write_wins, updated_at, ConflictContext, ConflictHandler,
    ConflictResolver,
};
