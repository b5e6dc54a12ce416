/*
    migration - Schema versioning for stored collections

    Versions are integers starting at 1. Data written before versioning
    existed is version 1. A migration registered under `v` turns items of
    version `v - 1` into items of version `v`.
*/

pub mod engine;
pub mod errors;
pub mod record;
pub mod step;

pub use engine::{MigrationEngine, MigrationObserver, MigrationReport};
pub use errors::{MigrationError, MigrationResult};
pub use record::MigrationRecord;
pub use step::{add_field, async_step, AsyncStep, MigrationFn};
