//! Job status persistence.

mod legacy;
mod memory;
mod postgres;
mod store;

pub use legacy::{LegacySnapshot, MigrationReport};
pub use memory::MemoryBackend;
pub use postgres::PostgresBackend;
pub use store::{BackendKind, StatusBackend, StatusStore, StoreOptions, LOG_RETENTION};
