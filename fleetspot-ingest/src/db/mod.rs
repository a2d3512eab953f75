//! Database access for the ingest service
//!
//! Queries are runtime-checked `sqlx::query` calls against the schema created
//! by `fleetspot_common::db::init_schema`.

pub mod contributors;
pub mod conversations;
pub mod registry;
pub mod sightings;

pub use fleetspot_common::db::{init_database, init_schema, retry_on_lock};

/// Upper bound on waiting out a locked database for writes
pub const MAX_LOCK_WAIT_MS: u64 = 5000;
