// Postgres storage layer with sqlx

pub mod execution_store;
pub mod models;
pub mod revision_store;

pub use execution_store::ExecutionStore;
pub use models::*;
pub use revision_store::RevisionStore;

/// Embedded schema migrations, applied at startup with `MIGRATOR.run(&pool)`
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!();
