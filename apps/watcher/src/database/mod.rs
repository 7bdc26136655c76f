/// Database layer
///
/// Holds the endpoint registry and the durable sample store, both in one
/// libsql database.
pub mod migrations;
pub mod repository;

pub use repository::{EndpointRegistry, LibsqlStore, StoredSample};

use anyhow::Result;

/// Initialize database with schema
pub async fn initialize_database(conn: &libsql::Connection) -> Result<()> {
    migrations::run_migrations(conn).await
}
