//! Database layer for hookline.
//!
//! Exposes the sea-orm entities, the consolidated schema migration, the
//! typed store surface used by the capture/forward/replay pipeline, and
//! the text-vs-binary body codec.

pub mod body;
pub mod entities;
pub mod migrator;
pub mod store;

use sea_orm::{Database, DatabaseConnection, DbErr};
use sea_orm_migration::MigratorTrait;

/// Connect to the database at the given URL (Postgres in production,
/// `sqlite::memory:` in tests).
pub async fn connect(database_url: &str) -> Result<DatabaseConnection, DbErr> {
    Database::connect(database_url).await
}

/// Run all pending migrations.
pub async fn migrate(db: &DatabaseConnection) -> Result<(), DbErr> {
    migrator::Migrator::up(db, None).await
}
