//! Database configuration module for the roster ledger.
//!
//! This module handles `SQLite` database connection and table creation using `SeaORM`.
//! Tables are generated from the entity definitions with `Schema::create_table_from_entity`,
//! so the schema always matches the Rust structs. The composite uniqueness rules the
//! ledger relies on (one roster row per post and day, one overtime shift per guard,
//! post, day and origin) are added as explicit indexes.

use crate::entities::{
    AuditEntry, Guard, Installation, OperationalPost, OvertimeShift, RosterRecord, ServiceRole,
    overtime_shift, roster_record,
};
use crate::errors::Result;
use sea_orm::sea_query::{Index, IndexCreateStatement};
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use tracing::{debug, info, instrument};

const DEFAULT_DATABASE_URL: &str = "sqlite://data/roster.sqlite?mode=rwc";

/// Gets the database URL from the `DATABASE_URL` environment variable or returns the
/// default local `SQLite` path.
#[must_use]
pub fn get_database_url() -> String {
    std::env::var("DATABASE_URL").unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string())
}

/// Establishes a connection to the database named by [`get_database_url`].
///
/// For file-backed `SQLite` URLs the parent directory is created first.
pub async fn create_connection() -> Result<DatabaseConnection> {
    let database_url = get_database_url();
    if let Some(parent) = sqlite_file_parent(&database_url) {
        std::fs::create_dir_all(parent)?;
    }
    debug!("Connecting to {}", database_url);
    Database::connect(&database_url).await.map_err(Into::into)
}

fn sqlite_file_parent(url: &str) -> Option<&std::path::Path> {
    let path = url.strip_prefix("sqlite://")?;
    let path = path.split('?').next()?;
    if path.is_empty() || path.contains(":memory:") {
        return None;
    }
    std::path::Path::new(path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
}

async fn create_table_for<E>(db: &DatabaseConnection, schema: &Schema, entity: E) -> Result<()>
where
    E: EntityTrait,
{
    let builder = db.get_database_backend();
    let mut statement = schema.create_table_from_entity(entity);
    statement.if_not_exists();
    db.execute(builder.build(&statement)).await?;
    Ok(())
}

fn roster_day_index() -> IndexCreateStatement {
    Index::create()
        .name("idx_roster_records_post_day")
        .table(RosterRecord)
        .col(roster_record::Column::PostId)
        .col(roster_record::Column::WorkDate)
        .unique()
        .if_not_exists()
        .to_owned()
}

fn overtime_identity_index() -> IndexCreateStatement {
    Index::create()
        .name("idx_overtime_shifts_identity")
        .table(OvertimeShift)
        .col(overtime_shift::Column::GuardId)
        .col(overtime_shift::Column::PostId)
        .col(overtime_shift::Column::ShiftDate)
        .col(overtime_shift::Column::Origin)
        .unique()
        .if_not_exists()
        .to_owned()
}

/// Creates all tables and indexes if they do not exist yet.
#[instrument(skip(db))]
pub async fn create_tables(db: &DatabaseConnection) -> Result<()> {
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    create_table_for(db, &schema, ServiceRole).await?;
    create_table_for(db, &schema, Installation).await?;
    create_table_for(db, &schema, Guard).await?;
    create_table_for(db, &schema, OperationalPost).await?;
    create_table_for(db, &schema, RosterRecord).await?;
    create_table_for(db, &schema, OvertimeShift).await?;
    create_table_for(db, &schema, AuditEntry).await?;

    db.execute(builder.build(&roster_day_index())).await?;
    db.execute(builder.build(&overtime_identity_index())).await?;

    info!("Database tables ensured.");
    Ok(())
}
