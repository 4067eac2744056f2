//! Shared test utilities for the roster ledger.
//!
//! This module provides common helper functions for setting up test databases
//! and a small, fully generated installation to run transitions against.

use crate::{
    core::{
        audit::AuditLog,
        registry::{self, NewPost, NewRole},
        roster,
    },
    entities::{guard, installation, operational_post, roster_record, service_role},
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveTime};
use sea_orm::DatabaseConnection;

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// A day-shift role that works every day.
///
/// # Defaults
/// * shift: 08:00 to 20:00, 12 hours
/// * `hourly_rate`: 4500.0
/// * cycle: 7 work days, 0 rest days
#[allow(clippy::unwrap_used)]
pub fn day_role(name: &str) -> NewRole {
    NewRole {
        name: name.to_string(),
        shift_start: NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
        shift_end: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
        shift_hours: 12.0,
        hourly_rate: 4500.0,
        work_days: 7,
        rest_days: 0,
    }
}

/// Creates an active guard with no phone number.
pub async fn create_test_guard(db: &DatabaseConnection, name: &str) -> Result<guard::Model> {
    registry::create_guard(db, name, None).await
}

/// A day in March 2026, the month every fixture is generated for.
#[allow(clippy::unwrap_used)]
pub fn test_date(day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 3, day).unwrap()
}

/// One installation with a staffed post and a vacancy, both rostered for
/// March 2026.
pub struct Fixture {
    pub db: DatabaseConnection,
    pub audit: AuditLog,
    pub role: service_role::Model,
    pub installation: installation::Model,
    /// Standing guard of `post`
    pub standing_guard: guard::Model,
    /// Unposted guard available for overtime
    pub cover_guard: guard::Model,
    pub post: operational_post::Model,
    pub vacancy: operational_post::Model,
}

impl Fixture {
    /// The generated row of `post` on the given March day.
    pub async fn record_on(
        &self,
        post: &operational_post::Model,
        day: u32,
    ) -> Result<roster_record::Model> {
        roster::find_roster_record(&self.db, post.id, test_date(day))
            .await?
            .ok_or_else(|| Error::not_found("roster record", post.id))
    }
}

/// Sets up a complete test environment. See [`Fixture`].
pub async fn setup_fixture() -> Result<Fixture> {
    let db = setup_test_db().await?;
    let role = registry::create_role(&db, day_role("Day Patrol")).await?;
    let installation = registry::create_installation(&db, "North Gate").await?;
    let standing_guard = create_test_guard(&db, "Standing Guard").await?;
    let cover_guard = create_test_guard(&db, "Cover Guard").await?;

    let post = registry::create_post(
        &db,
        NewPost {
            installation_id: installation.id,
            role_id: role.id,
            name: "Main Entrance".to_string(),
            guard_id: Some(standing_guard.id),
            cycle_start: test_date(1),
        },
    )
    .await?;
    let vacancy = registry::create_post(
        &db,
        NewPost {
            installation_id: installation.id,
            role_id: role.id,
            name: "Loading Dock".to_string(),
            guard_id: None,
            cycle_start: test_date(1),
        },
    )
    .await?;

    roster::generate_installation_roster(&db, installation.id, 2026, 3).await?;

    Ok(Fixture {
        db,
        audit: AuditLog::disabled(),
        role,
        installation,
        standing_guard,
        cover_guard,
        post,
        vacancy,
    })
}
