//! Seeds reference data from the staffing configuration.
//!
//! Everything is matched by name, so seeding an already seeded database only
//! adds what is new in the file. Existing rows are never modified.

use crate::{
    config::staffing::StaffingConfig,
    core::registry::{self, NewPost, NewRole},
    entities::{Guard, Installation, OperationalPost, ServiceRole, operational_post},
    errors::{Error, Result},
};
use sea_orm::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Rows created by a seeding run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedSummary {
    /// Service roles created
    pub roles: usize,
    /// Installations created
    pub installations: usize,
    /// Guards created
    pub guards: usize,
    /// Posts created
    pub posts: usize,
}

/// Creates the roles, installations, guards and posts of the configuration
/// that do not exist yet.
///
/// # Errors
/// Returns an error if a post references a role, installation or guard that is
/// neither in the database nor in the file, or if a record fails validation.
#[instrument(skip(db, config))]
pub async fn seed_reference_data(
    db: &DatabaseConnection,
    config: &StaffingConfig,
) -> Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    let mut roles: HashMap<String, i64> = ServiceRole::find()
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.name, m.id))
        .collect();
    for role in &config.roles {
        if roles.contains_key(role.name.trim()) {
            debug!(name = %role.name, "Role already exists. Skipping.");
            continue;
        }
        let model = registry::create_role(
            db,
            NewRole {
                name: role.name.clone(),
                shift_start: role.shift_start,
                shift_end: role.shift_end,
                shift_hours: role.shift_hours,
                hourly_rate: role.hourly_rate,
                work_days: role.work_days,
                rest_days: role.rest_days,
            },
        )
        .await?;
        roles.insert(model.name, model.id);
        summary.roles += 1;
    }

    let mut installations: HashMap<String, i64> = Installation::find()
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.name, m.id))
        .collect();
    for entry in &config.installations {
        if installations.contains_key(entry.name.trim()) {
            debug!(name = %entry.name, "Installation already exists. Skipping.");
            continue;
        }
        let model = registry::create_installation(db, &entry.name).await?;
        installations.insert(model.name, model.id);
        summary.installations += 1;
    }

    let mut guards: HashMap<String, i64> = Guard::find()
        .all(db)
        .await?
        .into_iter()
        .map(|m| (m.full_name, m.id))
        .collect();
    for entry in &config.guards {
        if guards.contains_key(entry.full_name.trim()) {
            debug!(name = %entry.full_name, "Guard already exists. Skipping.");
            continue;
        }
        let model = registry::create_guard(db, &entry.full_name, entry.phone.clone()).await?;
        guards.insert(model.full_name, model.id);
        summary.guards += 1;
    }

    for post in &config.posts {
        let installation_id = lookup(&installations, "installation", &post.installation)?;
        let exists = OperationalPost::find()
            .filter(operational_post::Column::InstallationId.eq(installation_id))
            .filter(operational_post::Column::Name.eq(post.name.trim()))
            .one(db)
            .await?
            .is_some();
        if exists {
            debug!(name = %post.name, "Post already exists. Skipping.");
            continue;
        }

        let role_id = lookup(&roles, "service role", &post.role)?;
        let guard_id = post
            .guard
            .as_deref()
            .map(|name| lookup(&guards, "guard", name))
            .transpose()?;
        registry::create_post(
            db,
            NewPost {
                installation_id,
                role_id,
                name: post.name.clone(),
                guard_id,
                cycle_start: post.cycle_start,
            },
        )
        .await?;
        summary.posts += 1;
    }

    info!(
        roles = summary.roles,
        installations = summary.installations,
        guards = summary.guards,
        posts = summary.posts,
        "Reference data seeded"
    );
    Ok(summary)
}

fn lookup(known: &HashMap<String, i64>, entity: &str, name: &str) -> Result<i64> {
    known.get(name.trim()).copied().ok_or_else(|| Error::Config {
        message: format!("Unknown {entity} '{name}' referenced by a post"),
    })
}
