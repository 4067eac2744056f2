//! Operational post registry - Reference data and standing assignments.
//!
//! Holds the service roles, installations and guards the roster is built from,
//! and the operational posts that tie them together. A post is a vacancy exactly
//! when it has no standing guard, and a guard holds at most one active standing
//! post at a time.

use crate::{
    core::roster,
    entities::{
        Guard, Installation, OperationalPost, ServiceRole, guard, installation, operational_post,
        service_role,
    },
    errors::{Error, Result},
};
use chrono::{NaiveDate, NaiveTime};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use tracing::{info, instrument};

/// Parameters for a new service role.
#[derive(Debug, Clone)]
pub struct NewRole {
    /// Unique role name
    pub name: String,
    /// Shift start time
    pub shift_start: NaiveTime,
    /// Shift end time, may be past midnight
    pub shift_end: NaiveTime,
    /// Paid hours per shift
    pub shift_hours: f64,
    /// Rate used to value overtime
    pub hourly_rate: f64,
    /// Work days per cycle
    pub work_days: i32,
    /// Rest days per cycle
    pub rest_days: i32,
}

/// Creates a service role after validating its pay and cycle parameters.
///
/// # Errors
/// Returns an error if:
/// - The name is empty
/// - Shift hours are not positive or the hourly rate is negative / not finite
/// - The cycle has no working days or a negative number of rest days
pub async fn create_role(db: &DatabaseConnection, role: NewRole) -> Result<service_role::Model> {
    if role.name.trim().is_empty() {
        return Err(Error::Config {
            message: "Role name cannot be empty".to_string(),
        });
    }

    if !role.shift_hours.is_finite() || role.shift_hours <= 0.0 {
        return Err(Error::InvalidAmount {
            amount: role.shift_hours,
        });
    }

    if !role.hourly_rate.is_finite() || role.hourly_rate < 0.0 {
        return Err(Error::InvalidAmount {
            amount: role.hourly_rate,
        });
    }

    if role.work_days < 1 || role.rest_days < 0 {
        return Err(Error::Config {
            message: format!(
                "Invalid work/rest cycle {}x{} for role '{}'",
                role.work_days, role.rest_days, role.name
            ),
        });
    }

    service_role::ActiveModel {
        name: Set(role.name.trim().to_string()),
        shift_start: Set(role.shift_start),
        shift_end: Set(role.shift_end),
        shift_hours: Set(role.shift_hours),
        hourly_rate: Set(role.hourly_rate),
        work_days: Set(role.work_days),
        rest_days: Set(role.rest_days),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active installation.
pub async fn create_installation(
    db: &DatabaseConnection,
    name: &str,
) -> Result<installation::Model> {
    if name.trim().is_empty() {
        return Err(Error::Config {
            message: "Installation name cannot be empty".to_string(),
        });
    }

    installation::ActiveModel {
        name: Set(name.trim().to_string()),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Registers an active guard.
pub async fn create_guard(
    db: &DatabaseConnection,
    full_name: &str,
    phone: Option<String>,
) -> Result<guard::Model> {
    if full_name.trim().is_empty() {
        return Err(Error::Config {
            message: "Guard name cannot be empty".to_string(),
        });
    }

    guard::ActiveModel {
        full_name: Set(full_name.trim().to_string()),
        phone: Set(phone),
        active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Activates or deactivates a guard. Existing assignments are left alone.
#[instrument(skip(db))]
pub async fn set_guard_active(
    db: &DatabaseConnection,
    guard_id: i64,
    active: bool,
) -> Result<guard::Model> {
    let existing = require_guard(db, guard_id).await?;
    let mut model: guard::ActiveModel = existing.into();
    model.active = Set(active);
    let updated = model.update(db).await?;
    info!(guard_id, active, "Guard activity changed");
    Ok(updated)
}

/// Finds a service role by id.
pub async fn get_role_by_id<C>(db: &C, role_id: i64) -> Result<Option<service_role::Model>>
where
    C: ConnectionTrait,
{
    ServiceRole::find_by_id(role_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a guard by id.
pub async fn get_guard_by_id<C>(db: &C, guard_id: i64) -> Result<Option<guard::Model>>
where
    C: ConnectionTrait,
{
    Guard::find_by_id(guard_id).one(db).await.map_err(Into::into)
}

/// Finds an installation by id.
pub async fn get_installation_by_id<C>(
    db: &C,
    installation_id: i64,
) -> Result<Option<installation::Model>>
where
    C: ConnectionTrait,
{
    Installation::find_by_id(installation_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Finds a post by id, active or not.
pub async fn get_post_by_id<C>(db: &C, post_id: i64) -> Result<Option<operational_post::Model>>
where
    C: ConnectionTrait,
{
    OperationalPost::find_by_id(post_id)
        .one(db)
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_role<C>(db: &C, role_id: i64) -> Result<service_role::Model>
where
    C: ConnectionTrait,
{
    get_role_by_id(db, role_id)
        .await?
        .ok_or_else(|| Error::not_found("service role", role_id))
}

pub(crate) async fn require_guard<C>(db: &C, guard_id: i64) -> Result<guard::Model>
where
    C: ConnectionTrait,
{
    get_guard_by_id(db, guard_id)
        .await?
        .ok_or_else(|| Error::not_found("guard", guard_id))
}

/// Loads a guard that may be put on a post: it must exist and be active.
pub(crate) async fn require_active_guard<C>(db: &C, guard_id: i64) -> Result<guard::Model>
where
    C: ConnectionTrait,
{
    let guard = require_guard(db, guard_id).await?;
    if !guard.active {
        return Err(Error::precondition(format!(
            "guard {guard_id} is inactive"
        )));
    }
    Ok(guard)
}

pub(crate) async fn require_post<C>(db: &C, post_id: i64) -> Result<operational_post::Model>
where
    C: ConnectionTrait,
{
    get_post_by_id(db, post_id)
        .await?
        .ok_or_else(|| Error::not_found("operational post", post_id))
}

/// Lists every active post of an installation, ordered by id.
pub async fn list_active_posts<C>(
    db: &C,
    installation_id: i64,
) -> Result<Vec<operational_post::Model>>
where
    C: ConnectionTrait,
{
    OperationalPost::find()
        .filter(operational_post::Column::InstallationId.eq(installation_id))
        .filter(operational_post::Column::Active.eq(true))
        .order_by_asc(operational_post::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Finds the active post a guard currently holds as standing guard.
pub async fn find_active_post_for_guard<C>(
    db: &C,
    guard_id: i64,
) -> Result<Option<operational_post::Model>>
where
    C: ConnectionTrait,
{
    OperationalPost::find()
        .filter(operational_post::Column::GuardId.eq(guard_id))
        .filter(operational_post::Column::Active.eq(true))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Fails with [`Error::GuardAlreadyPosted`] when the guard holds an active post
/// other than `except_post`.
pub(crate) async fn ensure_guard_unposted<C>(
    db: &C,
    guard_id: i64,
    except_post: Option<i64>,
) -> Result<()>
where
    C: ConnectionTrait,
{
    let Some(existing) = find_active_post_for_guard(db, guard_id).await? else {
        return Ok(());
    };
    if Some(existing.id) == except_post {
        return Ok(());
    }

    let installation = get_installation_by_id(db, existing.installation_id)
        .await?
        .map_or_else(|| existing.installation_id.to_string(), |i| i.name);
    Err(Error::GuardAlreadyPosted {
        guard_id,
        post_id: existing.id,
        installation,
    })
}

/// Parameters for a new operational post.
#[derive(Debug, Clone)]
pub struct NewPost {
    /// Installation the post belongs to
    pub installation_id: i64,
    /// Service role that sets the shift and rate
    pub role_id: i64,
    /// Post name, unique within the installation
    pub name: String,
    /// Standing guard; None creates the post as a vacancy
    pub guard_id: Option<i64>,
    /// First day of the work/rest cycle
    pub cycle_start: NaiveDate,
}

/// Creates an active post, as a vacancy when no standing guard is given.
///
/// # Errors
/// Returns an error if:
/// - The installation, role or guard does not exist
/// - The guard is inactive or already holds another active post
#[instrument(skip(db, post), fields(name = %post.name))]
pub async fn create_post(
    db: &DatabaseConnection,
    post: NewPost,
) -> Result<operational_post::Model> {
    if post.name.trim().is_empty() {
        return Err(Error::Config {
            message: "Post name cannot be empty".to_string(),
        });
    }

    let txn = db.begin().await?;

    get_installation_by_id(&txn, post.installation_id)
        .await?
        .ok_or_else(|| Error::not_found("installation", post.installation_id))?;
    require_role(&txn, post.role_id).await?;
    if let Some(guard_id) = post.guard_id {
        require_active_guard(&txn, guard_id).await?;
        ensure_guard_unposted(&txn, guard_id, None).await?;
    }

    let created = operational_post::ActiveModel {
        installation_id: Set(post.installation_id),
        role_id: Set(post.role_id),
        name: Set(post.name.trim().to_string()),
        is_vacancy: Set(post.guard_id.is_none()),
        guard_id: Set(post.guard_id),
        active: Set(true),
        cycle_start: Set(post.cycle_start),
        ..Default::default()
    }
    .insert(&txn)
    .await?;

    txn.commit().await?;
    info!(post_id = created.id, vacancy = created.is_vacancy, "Post created");
    Ok(created)
}

/// Deactivates a post. Roster history that references it is kept.
#[instrument(skip(db))]
pub async fn deactivate_post(
    db: &DatabaseConnection,
    post_id: i64,
) -> Result<operational_post::Model> {
    let post = require_post(db, post_id).await?;
    let mut model: operational_post::ActiveModel = post.into();
    model.active = Set(false);
    let updated = model.update(db).await?;
    info!(post_id, "Post deactivated");
    Ok(updated)
}

/// Removes the standing guard from a post, turning it back into a vacancy
/// from `effective_from` onwards.
///
/// Untouched rows from that day on lose their guard in the same transaction, so
/// they read as open vacancy days. Rows a transition already wrote keep it.
#[instrument(skip(db))]
pub async fn release_guard_from_post(
    db: &DatabaseConnection,
    post_id: i64,
    effective_from: NaiveDate,
) -> Result<operational_post::Model> {
    let txn = db.begin().await?;
    let post = require_post(&txn, post_id).await?;
    if post.guard_id.is_none() {
        return Ok(post);
    }

    let mut model: operational_post::ActiveModel = post.into();
    model.guard_id = Set(None);
    model.is_vacancy = Set(true);
    let updated = model.update(&txn).await?;
    let rows = roster::reassign_untouched_rows(&txn, post_id, effective_from, None).await?;
    txn.commit().await?;
    info!(post_id, rows, "Standing guard released, post is now a vacancy");
    Ok(updated)
}
