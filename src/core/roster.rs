//! Roster store - Generation and reads of the per-post, per-day ledger.
//!
//! Rows are created in bulk for a month from the post registry's standing
//! assignments and are never deleted. All later writes go through the transition
//! engine, which uses [`compare_and_swap`] so that two racing requests cannot both
//! apply to the same row.

use crate::{
    core::registry,
    entities::{
        RosterRecord, RosterState, TransitionMeta, operational_post, roster_record, service_role,
    },
    errors::{Error, Result},
};
use chrono::{Months, NaiveDate, Utc};
use sea_orm::{QueryOrder, Set, TransactionTrait, prelude::*};
use std::collections::HashSet;
use tracing::{debug, info, instrument};

/// Outcome of generating a month of roster rows for one post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RosterGeneration {
    /// Rows created by this call
    pub created: usize,
    /// Days that already had a row and were left untouched
    pub skipped: usize,
}

impl std::ops::AddAssign for RosterGeneration {
    fn add_assign(&mut self, other: Self) {
        self.created += other.created;
        self.skipped += other.skipped;
    }
}

/// First and last day of a calendar month.
pub fn month_bounds(year: i32, month: u32) -> Result<(NaiveDate, NaiveDate)> {
    let first = NaiveDate::from_ymd_opt(year, month, 1).ok_or_else(|| Error::Config {
        message: format!("Invalid roster month {year}-{month:02}"),
    })?;
    let last = first
        .checked_add_months(Months::new(1))
        .and_then(|next| next.pred_opt())
        .ok_or_else(|| Error::Config {
            message: format!("Roster month {year}-{month:02} is out of range"),
        })?;
    Ok((first, last))
}

/// Whether `date` falls on a working day of the post's work/rest cycle.
///
/// The cycle starts with `work_days` working days on `cycle_start` and repeats
/// in both directions.
#[must_use]
pub fn is_work_day(role: &service_role::Model, cycle_start: NaiveDate, date: NaiveDate) -> bool {
    if role.rest_days <= 0 {
        return true;
    }
    let offset = (date - cycle_start).num_days();
    offset.rem_euclid(i64::from(role.cycle_length())) < i64::from(role.work_days)
}

fn default_state(
    role: &service_role::Model,
    post: &operational_post::Model,
    date: NaiveDate,
) -> RosterState {
    if is_work_day(role, post.cycle_start, date) {
        RosterState::Planned
    } else {
        RosterState::Free
    }
}

/// Creates the missing roster rows of a month for one post.
///
/// Work days start `planned`, rest days start `free`, and every row copies the
/// post's standing guard (None for a vacancy). Days that already have a row are
/// skipped, so calling this again is harmless.
///
/// # Errors
/// Returns an error if the month is invalid, the post or its role does not exist,
/// or the post is inactive.
#[instrument(skip(db))]
pub async fn generate_monthly_roster(
    db: &DatabaseConnection,
    post_id: i64,
    year: i32,
    month: u32,
) -> Result<RosterGeneration> {
    let (first, last) = month_bounds(year, month)?;

    let txn = db.begin().await?;
    let post = registry::require_post(&txn, post_id).await?;
    if !post.active {
        return Err(Error::precondition(format!(
            "post {post_id} is inactive and gets no new roster"
        )));
    }
    let role = registry::require_role(&txn, post.role_id).await?;

    let existing: HashSet<NaiveDate> = RosterRecord::find()
        .filter(roster_record::Column::PostId.eq(post_id))
        .filter(roster_record::Column::WorkDate.between(first, last))
        .all(&txn)
        .await?
        .into_iter()
        .map(|record| record.work_date)
        .collect();

    let now = Utc::now();
    let mut outcome = RosterGeneration::default();
    for date in first.iter_days().take_while(|d| *d <= last) {
        if existing.contains(&date) {
            outcome.skipped += 1;
            continue;
        }
        roster_record::ActiveModel {
            post_id: Set(post_id),
            guard_id: Set(post.guard_id),
            work_date: Set(date),
            state: Set(default_state(&role, &post, date)),
            meta: Set(None),
            version: Set(0),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&txn)
        .await?;
        outcome.created += 1;
    }

    txn.commit().await?;
    info!(
        post_id,
        created = outcome.created,
        skipped = outcome.skipped,
        "Monthly roster generated"
    );
    Ok(outcome)
}

/// Generates the month for every active post of an installation.
pub async fn generate_installation_roster(
    db: &DatabaseConnection,
    installation_id: i64,
    year: i32,
    month: u32,
) -> Result<RosterGeneration> {
    let mut total = RosterGeneration::default();
    for post in registry::list_active_posts(db, installation_id).await? {
        total += generate_monthly_roster(db, post.id, year, month).await?;
    }
    Ok(total)
}

/// Retrieves a roster row by id.
pub async fn get_roster_record<C>(db: &C, roster_id: i64) -> Result<Option<roster_record::Model>>
where
    C: ConnectionTrait,
{
    RosterRecord::find_by_id(roster_id)
        .one(db)
        .await
        .map_err(Into::into)
}

pub(crate) async fn require_record<C>(db: &C, roster_id: i64) -> Result<roster_record::Model>
where
    C: ConnectionTrait,
{
    get_roster_record(db, roster_id)
        .await?
        .ok_or_else(|| Error::not_found("roster record", roster_id))
}

/// Finds the row of a post for one day.
pub async fn find_roster_record<C>(
    db: &C,
    post_id: i64,
    date: NaiveDate,
) -> Result<Option<roster_record::Model>>
where
    C: ConnectionTrait,
{
    RosterRecord::find()
        .filter(roster_record::Column::PostId.eq(post_id))
        .filter(roster_record::Column::WorkDate.eq(date))
        .order_by_desc(roster_record::Column::UpdatedAt)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists a post's rows for a month, ordered by date.
pub async fn list_roster_for_post(
    db: &DatabaseConnection,
    post_id: i64,
    year: i32,
    month: u32,
) -> Result<Vec<roster_record::Model>> {
    let (first, last) = month_bounds(year, month)?;
    RosterRecord::find()
        .filter(roster_record::Column::PostId.eq(post_id))
        .filter(roster_record::Column::WorkDate.between(first, last))
        .order_by_asc(roster_record::Column::WorkDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// All rows of the given posts for one day, most recently updated first.
pub(crate) async fn list_roster_for_posts_on<C>(
    db: &C,
    post_ids: Vec<i64>,
    date: NaiveDate,
) -> Result<Vec<roster_record::Model>>
where
    C: ConnectionTrait,
{
    if post_ids.is_empty() {
        return Ok(Vec::new());
    }
    RosterRecord::find()
        .filter(roster_record::Column::PostId.is_in(post_ids))
        .filter(roster_record::Column::WorkDate.eq(date))
        .order_by_desc(roster_record::Column::UpdatedAt)
        .order_by_desc(roster_record::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Rows where the guard is the standing guard, within a month.
pub(crate) async fn list_roster_for_guard_in_month<C>(
    db: &C,
    guard_id: i64,
    year: i32,
    month: u32,
) -> Result<Vec<roster_record::Model>>
where
    C: ConnectionTrait,
{
    let (first, last) = month_bounds(year, month)?;
    RosterRecord::find()
        .filter(roster_record::Column::GuardId.eq(guard_id))
        .filter(roster_record::Column::WorkDate.between(first, last))
        .order_by_asc(roster_record::Column::WorkDate)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Applies a new state and side-record to a row if nobody else wrote it since
/// `current` was read.
///
/// Fails with [`Error::Conflict`] when the row's version moved on; the caller's
/// transaction is then dropped and nothing is written.
pub(crate) async fn compare_and_swap<C>(
    db: &C,
    current: &roster_record::Model,
    state: RosterState,
    meta: Option<TransitionMeta>,
) -> Result<roster_record::Model>
where
    C: ConnectionTrait,
{
    let now = Utc::now();
    let next_version = current.version + 1;

    let result = RosterRecord::update_many()
        .set(roster_record::ActiveModel {
            state: Set(state),
            meta: Set(meta.clone()),
            version: Set(next_version),
            updated_at: Set(now),
            ..Default::default()
        })
        .filter(roster_record::Column::Id.eq(current.id))
        .filter(roster_record::Column::Version.eq(current.version))
        .exec(db)
        .await?;

    if result.rows_affected == 0 {
        debug!(roster_id = current.id, "Roster record changed underneath us");
        return Err(Error::conflict(format!(
            "roster record {} was modified concurrently",
            current.id
        )));
    }

    Ok(roster_record::Model {
        state,
        meta,
        version: next_version,
        updated_at: now,
        ..current.clone()
    })
}

/// Moves a post's untouched rows from `from` onwards to a new standing guard
/// (None for a vacancy). A row is untouched while it is still `planned` or
/// `free` with no side-record; anything a transition wrote is left alone.
///
/// Returns the number of rows changed.
pub(crate) async fn reassign_untouched_rows<C>(
    db: &C,
    post_id: i64,
    from: NaiveDate,
    guard_id: Option<i64>,
) -> Result<u64>
where
    C: ConnectionTrait,
{
    use sea_orm::sea_query::Expr;

    let result = RosterRecord::update_many()
        .col_expr(roster_record::Column::GuardId, Expr::value(guard_id))
        .col_expr(
            roster_record::Column::Version,
            Expr::col(roster_record::Column::Version).add(1),
        )
        .col_expr(roster_record::Column::UpdatedAt, Expr::value(Utc::now()))
        .filter(roster_record::Column::PostId.eq(post_id))
        .filter(roster_record::Column::WorkDate.gte(from))
        .filter(roster_record::Column::State.is_in([RosterState::Planned, RosterState::Free]))
        .filter(roster_record::Column::Meta.is_null())
        .exec(db)
        .await?;

    debug!(
        post_id,
        %from,
        rows = result.rows_affected,
        "Untouched roster rows reassigned"
    );
    Ok(result.rows_affected)
}

/// Inserts a row for a day that was never generated (vacancy coverage on an
/// unrostered day).
pub(crate) async fn insert_record<C>(
    db: &C,
    post: &operational_post::Model,
    date: NaiveDate,
    state: RosterState,
    meta: Option<TransitionMeta>,
) -> Result<roster_record::Model>
where
    C: ConnectionTrait,
{
    roster_record::ActiveModel {
        post_id: Set(post.id),
        guard_id: Set(post.guard_id),
        work_date: Set(date),
        state: Set(state),
        meta: Set(meta),
        version: Set(0),
        updated_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}
