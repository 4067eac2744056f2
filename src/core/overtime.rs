//! Overtime shift ledger - Payroll facts for guard-days worked off the standing post.
//!
//! A shift is valued once, at creation, from the covered post's role. After that
//! only the payment fields change, and only from unpaid to paid. Shifts are never
//! deleted, including when the roster row that produced them is reverted.

use crate::{
    core::registry,
    entities::{OperationalPost, OvertimeOrigin, OvertimeShift, operational_post, overtime_shift},
    errors::{Error, Result},
};
use chrono::{NaiveDate, Utc};
use sea_orm::{Condition, PaginatorTrait, QueryOrder, QuerySelect, Select, Set, prelude::*};
use tracing::{debug, info, instrument};

/// Finds the shift for a (guard, post, date, origin) identity.
pub async fn find_overtime_shift<C>(
    db: &C,
    guard_id: i64,
    post_id: i64,
    date: NaiveDate,
    origin: OvertimeOrigin,
) -> Result<Option<overtime_shift::Model>>
where
    C: ConnectionTrait,
{
    OvertimeShift::find()
        .filter(overtime_shift::Column::GuardId.eq(guard_id))
        .filter(overtime_shift::Column::PostId.eq(post_id))
        .filter(overtime_shift::Column::ShiftDate.eq(date))
        .filter(overtime_shift::Column::Origin.eq(origin))
        .one(db)
        .await
        .map_err(Into::into)
}

/// Retrieves a shift by id.
pub async fn get_overtime_shift<C>(db: &C, shift_id: i64) -> Result<Option<overtime_shift::Model>>
where
    C: ConnectionTrait,
{
    OvertimeShift::find_by_id(shift_id)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Records an unpaid overtime shift valued from the post's role.
///
/// Runs on whatever connection or transaction it is given so coverage
/// transitions can commit the shift together with the roster row.
///
/// # Errors
/// Returns an error if:
/// - The post, its role or the guard does not exist
/// - A shift with the same guard, post, date and origin already exists (`Conflict`)
#[instrument(skip(db))]
pub async fn create_overtime_shift<C>(
    db: &C,
    guard_id: i64,
    post_id: i64,
    date: NaiveDate,
    origin: OvertimeOrigin,
) -> Result<overtime_shift::Model>
where
    C: ConnectionTrait,
{
    if find_overtime_shift(db, guard_id, post_id, date, origin)
        .await?
        .is_some()
    {
        return Err(Error::conflict(format!(
            "overtime shift already recorded for guard {guard_id} on post {post_id} at {date}"
        )));
    }

    registry::require_guard(db, guard_id).await?;
    let post = registry::require_post(db, post_id).await?;
    let role = registry::require_role(db, post.role_id).await?;

    let shift = overtime_shift::ActiveModel {
        guard_id: Set(guard_id),
        post_id: Set(post_id),
        shift_date: Set(date),
        origin: Set(origin),
        value: Set(role.shift_value()),
        paid: Set(false),
        paid_on: Set(None),
        payment_note: Set(None),
        created_at: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await?;

    info!(
        shift_id = shift.id,
        value = shift.value,
        ?origin,
        "Overtime shift recorded"
    );
    Ok(shift)
}

/// Marks a shift as paid. Marking an already paid shift returns it unchanged.
///
/// # Errors
/// Returns `NotFound` if the shift does not exist.
#[instrument(skip(db, note))]
pub async fn mark_paid(
    db: &DatabaseConnection,
    shift_id: i64,
    payment_date: NaiveDate,
    note: Option<String>,
) -> Result<overtime_shift::Model> {
    let shift = get_overtime_shift(db, shift_id)
        .await?
        .ok_or_else(|| Error::not_found("overtime shift", shift_id))?;

    if shift.paid {
        debug!(shift_id, "Overtime shift already paid");
        return Ok(shift);
    }

    // Only flip rows that are still unpaid so a concurrent payment wins once.
    OvertimeShift::update_many()
        .set(overtime_shift::ActiveModel {
            paid: Set(true),
            paid_on: Set(Some(payment_date)),
            payment_note: Set(note),
            ..Default::default()
        })
        .filter(overtime_shift::Column::Id.eq(shift_id))
        .filter(overtime_shift::Column::Paid.eq(false))
        .exec(db)
        .await?;

    info!(shift_id, %payment_date, "Overtime shift paid");
    get_overtime_shift(db, shift_id)
        .await?
        .ok_or_else(|| Error::not_found("overtime shift", shift_id))
}

/// Lists a guard's shifts between two dates inclusive, oldest first.
pub async fn list_shifts_for_guard<C>(
    db: &C,
    guard_id: i64,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<overtime_shift::Model>>
where
    C: ConnectionTrait,
{
    OvertimeShift::find()
        .filter(overtime_shift::Column::GuardId.eq(guard_id))
        .filter(overtime_shift::Column::ShiftDate.between(from, to))
        .order_by_asc(overtime_shift::Column::ShiftDate)
        .order_by_asc(overtime_shift::Column::Id)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Which unpaid shifts the payroll export wants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnpaidFilter {
    /// Shifts dated between `from` and `to`, inclusive
    DateRange { from: NaiveDate, to: NaiveDate },
    /// Shifts on any post of an installation, active or not
    Installation(i64),
}

/// Page-by-page cursor over unpaid shifts, ordered by date then id.
///
/// Pages are fetched only when asked for and continue after the last
/// `(shift_date, id)` seen, so shifts paid while the cursor is being read do
/// not make it skip the ones behind them. The cursor ends once a page comes
/// back empty, and [`UnpaidShifts::restart`] rewinds it to the start.
pub struct UnpaidShifts<'db> {
    db: &'db DatabaseConnection,
    query: Select<OvertimeShift>,
    page_size: u64,
    after: Option<(NaiveDate, i64)>,
    exhausted: bool,
}

impl UnpaidShifts<'_> {
    /// Fetches the next page, or None once the sequence is exhausted.
    pub async fn next_page(&mut self) -> Result<Option<Vec<overtime_shift::Model>>> {
        if self.exhausted {
            return Ok(None);
        }

        let mut query = self.query.clone();
        if let Some((date, id)) = self.after {
            query = query.filter(
                Condition::any()
                    .add(overtime_shift::Column::ShiftDate.gt(date))
                    .add(
                        Condition::all()
                            .add(overtime_shift::Column::ShiftDate.eq(date))
                            .add(overtime_shift::Column::Id.gt(id)),
                    ),
            );
        }
        let page = query
            .order_by_asc(overtime_shift::Column::ShiftDate)
            .order_by_asc(overtime_shift::Column::Id)
            .limit(self.page_size)
            .all(self.db)
            .await?;

        let Some(last) = page.last() else {
            self.exhausted = true;
            return Ok(None);
        };
        self.after = Some((last.shift_date, last.id));
        Ok(Some(page))
    }

    /// Rewinds to the first unpaid shift.
    pub const fn restart(&mut self) {
        self.after = None;
        self.exhausted = false;
    }

    /// Number of unpaid shifts currently matching the filter.
    pub async fn total(&self) -> Result<u64> {
        self.query
            .clone()
            .count(self.db)
            .await
            .map_err(Into::into)
    }

    /// Drains the remaining pages into one vector.
    pub async fn collect_all(mut self) -> Result<Vec<overtime_shift::Model>> {
        let mut all = Vec::new();
        while let Some(page) = self.next_page().await? {
            all.extend(page);
        }
        Ok(all)
    }
}

/// Builds a cursor over unpaid shifts matching `filter`.
///
/// # Errors
/// Returns an error if the installation's posts cannot be read.
pub async fn list_unpaid(
    db: &DatabaseConnection,
    filter: UnpaidFilter,
    page_size: u64,
) -> Result<UnpaidShifts<'_>> {
    let mut query = OvertimeShift::find().filter(overtime_shift::Column::Paid.eq(false));

    query = match filter {
        UnpaidFilter::DateRange { from, to } => {
            query.filter(overtime_shift::Column::ShiftDate.between(from, to))
        }
        UnpaidFilter::Installation(installation_id) => {
            let post_ids: Vec<i64> = OperationalPost::find()
                .select_only()
                .column(operational_post::Column::Id)
                .filter(operational_post::Column::InstallationId.eq(installation_id))
                .into_tuple()
                .all(db)
                .await?;
            query.filter(overtime_shift::Column::PostId.is_in(post_ids))
        }
    };

    Ok(UnpaidShifts {
        db,
        query,
        page_size: page_size.max(1),
        after: None,
        exhausted: false,
    })
}
