//! Transition engine - The only write path for roster rows.
//!
//! Each operation runs in one store transaction: the row is read, the
//! preconditions are checked against what was read, and the new state is
//! written with a compare-and-swap on the row version. Coverage transitions
//! commit their overtime shift in the same transaction. A failed precondition
//! leaves the row exactly as it was.
//!
//! ```text
//! planned --mark_worked-------------------> worked
//! planned --mark_absence------------------> absent
//! planned --mark_absence_with_coverage----> worked_by_replacement
//! planned --assign_coverage_to_vacancy----> worked_by_vacancy_coverage
//! planned --mark_leave / mark_day_off-----> leave_* / medical_leave / vacation / free
//! any     --revert_to_plan----------------> planned (meta cleared)
//! ```
//!
//! Every successful transition is reported to the audit stream after commit.
//! The audit stream is advisory; it can never fail a transition.

use crate::{
    core::{
        audit::{AuditLog, AuditRecord},
        overtime, registry,
        roster::{compare_and_swap, find_roster_record, insert_record, require_record},
    },
    entities::{
        MetaDetail, OvertimeOrigin, RosterState, TransitionAction, TransitionMeta, overtime_shift,
        roster_record,
    },
    errors::{Error, ErrorKind, Result},
};
use chrono::NaiveDate;
use sea_orm::{ConnectionTrait, DatabaseConnection, TransactionTrait};
use tracing::{debug, info, instrument, warn};

const REVERT_ATTEMPTS: usize = 3;

/// Why a standing guard missed the shift.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsenceReport {
    /// Operator-supplied reason code (e.g., "sick", "no show")
    pub reason: String,
    /// Whether the guard warned in advance
    pub notice_given: bool,
}

impl AbsenceReport {
    /// Builds a report from a reason code and the notice flag.
    pub fn new(reason: impl Into<String>, notice_given: bool) -> Self {
        Self {
            reason: reason.into(),
            notice_given,
        }
    }
}

/// Leave states an operator can record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveKind {
    /// Paid leave
    Paid,
    /// Unpaid leave
    Unpaid,
    /// Medical leave
    Medical,
    /// Vacation day
    Vacation,
}

impl LeaveKind {
    const fn state(self) -> RosterState {
        match self {
            Self::Paid => RosterState::OnLeavePaid,
            Self::Unpaid => RosterState::OnLeaveUnpaid,
            Self::Medical => RosterState::Medical,
            Self::Vacation => RosterState::Vacation,
        }
    }
}

/// Result of a coverage transition: the roster row and its overtime shift.
#[derive(Debug, Clone, PartialEq)]
pub struct CoverageOutcome {
    /// Roster row after the transition
    pub record: roster_record::Model,
    /// Overtime shift owed to the covering guard
    pub shift: overtime_shift::Model,
}

fn validate_actor(actor_ref: &str) -> Result<()> {
    if actor_ref.trim().is_empty() {
        return Err(Error::precondition("an actor reference is required"));
    }
    Ok(())
}

/// Rows in a coverage state can only leave it through `revert_to_plan`, and
/// rows without a standing guard can only be covered as a vacancy.
fn ensure_standing_transition(record: &roster_record::Model) -> Result<()> {
    if record.state.is_coverage() {
        return Err(Error::precondition(format!(
            "roster record {} is already covered; revert it to plan first",
            record.id
        )));
    }
    if record.guard_id.is_none() {
        return Err(Error::precondition(format!(
            "roster record {} has no standing guard; cover it as a vacancy",
            record.id
        )));
    }
    Ok(())
}

fn report(
    audit: &AuditLog,
    before: &roster_record::Model,
    after: &roster_record::Model,
    actor_ref: &str,
    action: TransitionAction,
) {
    audit.record(AuditRecord::new(
        after.id,
        actor_ref,
        action,
        before.state,
        after.state,
    ));
}

/// Transition to `target` on a row with a standing guard. `decide` sees the row
/// inside the transaction and returns the side-record to write, or None when the
/// row is already in the requested state.
async fn apply_standing_transition<F>(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    actor_ref: &str,
    action: TransitionAction,
    target: RosterState,
    decide: F,
) -> Result<roster_record::Model>
where
    F: FnOnce(&roster_record::Model) -> Option<MetaDetail>,
{
    validate_actor(actor_ref)?;

    let txn = db.begin().await?;
    let current = require_record(&txn, roster_id).await?;
    ensure_standing_transition(&current)?;

    let Some(detail) = decide(&current) else {
        debug!(roster_id, state = ?current.state, "Transition already applied");
        return Ok(current);
    };

    let meta = TransitionMeta::new(action, actor_ref, detail);
    let updated = compare_and_swap(&txn, &current, target, Some(meta)).await?;
    txn.commit().await?;

    report(audit, &current, &updated, actor_ref, action);
    info!(
        roster_id,
        from = ?current.state,
        to = ?updated.state,
        action = action.as_str(),
        "Roster transition applied"
    );
    Ok(updated)
}

/// Records that the standing guard worked the day.
///
/// Marking a row that is already `worked` returns it unchanged, and losing a
/// race against an identical request returns the winner's row.
///
/// # Errors
/// - `NotFound` if the row does not exist
/// - `PreconditionFailed` if the row is covered or has no standing guard
#[instrument(skip(db, audit))]
pub async fn mark_worked(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    actor_ref: &str,
) -> Result<roster_record::Model> {
    let result = apply_standing_transition(
        db,
        audit,
        roster_id,
        actor_ref,
        TransitionAction::MarkWorked,
        RosterState::Worked,
        |current| (current.state != RosterState::Worked).then_some(MetaDetail::Worked),
    )
    .await;

    match result {
        Err(err) if err.kind() == ErrorKind::Conflict => {
            let current = require_record(db, roster_id).await?;
            if current.state == RosterState::Worked {
                debug!(roster_id, "Concurrent mark_worked already applied");
                Ok(current)
            } else {
                Err(err)
            }
        }
        other => other,
    }
}

/// Records an uncovered absence. The standing guard stays on the row for
/// attribution and no overtime is created.
///
/// # Errors
/// - `NotFound` if the row does not exist
/// - `PreconditionFailed` if the row is covered or has no standing guard
#[instrument(skip(db, audit))]
pub async fn mark_absence(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    absence: AbsenceReport,
    actor_ref: &str,
) -> Result<roster_record::Model> {
    apply_standing_transition(
        db,
        audit,
        roster_id,
        actor_ref,
        TransitionAction::MarkAbsence,
        RosterState::Absent,
        |_| {
            Some(MetaDetail::Absence {
                reason: absence.reason,
                notice_given: absence.notice_given,
            })
        },
    )
    .await
}

/// Records a leave day for the standing guard.
///
/// # Errors
/// - `NotFound` if the row does not exist
/// - `PreconditionFailed` if the row is covered or has no standing guard
#[instrument(skip(db, audit))]
pub async fn mark_leave(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    kind: LeaveKind,
    reason: Option<String>,
    actor_ref: &str,
) -> Result<roster_record::Model> {
    apply_standing_transition(
        db,
        audit,
        roster_id,
        actor_ref,
        TransitionAction::MarkLeave,
        kind.state(),
        |_| Some(MetaDetail::Leave { reason }),
    )
    .await
}

/// Turns the day into a rest day.
///
/// # Errors
/// - `NotFound` if the row does not exist
/// - `PreconditionFailed` if the row is covered or has no standing guard
#[instrument(skip(db, audit))]
pub async fn mark_day_off(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    actor_ref: &str,
) -> Result<roster_record::Model> {
    apply_standing_transition(
        db,
        audit,
        roster_id,
        actor_ref,
        TransitionAction::MarkDayOff,
        RosterState::Free,
        |current| (current.state != RosterState::Free).then_some(MetaDetail::DayOff),
    )
    .await
}

async fn find_or_create_shift<C>(
    db: &C,
    guard_id: i64,
    post_id: i64,
    date: NaiveDate,
    origin: OvertimeOrigin,
) -> Result<overtime_shift::Model>
where
    C: ConnectionTrait,
{
    match overtime::find_overtime_shift(db, guard_id, post_id, date, origin).await? {
        Some(existing) => Ok(existing),
        None => overtime::create_overtime_shift(db, guard_id, post_id, date, origin).await,
    }
}

/// Records that the standing guard was absent and `coverage_guard_id` worked
/// the day in their place, creating the replacement overtime shift in the same
/// transaction.
///
/// Repeating the call with the same coverage guard refreshes the side-record
/// and returns the existing shift; a different coverage guard is a conflict.
///
/// # Errors
/// - `NotFound` if the row, its post or the coverage guard does not exist
/// - `PreconditionFailed` if the coverage guard is the standing guard or is
///   inactive, or the row is not planned/absent
/// - `Conflict` if the row is already covered by a different guard
#[instrument(skip(db, audit))]
pub async fn mark_absence_with_coverage(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    absence: AbsenceReport,
    coverage_guard_id: i64,
    actor_ref: &str,
) -> Result<CoverageOutcome> {
    validate_actor(actor_ref)?;

    let txn = db.begin().await?;
    let current = require_record(&txn, roster_id).await?;
    let post = registry::require_post(&txn, current.post_id).await?;

    if current.guard_id.is_none() {
        return Err(Error::precondition(format!(
            "roster record {roster_id} has no standing guard; cover it as a vacancy"
        )));
    }
    if current.guard_id == Some(coverage_guard_id) || post.guard_id == Some(coverage_guard_id) {
        return Err(Error::precondition(format!(
            "guard {coverage_guard_id} is the standing guard of post {} and cannot cover it",
            post.id
        )));
    }
    registry::require_active_guard(&txn, coverage_guard_id).await?;

    match current.state {
        RosterState::Planned | RosterState::Absent => {}
        RosterState::WorkedByReplacement => {
            let existing_guard = current.meta.as_ref().and_then(TransitionMeta::coverage_guard_id);
            if existing_guard != Some(coverage_guard_id) {
                return Err(Error::conflict(format!(
                    "roster record {roster_id} is already covered by guard {}",
                    existing_guard.map_or_else(|| "unknown".to_string(), |g| g.to_string())
                )));
            }
        }
        other => {
            return Err(Error::precondition(format!(
                "roster record {roster_id} is {other:?} and cannot take a replacement"
            )));
        }
    }

    let meta = TransitionMeta::new(
        TransitionAction::MarkAbsenceWithCoverage,
        actor_ref,
        MetaDetail::Coverage {
            origin: OvertimeOrigin::Replacement,
            coverage_guard_id,
            reason: Some(absence.reason),
            notice_given: Some(absence.notice_given),
        },
    );
    let record =
        compare_and_swap(&txn, &current, RosterState::WorkedByReplacement, Some(meta)).await?;
    let shift = find_or_create_shift(
        &txn,
        coverage_guard_id,
        post.id,
        record.work_date,
        OvertimeOrigin::Replacement,
    )
    .await?;
    txn.commit().await?;

    report(
        audit,
        &current,
        &record,
        actor_ref,
        TransitionAction::MarkAbsenceWithCoverage,
    );
    info!(
        roster_id,
        coverage_guard_id,
        shift_id = shift.id,
        "Absence covered by replacement"
    );
    Ok(CoverageOutcome { record, shift })
}

/// Covers a vacant post for one day, creating the day's row if it was never
/// generated, together with the vacancy-coverage overtime shift.
///
/// # Errors
/// - `NotFound` if the post or guard does not exist
/// - `PreconditionFailed` if the post is not an active vacancy, the guard is
///   inactive, or the day is not open (already worked, rest day, ...)
/// - `Conflict` if the day is already covered by a different guard
#[instrument(skip(db, audit))]
pub async fn assign_coverage_to_vacancy(
    db: &DatabaseConnection,
    audit: &AuditLog,
    post_id: i64,
    guard_id: i64,
    date: NaiveDate,
    actor_ref: &str,
) -> Result<CoverageOutcome> {
    validate_actor(actor_ref)?;

    let txn = db.begin().await?;
    let post = registry::require_post(&txn, post_id).await?;
    if !post.active || !post.is_vacancy || post.guard_id.is_some() {
        return Err(Error::precondition(format!(
            "post {post_id} is not an open vacancy"
        )));
    }
    registry::require_active_guard(&txn, guard_id).await?;

    let meta = TransitionMeta::new(
        TransitionAction::AssignCoverageToVacancy,
        actor_ref,
        MetaDetail::Coverage {
            origin: OvertimeOrigin::VacancyCoverage,
            coverage_guard_id: guard_id,
            reason: None,
            notice_given: None,
        },
    );

    let existing = find_roster_record(&txn, post_id, date).await?;
    let (before, record) = match existing {
        None => {
            let record = insert_record(
                &txn,
                &post,
                date,
                RosterState::WorkedByVacancyCoverage,
                Some(meta),
            )
            .await?;
            (RosterState::Planned, record)
        }
        Some(current) => {
            if current.guard_id == Some(guard_id) {
                return Err(Error::precondition(format!(
                    "guard {guard_id} is the standing guard recorded on roster record {}",
                    current.id
                )));
            }
            match current.state {
                RosterState::Planned => {}
                RosterState::WorkedByVacancyCoverage => {
                    let existing_guard =
                        current.meta.as_ref().and_then(TransitionMeta::coverage_guard_id);
                    if existing_guard != Some(guard_id) {
                        return Err(Error::conflict(format!(
                            "vacancy on post {post_id} at {date} is already covered"
                        )));
                    }
                }
                other => {
                    return Err(Error::precondition(format!(
                        "post {post_id} is {other:?} on {date} and is not open for coverage"
                    )));
                }
            }
            let record = compare_and_swap(
                &txn,
                &current,
                RosterState::WorkedByVacancyCoverage,
                Some(meta),
            )
            .await?;
            (current.state, record)
        }
    };

    let shift =
        find_or_create_shift(&txn, guard_id, post_id, date, OvertimeOrigin::VacancyCoverage)
            .await?;
    txn.commit().await?;

    audit.record(AuditRecord::new(
        record.id,
        actor_ref,
        TransitionAction::AssignCoverageToVacancy,
        before,
        record.state,
    ));
    info!(post_id, guard_id, %date, shift_id = shift.id, "Vacancy covered");
    Ok(CoverageOutcome { record, shift })
}

/// Resets a row to `planned` and clears its side-record, whatever state it is
/// in. Safe to repeat. Overtime shifts created earlier are left in place.
///
/// # Errors
/// - `NotFound` if the row does not exist
/// - `Conflict` only if the row keeps changing underneath across every attempt
#[instrument(skip(db, audit))]
pub async fn revert_to_plan(
    db: &DatabaseConnection,
    audit: &AuditLog,
    roster_id: i64,
    actor_ref: &str,
) -> Result<roster_record::Model> {
    validate_actor(actor_ref)?;

    let mut attempt = 0;
    loop {
        attempt += 1;
        let txn = db.begin().await?;
        let current = require_record(&txn, roster_id).await?;

        if current.state == RosterState::Planned && current.meta.is_none() {
            debug!(roster_id, "Roster record already planned");
            report(audit, &current, &current, actor_ref, TransitionAction::RevertToPlan);
            return Ok(current);
        }

        match compare_and_swap(&txn, &current, RosterState::Planned, None).await {
            Ok(updated) => {
                txn.commit().await?;
                report(audit, &current, &updated, actor_ref, TransitionAction::RevertToPlan);
                info!(roster_id, from = ?current.state, "Roster record reverted to plan");
                return Ok(updated);
            }
            Err(err) if err.kind() == ErrorKind::Conflict && attempt < REVERT_ATTEMPTS => {
                warn!(roster_id, attempt, "Revert raced another write, retrying");
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    #![allow(clippy::float_cmp)]
    use super::*;
    use crate::core::overtime::{UnpaidFilter, list_unpaid, mark_paid};
    use crate::core::roster::get_roster_record;
    use crate::entities::{AuditEntry, OvertimeShift, overtime_shift};
    use crate::test_utils::*;
    use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter};

    async fn shifts_for(
        fixture: &Fixture,
        guard_id: i64,
        origin: OvertimeOrigin,
    ) -> Result<u64> {
        OvertimeShift::find()
            .filter(overtime_shift::Column::GuardId.eq(guard_id))
            .filter(overtime_shift::Column::Origin.eq(origin))
            .count(&fixture.db)
            .await
            .map_err(Into::into)
    }

    #[tokio::test]
    async fn test_mark_worked() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 2).await?;

        let worked = mark_worked(&fixture.db, &fixture.audit, record.id, "operator-1").await?;
        assert_eq!(worked.state, RosterState::Worked);
        assert_eq!(worked.guard_id, Some(fixture.standing_guard.id));
        let meta = worked.meta.unwrap();
        assert_eq!(meta.action, TransitionAction::MarkWorked);
        assert_eq!(meta.actor_ref, "operator-1");
        assert_eq!(meta.notice_given(), None);
        assert_eq!(meta.reason(), None);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_worked_clears_absence_markers() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 2).await?;

        mark_absence(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("late", true),
            "operator-1",
        )
        .await?;
        let worked = mark_worked(&fixture.db, &fixture.audit, record.id, "operator-1").await?;

        assert_eq!(worked.state, RosterState::Worked);
        assert_eq!(worked.meta.unwrap().detail, MetaDetail::Worked);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_worked_missing_record() -> Result<()> {
        let fixture = setup_fixture().await?;
        let result = mark_worked(&fixture.db, &fixture.audit, 9_999, "operator-1").await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_mark_worked_requires_actor() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 2).await?;

        let result = mark_worked(&fixture.db, &fixture.audit, record.id, "  ").await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));

        let stored = get_roster_record(&fixture.db, record.id).await?.unwrap();
        assert_eq!(stored, record);

        Ok(())
    }

    #[tokio::test]
    async fn test_concurrent_mark_worked_settles_on_worked() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 3).await?;

        let (first, second) = tokio::join!(
            mark_worked(&fixture.db, &fixture.audit, record.id, "operator-1"),
            mark_worked(&fixture.db, &fixture.audit, record.id, "operator-2"),
        );
        let first = first?;
        let second = second?;

        assert_eq!(first.state, RosterState::Worked);
        assert_eq!(second.state, RosterState::Worked);

        let stored = get_roster_record(&fixture.db, record.id).await?.unwrap();
        assert_eq!(stored.state, RosterState::Worked);
        // Exactly one write happened
        assert_eq!(stored.version, record.version + 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_absence_keeps_standing_guard() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 4).await?;

        let absent = mark_absence(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("no show", false),
            "operator-1",
        )
        .await?;

        assert_eq!(absent.state, RosterState::Absent);
        assert_eq!(absent.guard_id, Some(fixture.standing_guard.id));
        let meta = absent.meta.unwrap();
        assert_eq!(meta.reason(), Some("no show"));
        assert_eq!(meta.notice_given(), Some(false));
        assert_eq!(meta.coverage_guard_id(), None);

        assert_eq!(
            OvertimeShift::find().count(&fixture.db).await?,
            0,
            "uncovered absences create no overtime"
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_absence_with_coverage_scenario() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 5).await?;

        let outcome = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "operator-1",
        )
        .await?;

        assert_eq!(outcome.record.state, RosterState::WorkedByReplacement);
        assert_eq!(outcome.record.guard_id, Some(fixture.standing_guard.id));
        assert_eq!(
            outcome.record.effective_guard_id(),
            Some(fixture.cover_guard.id)
        );
        let meta = outcome.record.meta.clone().unwrap();
        assert_eq!(meta.origin(), Some(OvertimeOrigin::Replacement));
        assert_eq!(meta.coverage_guard_id(), Some(fixture.cover_guard.id));
        assert_eq!(meta.reason(), Some("sick"));
        assert_eq!(meta.notice_given(), Some(false));

        assert_eq!(outcome.shift.guard_id, fixture.cover_guard.id);
        assert_eq!(outcome.shift.post_id, fixture.post.id);
        assert_eq!(outcome.shift.shift_date, record.work_date);
        assert_eq!(outcome.shift.origin, OvertimeOrigin::Replacement);
        assert!(!outcome.shift.paid);

        Ok(())
    }

    #[tokio::test]
    async fn test_absence_with_coverage_twice_same_guard_keeps_one_shift() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 6).await?;

        let first = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "operator-1",
        )
        .await?;
        let second = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("family emergency", true),
            fixture.cover_guard.id,
            "operator-2",
        )
        .await?;

        assert_eq!(first.shift.id, second.shift.id);
        assert_eq!(
            shifts_for(&fixture, fixture.cover_guard.id, OvertimeOrigin::Replacement).await?,
            1
        );
        let meta = second.record.meta.unwrap();
        assert_eq!(meta.reason(), Some("family emergency"));
        assert_eq!(meta.actor_ref, "operator-2");

        Ok(())
    }

    #[tokio::test]
    async fn test_absence_with_coverage_different_guard_conflicts() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 7).await?;
        let other = create_test_guard(&fixture.db, "Third Guard").await?;

        let first = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "operator-1",
        )
        .await?;
        let result = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            other.id,
            "operator-1",
        )
        .await;
        assert!(matches!(result, Err(Error::Conflict { .. })));

        // Nothing moved
        let stored = get_roster_record(&fixture.db, record.id).await?.unwrap();
        assert_eq!(stored.version, first.record.version);
        assert_eq!(stored.meta, first.record.meta);
        assert_eq!(
            shifts_for(&fixture, other.id, OvertimeOrigin::Replacement).await?,
            0
        );

        Ok(())
    }

    #[tokio::test]
    async fn test_absence_with_coverage_rejects_standing_guard() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 8).await?;

        let result = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.standing_guard.id,
            "operator-1",
        )
        .await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));

        let stored = get_roster_record(&fixture.db, record.id).await?.unwrap();
        assert_eq!(stored, record);

        Ok(())
    }

    #[tokio::test]
    async fn test_absence_with_coverage_rejects_inactive_guard() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 8).await?;
        registry::set_guard_active(&fixture.db, fixture.cover_guard.id, false).await?;

        let result = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "operator-1",
        )
        .await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));
        assert_eq!(OvertimeShift::find().count(&fixture.db).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_revert_after_coverage_keeps_overtime() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 9).await?;

        let covered = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "operator-1",
        )
        .await?;

        let reverted = revert_to_plan(&fixture.db, &fixture.audit, record.id, "supervisor").await?;
        assert_eq!(reverted.state, RosterState::Planned);
        assert!(reverted.meta.is_none());

        let stored = get_roster_record(&fixture.db, record.id).await?.unwrap();
        assert_eq!(stored.state, RosterState::Planned);
        assert!(stored.meta.is_none());

        let unpaid = list_unpaid(
            &fixture.db,
            UnpaidFilter::DateRange {
                from: test_date(1),
                to: test_date(31),
            },
            10,
        )
        .await?
        .collect_all()
        .await?;
        assert_eq!(unpaid.len(), 1);
        assert_eq!(unpaid[0].id, covered.shift.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_revert_to_plan_from_every_state() -> Result<()> {
        let fixture = setup_fixture().await?;

        let worked = fixture.record_on(&fixture.post, 10).await?;
        mark_worked(&fixture.db, &fixture.audit, worked.id, "op").await?;
        let absent = fixture.record_on(&fixture.post, 11).await?;
        mark_absence(&fixture.db, &fixture.audit, absent.id, AbsenceReport::new("x", true), "op")
            .await?;
        let leave = fixture.record_on(&fixture.post, 12).await?;
        mark_leave(&fixture.db, &fixture.audit, leave.id, LeaveKind::Medical, None, "op").await?;
        let free = fixture.record_on(&fixture.post, 13).await?;
        mark_day_off(&fixture.db, &fixture.audit, free.id, "op").await?;
        let vacancy = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            test_date(14),
            "op",
        )
        .await?;
        let planned = fixture.record_on(&fixture.post, 15).await?;

        for id in [
            worked.id,
            absent.id,
            leave.id,
            free.id,
            vacancy.record.id,
            planned.id,
        ] {
            let reverted = revert_to_plan(&fixture.db, &fixture.audit, id, "supervisor").await?;
            assert_eq!(reverted.state, RosterState::Planned);
            assert!(reverted.meta.is_none());

            // And again: idempotent
            let again = revert_to_plan(&fixture.db, &fixture.audit, id, "supervisor").await?;
            assert_eq!(again.version, reverted.version);
            assert_eq!(again.state, RosterState::Planned);
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_revert_succeeds_without_audit_stream() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 16).await?;
        mark_worked(&fixture.db, &fixture.audit, record.id, "op").await?;

        let (closed, receiver) = AuditLog::channel(1);
        drop(receiver);
        let reverted = revert_to_plan(&fixture.db, &closed, record.id, "supervisor").await?;
        assert_eq!(reverted.state, RosterState::Planned);

        Ok(())
    }

    #[tokio::test]
    async fn test_revert_is_audited() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 17).await?;
        let (audit, receiver) = AuditLog::channel(16);

        mark_absence(&fixture.db, &audit, record.id, AbsenceReport::new("x", false), "op").await?;
        revert_to_plan(&fixture.db, &audit, record.id, "supervisor").await?;
        drop(audit);
        crate::core::audit::run_audit_writer(fixture.db.clone(), receiver).await;

        let entries = AuditEntry::find().all(&fixture.db).await?;
        let revert = entries
            .iter()
            .find(|e| e.action == "revert_to_plan")
            .unwrap();
        assert_eq!(revert.actor_ref, "supervisor");
        assert_eq!(revert.before_state, RosterState::Absent);
        assert_eq!(revert.after_state, RosterState::Planned);

        Ok(())
    }

    #[tokio::test]
    async fn test_covered_record_rejects_other_transitions() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 18).await?;
        mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "op",
        )
        .await?;

        let worked = mark_worked(&fixture.db, &fixture.audit, record.id, "op").await;
        assert!(matches!(worked, Err(Error::PreconditionFailed { .. })));
        let report = AbsenceReport::new("x", true);
        let absent = mark_absence(&fixture.db, &fixture.audit, record.id, report, "op").await;
        assert!(matches!(absent, Err(Error::PreconditionFailed { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_mark_leave_states() -> Result<()> {
        let fixture = setup_fixture().await?;
        let cases = [
            (LeaveKind::Paid, RosterState::OnLeavePaid),
            (LeaveKind::Unpaid, RosterState::OnLeaveUnpaid),
            (LeaveKind::Medical, RosterState::Medical),
            (LeaveKind::Vacation, RosterState::Vacation),
        ];
        for (offset, (kind, expected)) in (20..).zip(cases) {
            let record = fixture.record_on(&fixture.post, offset).await?;
            let updated = mark_leave(
                &fixture.db,
                &fixture.audit,
                record.id,
                kind,
                Some("approved".to_string()),
                "hr",
            )
            .await?;
            assert_eq!(updated.state, expected);
            assert_eq!(updated.meta.unwrap().reason(), Some("approved"));
        }

        Ok(())
    }

    #[tokio::test]
    async fn test_vacancy_coverage_then_paid_twice() -> Result<()> {
        let fixture = setup_fixture().await?;

        let outcome = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            test_date(21),
            "dispatcher",
        )
        .await?;
        assert_eq!(outcome.record.state, RosterState::WorkedByVacancyCoverage);
        assert_eq!(outcome.record.guard_id, None);
        assert_eq!(
            outcome.record.meta.as_ref().unwrap().origin(),
            Some(OvertimeOrigin::VacancyCoverage)
        );
        assert_eq!(outcome.shift.origin, OvertimeOrigin::VacancyCoverage);

        let paid = mark_paid(&fixture.db, outcome.shift.id, test_date(31), None).await?;
        assert!(paid.paid);
        let again = mark_paid(&fixture.db, outcome.shift.id, test_date(31), None).await?;
        assert!(again.paid);
        assert_eq!(again, paid);

        Ok(())
    }

    #[tokio::test]
    async fn test_vacancy_coverage_rejected_on_staffed_post() -> Result<()> {
        let fixture = setup_fixture().await?;

        let result = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.post.id,
            fixture.cover_guard.id,
            test_date(22),
            "dispatcher",
        )
        .await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));
        assert_eq!(OvertimeShift::find().count(&fixture.db).await?, 0);

        Ok(())
    }

    #[tokio::test]
    async fn test_vacancy_coverage_creates_missing_row() -> Result<()> {
        let fixture = setup_fixture().await?;
        // April was never generated
        let date = NaiveDate::from_ymd_opt(2026, 4, 2).unwrap();

        let outcome = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            date,
            "dispatcher",
        )
        .await?;
        assert_eq!(outcome.record.work_date, date);
        assert_eq!(outcome.record.post_id, fixture.vacancy.id);
        assert_eq!(outcome.record.state, RosterState::WorkedByVacancyCoverage);

        Ok(())
    }

    #[tokio::test]
    async fn test_vacancy_coverage_conflicts_with_other_guard() -> Result<()> {
        let fixture = setup_fixture().await?;
        let other = create_test_guard(&fixture.db, "Third Guard").await?;

        assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            test_date(23),
            "dispatcher",
        )
        .await?;
        let same = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            test_date(23),
            "dispatcher",
        )
        .await?;
        assert_eq!(
            shifts_for(&fixture, fixture.cover_guard.id, OvertimeOrigin::VacancyCoverage).await?,
            1
        );
        assert_eq!(same.record.state, RosterState::WorkedByVacancyCoverage);

        let result = assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            other.id,
            test_date(23),
            "dispatcher",
        )
        .await;
        assert!(matches!(result, Err(Error::Conflict { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_vacancy_row_rejects_standing_transitions() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.vacancy, 24).await?;

        let result = mark_worked(&fixture.db, &fixture.audit, record.id, "op").await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));

        let result = mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", false),
            fixture.cover_guard.id,
            "op",
        )
        .await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));

        Ok(())
    }
}
