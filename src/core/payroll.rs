//! Payroll inputs derived from the roster.
//!
//! [`classify_day`] is a pure function of a row's state and side-record, so the
//! pay rules can be tested without a database. [`monthly_pay_summary`] applies it
//! to a guard's standing rows and adds the overtime they worked elsewhere.

use crate::{
    core::{overtime, registry, roster},
    entities::{RosterState, TransitionMeta},
    errors::Result,
};
use sea_orm::DatabaseConnection;
use serde::Serialize;

/// How a roster day counts toward the standing guard's pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayClass {
    /// Paid as a normal day
    Payable,
    /// Not paid, but not held against the guard
    NonPayable,
    /// Not paid and deducted (absence without notice)
    Deductible,
}

/// Classifies one day from the standing guard's point of view.
///
/// Absences (covered or not) are deductible unless the guard gave notice.
/// Vacancy coverage rows have no standing guard and are never payable here;
/// the covering guard is paid through the overtime ledger.
#[must_use]
pub fn classify_day(state: RosterState, meta: Option<&TransitionMeta>) -> PayClass {
    match state {
        RosterState::Planned
        | RosterState::Worked
        | RosterState::OnLeavePaid
        | RosterState::Vacation => PayClass::Payable,
        RosterState::Absent | RosterState::WorkedByReplacement => {
            if meta.and_then(TransitionMeta::notice_given).unwrap_or(false) {
                PayClass::NonPayable
            } else {
                PayClass::Deductible
            }
        }
        RosterState::Free
        | RosterState::OnLeaveUnpaid
        | RosterState::Medical
        | RosterState::WorkedByVacancyCoverage => PayClass::NonPayable,
    }
}

/// A guard's month as payroll sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyPaySummary {
    /// Guard the summary is for
    pub guard_id: i64,
    /// Calendar year
    pub year: i32,
    /// Calendar month, 1 to 12
    pub month: u32,
    /// Standing days paid in full
    pub payable_days: u32,
    /// Standing days neither paid nor deducted
    pub non_payable_days: u32,
    /// Unannounced absences, deducted from pay
    pub deductible_days: u32,
    /// Overtime shifts worked in the month, paid or not
    pub overtime_shifts: usize,
    /// Value of those shifts
    pub overtime_value: f64,
    /// Value still owed
    pub overtime_unpaid_value: f64,
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Summarizes a guard's month: their standing rows by pay class, plus their
/// overtime shifts.
///
/// # Errors
/// Returns `NotFound` if the guard does not exist, or an error for an invalid
/// month.
pub async fn monthly_pay_summary(
    db: &DatabaseConnection,
    guard_id: i64,
    year: i32,
    month: u32,
) -> Result<MonthlyPaySummary> {
    registry::require_guard(db, guard_id).await?;
    let (first, last) = roster::month_bounds(year, month)?;

    let mut summary = MonthlyPaySummary {
        guard_id,
        year,
        month,
        payable_days: 0,
        non_payable_days: 0,
        deductible_days: 0,
        overtime_shifts: 0,
        overtime_value: 0.0,
        overtime_unpaid_value: 0.0,
    };

    for record in roster::list_roster_for_guard_in_month(db, guard_id, year, month).await? {
        match classify_day(record.state, record.meta.as_ref()) {
            PayClass::Payable => summary.payable_days += 1,
            PayClass::NonPayable => summary.non_payable_days += 1,
            PayClass::Deductible => summary.deductible_days += 1,
        }
    }

    let shifts = overtime::list_shifts_for_guard(db, guard_id, first, last).await?;
    summary.overtime_shifts = shifts.len();
    summary.overtime_value = round_cents(shifts.iter().map(|s| s.value).sum());
    summary.overtime_unpaid_value =
        round_cents(shifts.iter().filter(|s| !s.paid).map(|s| s.value).sum());

    Ok(summary)
}
