//! Typed audit side-record stored in `roster_records.meta`.
//!
//! One [`MetaDetail`] variant per transition kind, serialised as tagged JSON.
//! The record's `state` column stays authoritative; nothing here duplicates it.

use super::overtime_shift::OvertimeOrigin;
use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};

/// Name of the transition that last wrote a roster row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionAction {
    /// Standing guard worked
    MarkWorked,
    /// Absence without coverage
    MarkAbsence,
    /// Absence covered by another guard
    MarkAbsenceWithCoverage,
    /// Vacancy covered for the day
    AssignCoverageToVacancy,
    /// Leave recorded
    MarkLeave,
    /// Rest day assigned
    MarkDayOff,
    /// Row reset to its plan
    RevertToPlan,
}

impl TransitionAction {
    /// Stable name used in logs and the audit stream.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MarkWorked => "mark_worked",
            Self::MarkAbsence => "mark_absence",
            Self::MarkAbsenceWithCoverage => "mark_absence_with_coverage",
            Self::AssignCoverageToVacancy => "assign_coverage_to_vacancy",
            Self::MarkLeave => "mark_leave",
            Self::MarkDayOff => "mark_day_off",
            Self::RevertToPlan => "revert_to_plan",
        }
    }
}

/// Per-transition payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetaDetail {
    /// Plain attendance; carries no absence markers
    Worked,
    /// Uncovered absence
    Absence {
        /// Reason code given by the operator
        reason: String,
        /// Whether the guard warned in advance
        notice_given: bool,
    },
    /// Someone other than the standing guard worked the day
    Coverage {
        /// Replacement or vacancy coverage
        origin: OvertimeOrigin,
        /// Guard who covered
        coverage_guard_id: i64,
        /// Absence reason, for replacements
        reason: Option<String>,
        /// Absence notice, for replacements
        notice_given: Option<bool>,
    },
    /// Any of the leave states
    Leave {
        /// Optional reason for the leave
        reason: Option<String>,
    },
    /// Rest day assigned by an operator
    DayOff,
}

/// Audit side-record of the last transition applied to a roster row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult)]
pub struct TransitionMeta {
    /// Transition that wrote the row
    pub action: TransitionAction,
    /// Operator or system that requested it
    pub actor_ref: String,
    /// When it was applied
    pub timestamp: DateTime<Utc>,
    /// Transition-specific payload
    pub detail: MetaDetail,
}

impl TransitionMeta {
    /// Stamps a new side-record with the current time.
    pub fn new(action: TransitionAction, actor_ref: &str, detail: MetaDetail) -> Self {
        Self {
            action,
            actor_ref: actor_ref.to_string(),
            timestamp: Utc::now(),
            detail,
        }
    }

    /// Guard covering the day, for coverage transitions.
    #[must_use]
    pub const fn coverage_guard_id(&self) -> Option<i64> {
        match self.detail {
            MetaDetail::Coverage {
                coverage_guard_id, ..
            } => Some(coverage_guard_id),
            _ => None,
        }
    }

    /// Overtime origin of a coverage transition.
    #[must_use]
    pub const fn origin(&self) -> Option<OvertimeOrigin> {
        match self.detail {
            MetaDetail::Coverage { origin, .. } => Some(origin),
            _ => None,
        }
    }

    /// Whether the absence behind this record was announced in advance.
    /// None when the transition carries no absence.
    #[must_use]
    pub const fn notice_given(&self) -> Option<bool> {
        match self.detail {
            MetaDetail::Absence { notice_given, .. } => Some(notice_given),
            MetaDetail::Coverage { notice_given, .. } => notice_given,
            _ => None,
        }
    }

    /// Reason given for an absence, coverage or leave.
    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        match &self.detail {
            MetaDetail::Absence { reason, .. } => Some(reason.as_str()),
            MetaDetail::Coverage { reason, .. } | MetaDetail::Leave { reason } => {
                reason.as_deref()
            }
            MetaDetail::Worked | MetaDetail::DayOff => None,
        }
    }
}
