//! Roster record entity - One row per operational post per calendar day.
//!
//! `state` is the single source of truth for what happened on the day. The
//! coverage origin that used to live in free-form metadata is folded into the
//! state itself (`WorkedByReplacement`, `WorkedByVacancyCoverage`), and the
//! audit side-record is the typed [`TransitionMeta`].

use super::overtime_shift::OvertimeOrigin;
use super::roster_meta::TransitionMeta;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Daily state of a guard-post assignment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum RosterState {
    /// Scheduled, nothing recorded yet
    #[sea_orm(string_value = "planned")]
    Planned,
    /// The standing guard worked the shift
    #[sea_orm(string_value = "worked")]
    Worked,
    /// The standing guard was absent and another guard covered
    #[sea_orm(string_value = "worked_by_replacement")]
    WorkedByReplacement,
    /// A vacant post was covered for the day
    #[sea_orm(string_value = "worked_by_vacancy_coverage")]
    WorkedByVacancyCoverage,
    /// The standing guard was absent and nobody covered
    #[sea_orm(string_value = "absent")]
    Absent,
    /// Rest day in the work/rest cycle
    #[sea_orm(string_value = "free")]
    Free,
    /// Paid leave
    #[sea_orm(string_value = "leave_paid")]
    OnLeavePaid,
    /// Unpaid leave
    #[sea_orm(string_value = "leave_unpaid")]
    OnLeaveUnpaid,
    /// Medical leave
    #[sea_orm(string_value = "medical_leave")]
    Medical,
    /// Vacation day
    #[sea_orm(string_value = "vacation")]
    Vacation,
}

impl RosterState {
    /// Whether the day was worked by someone other than the standing guard.
    #[must_use]
    pub const fn is_coverage(self) -> bool {
        matches!(self, Self::WorkedByReplacement | Self::WorkedByVacancyCoverage)
    }

    /// Whether somebody is (or is expected to be) on the post.
    #[must_use]
    pub const fn is_staffed(self) -> bool {
        matches!(
            self,
            Self::Planned | Self::Worked | Self::WorkedByReplacement | Self::WorkedByVacancyCoverage
        )
    }

    /// Whether the state is one of the leave states.
    #[must_use]
    pub const fn is_leave(self) -> bool {
        matches!(
            self,
            Self::OnLeavePaid | Self::OnLeaveUnpaid | Self::Medical | Self::Vacation
        )
    }

    /// Origin of the overtime shift backing a coverage state.
    #[must_use]
    pub const fn coverage_origin(self) -> Option<OvertimeOrigin> {
        match self {
            Self::WorkedByReplacement => Some(OvertimeOrigin::Replacement),
            Self::WorkedByVacancyCoverage => Some(OvertimeOrigin::VacancyCoverage),
            _ => None,
        }
    }
}

/// Roster record database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "roster_records")]
pub struct Model {
    /// Unique identifier for the roster row
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Post this row schedules
    pub post_id: i64,
    /// Standing guard for the day; None for vacancy days or after the guard was cleared
    pub guard_id: Option<i64>,
    /// Calendar day
    pub work_date: Date,
    /// Current state
    pub state: RosterState,
    /// Audit side-record of the last transition, None when planned
    #[sea_orm(column_type = "Json", nullable)]
    pub meta: Option<TransitionMeta>,
    /// Incremented on every write; used for compare-and-swap updates
    pub version: i32,
    /// When the row was last written
    pub updated_at: DateTimeUtc,
}

/// Defines relationships between `RosterRecord` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each roster row belongs to one post
    #[sea_orm(
        belongs_to = "super::operational_post::Entity",
        from = "Column::PostId",
        to = "super::operational_post::Column::Id"
    )]
    Post,
}

impl Related<super::operational_post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Post.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Guard actually on the post for the day: the coverage guard for coverage
    /// states, the standing guard otherwise.
    #[must_use]
    pub fn effective_guard_id(&self) -> Option<i64> {
        if self.state.is_coverage() {
            self.meta.as_ref().and_then(TransitionMeta::coverage_guard_id)
        } else {
            self.guard_id
        }
    }
}
