//! Overtime shift entity - A guard-day worked outside the guard's standing post.
//!
//! Rows are created as a side effect of coverage transitions and are never
//! deleted. `value` is fixed at creation; only the payment fields change later.
//! The link to the roster is logical (guard + post + date) so a shift stays valid
//! after the roster row it came from has been reverted.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Why the overtime was worked
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "kebab-case")]
pub enum OvertimeOrigin {
    /// Covered for an absent standing guard
    #[sea_orm(string_value = "replacement")]
    Replacement,
    /// Covered a post that has no standing guard
    #[sea_orm(string_value = "vacancy-coverage")]
    VacancyCoverage,
}

/// Overtime shift database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "overtime_shifts")]
pub struct Model {
    /// Unique identifier for the shift
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Guard who worked the shift
    pub guard_id: i64,
    /// Post that was covered
    pub post_id: i64,
    /// Day that was covered
    pub shift_date: Date,
    /// Replacement or vacancy coverage
    pub origin: OvertimeOrigin,
    /// Amount owed, computed once from the post's role
    pub value: f64,
    /// Whether payroll has paid the shift
    pub paid: bool,
    /// Date the shift was paid
    pub paid_on: Option<Date>,
    /// Free-text payment note
    pub payment_note: Option<String>,
    /// When the shift was recorded
    pub created_at: DateTimeUtc,
}

/// Overtime shifts link to posts and guards logically, not through foreign keys
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
