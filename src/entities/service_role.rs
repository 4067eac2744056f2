//! Service role entity - A staffing role shared by many operational posts.
//!
//! The role carries everything a post needs to be scheduled and paid: the shift
//! window, the number of paid hours per shift, the hourly rate used to value
//! overtime, and the work/rest cycle (for example four days on, four days off).

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Service role database model
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "service_roles")]
pub struct Model {
    /// Unique identifier for the role
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Human-readable role name (e.g., "Day 4x4", "Night 5x2")
    #[sea_orm(unique)]
    pub name: String,
    /// Local time the shift starts
    pub shift_start: Time,
    /// Local time the shift ends; earlier than `shift_start` for overnight shifts
    pub shift_end: Time,
    /// Paid hours per shift
    pub shift_hours: f64,
    /// Hourly rate used to value overtime shifts
    pub hourly_rate: f64,
    /// Consecutive working days in one cycle
    pub work_days: i32,
    /// Consecutive rest days in one cycle
    pub rest_days: i32,
}

/// Defines relationships between `ServiceRole` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One role defines many posts
    #[sea_orm(has_many = "super::operational_post::Entity")]
    Posts,
}

impl Related<super::operational_post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl Model {
    /// Length of one work/rest cycle in days.
    #[must_use]
    pub const fn cycle_length(&self) -> i32 {
        self.work_days + self.rest_days
    }

    /// Value of one shift under this role, rounded to cents.
    #[must_use]
    pub fn shift_value(&self) -> f64 {
        (self.shift_hours * self.hourly_rate * 100.0).round() / 100.0
    }
}
