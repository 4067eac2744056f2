//! Operational post entity - A staffing slot at an installation under a service role.
//!
//! A post is a vacancy ("pending post to cover") exactly when it has no standing
//! guard. `is_vacancy` is stored for cheap filtering and is always written
//! together with `guard_id`.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Operational post database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "operational_posts")]
pub struct Model {
    /// Unique identifier for the post
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Installation the post belongs to
    pub installation_id: i64,
    /// Role defining shift window, pay rate and work/rest cycle
    pub role_id: i64,
    /// Display name (e.g., "Main gate - day")
    pub name: String,
    /// True when the post has no standing guard
    pub is_vacancy: bool,
    /// Standing guard, None while the post is a vacancy
    pub guard_id: Option<i64>,
    /// Deactivated posts are kept for the history that references them
    pub active: bool,
    /// First working day of the post's work/rest cycle
    pub cycle_start: Date,
}

/// Defines relationships between `OperationalPost` and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// Each post belongs to one installation
    #[sea_orm(
        belongs_to = "super::installation::Entity",
        from = "Column::InstallationId",
        to = "super::installation::Column::Id"
    )]
    Installation,
    /// Each post is staffed under one role
    #[sea_orm(
        belongs_to = "super::service_role::Entity",
        from = "Column::RoleId",
        to = "super::service_role::Column::Id"
    )]
    Role,
    /// One post has one roster row per day
    #[sea_orm(has_many = "super::roster_record::Entity")]
    RosterRecords,
}

impl Related<super::installation::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Installation.def()
    }
}

impl Related<super::service_role::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Role.def()
    }
}

impl Related<super::roster_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::RosterRecords.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
