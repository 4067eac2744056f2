//! Audit entry entity - Advisory log of roster transitions.
//!
//! Written asynchronously from the audit stream; a missing entry never means a
//! transition did not happen.

use super::roster_record::RosterState;
use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Audit entry database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "audit_entries")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Roster row the transition applied to
    pub roster_id: i64,
    /// Caller-supplied actor reference
    pub actor_ref: String,
    /// Transition name (see `TransitionAction::as_str`)
    pub action: String,
    pub before_state: RosterState,
    pub after_state: RosterState,
    pub recorded_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
