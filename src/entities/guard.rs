//! Guard entity - Identity fields joined into the daily operations view.
//!
//! The ledger itself only references guards by id; the display fields are kept
//! here so the view can be answered without a round-trip to the identity service.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Guard database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "guards")]
pub struct Model {
    /// Unique identifier for the guard
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Full display name
    pub full_name: String,
    /// Contact phone, if known
    pub phone: Option<String>,
    /// Inactive guards cannot be assigned to posts or coverage
    pub active: bool,
}

/// `Guard` relationships are resolved through posts and roster rows
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
