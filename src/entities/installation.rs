//! Installation entity - A client site where posts are staffed.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Installation database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "installations")]
pub struct Model {
    /// Unique identifier for the installation
    #[sea_orm(primary_key)]
    pub id: i64,
    /// Display name of the site
    #[sea_orm(unique)]
    pub name: String,
    /// Inactive installations keep their history but get no new rosters
    pub active: bool,
}

/// Defines relationships between Installation and other entities
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    /// One installation has many posts
    #[sea_orm(has_many = "super::operational_post::Entity")]
    Posts,
}

impl Related<super::operational_post::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Posts.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
