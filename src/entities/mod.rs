//! Entity module - Contains all SeaORM entity definitions for the database.
//! These entities represent the database tables and their relationships.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod audit_entry;
pub mod guard;
pub mod installation;
pub mod operational_post;
pub mod overtime_shift;
pub mod roster_meta;
pub mod roster_record;
pub mod service_role;

// Re-export specific types to avoid conflicts
pub use audit_entry::{Entity as AuditEntry, Model as AuditEntryModel};
pub use guard::{Column as GuardColumn, Entity as Guard, Model as GuardModel};
pub use installation::{
    Column as InstallationColumn, Entity as Installation, Model as InstallationModel,
};
pub use operational_post::{
    Column as OperationalPostColumn, Entity as OperationalPost, Model as OperationalPostModel,
};
pub use overtime_shift::{
    Column as OvertimeShiftColumn, Entity as OvertimeShift, Model as OvertimeShiftModel,
    OvertimeOrigin,
};
pub use roster_meta::{MetaDetail, TransitionAction, TransitionMeta};
pub use roster_record::{
    Column as RosterRecordColumn, Entity as RosterRecord, Model as RosterRecordModel, RosterState,
};
pub use service_role::{
    Column as ServiceRoleColumn, Entity as ServiceRole, Model as ServiceRoleModel,
};
