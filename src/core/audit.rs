//! Audit stream - Advisory, fire-and-forget log of roster transitions.
//!
//! Transitions hand an [`AuditRecord`] to [`AuditLog::record`], which never
//! blocks and never fails: a full or closed channel drops the entry with a
//! warning. A separate writer task drains the channel into `audit_entries`.

use crate::entities::{RosterState, TransitionAction, audit_entry};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// One transition as seen by the audit stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    /// Roster row the transition applied to
    pub roster_id: i64,
    /// Who requested it
    pub actor_ref: String,
    /// Which transition it was
    pub action: TransitionAction,
    /// State before the transition
    pub before: RosterState,
    /// State after the transition
    pub after: RosterState,
    /// When the entry was produced
    pub recorded_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Builds an entry stamped with the current time.
    #[must_use]
    pub fn new(
        roster_id: i64,
        actor_ref: &str,
        action: TransitionAction,
        before: RosterState,
        after: RosterState,
    ) -> Self {
        Self {
            roster_id,
            actor_ref: actor_ref.to_string(),
            action,
            before,
            after,
            recorded_at: Utc::now(),
        }
    }
}

/// Receiving half handed to [`spawn_audit_writer`].
pub type AuditReceiver = mpsc::Receiver<AuditRecord>;

/// Sending half of the audit stream. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AuditLog {
    sender: Option<mpsc::Sender<AuditRecord>>,
}

impl AuditLog {
    /// Creates a bounded audit stream.
    #[must_use]
    pub fn channel(capacity: usize) -> (Self, AuditReceiver) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (
            Self {
                sender: Some(sender),
            },
            receiver,
        )
    }

    /// An audit log that discards everything.
    #[must_use]
    pub const fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queues an entry. Failures are logged and swallowed.
    pub fn record(&self, entry: AuditRecord) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(err) = sender.try_send(entry) {
            warn!(error = %err, "Dropping audit entry");
        }
    }
}

async fn write_entry(db: &DatabaseConnection, entry: AuditRecord) -> crate::errors::Result<()> {
    audit_entry::ActiveModel {
        roster_id: Set(entry.roster_id),
        actor_ref: Set(entry.actor_ref),
        action: Set(entry.action.as_str().to_string()),
        before_state: Set(entry.before),
        after_state: Set(entry.after),
        recorded_at: Set(entry.recorded_at),
        ..Default::default()
    }
    .insert(db)
    .await?;
    Ok(())
}

/// Drains the stream into the database until every sender is dropped.
/// Entries that fail to insert are logged and skipped.
pub async fn run_audit_writer(db: DatabaseConnection, mut receiver: AuditReceiver) {
    while let Some(entry) = receiver.recv().await {
        let roster_id = entry.roster_id;
        match write_entry(&db, entry).await {
            Ok(()) => debug!(roster_id, "Audit entry written"),
            Err(err) => warn!(roster_id, error = %err, "Failed to write audit entry"),
        }
    }
    debug!("Audit stream closed");
}

/// Spawns [`run_audit_writer`] on the current runtime.
#[must_use]
pub fn spawn_audit_writer(db: DatabaseConnection, receiver: AuditReceiver) -> JoinHandle<()> {
    tokio::spawn(run_audit_writer(db, receiver))
}
