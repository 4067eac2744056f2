//! Daily operations view - What every post of an installation looks like today.
//!
//! The view is recomputed on demand from the roster, the post registry and the
//! guard directory. It never writes. The check-in plan derived from it tells the
//! dispatch desk when to call each staffed post.

use crate::{
    core::{registry, roster::list_roster_for_posts_on},
    entities::{Guard, RosterState, ServiceRole, guard, roster_record, service_role},
    errors::{Error, Result},
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use sea_orm::{ColumnTrait, ConnectionTrait, EntityTrait, QueryFilter};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, instrument};

/// UI-facing status of a post for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StatusTag {
    /// Standing guard expected on the post
    Plan,
    /// Standing guard worked the shift
    Worked,
    /// Another guard covered an absence
    Replaced,
    /// Guard absent and nobody covering
    Absent,
    /// Rest day
    Free,
    /// Paid, unpaid or medical leave
    OnLeave,
    /// Vacation day
    Vacation,
    /// Vacancy with nobody assigned
    VacancyOpen,
    /// Vacancy covered for the day
    VacancyCovered,
    /// Staffed post with no roster row for the day
    Unrostered,
}

impl StatusTag {
    /// Tag as shown to operators.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Plan => "plan",
            Self::Worked => "worked",
            Self::Replaced => "replaced",
            Self::Absent => "absent",
            Self::Free => "free",
            Self::OnLeave => "on-leave",
            Self::Vacation => "vacation",
            Self::VacancyOpen => "vacancy-open",
            Self::VacancyCovered => "vacancy-covered",
            Self::Unrostered => "unrostered",
        }
    }

    /// Whether somebody is expected on the post, and so due for check-in calls.
    #[must_use]
    pub const fn is_staffed(self) -> bool {
        matches!(
            self,
            Self::Plan | Self::Worked | Self::Replaced | Self::VacancyCovered
        )
    }
}

impl std::fmt::Display for StatusTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derives the tag from a post's vacancy flag and its row for the day.
#[must_use]
pub fn status_tag(post_is_vacancy: bool, record: Option<&roster_record::Model>) -> StatusTag {
    let Some(record) = record else {
        return if post_is_vacancy {
            StatusTag::VacancyOpen
        } else {
            StatusTag::Unrostered
        };
    };

    match record.state {
        RosterState::Planned if record.guard_id.is_none() => StatusTag::VacancyOpen,
        RosterState::Planned => StatusTag::Plan,
        RosterState::Worked => StatusTag::Worked,
        RosterState::WorkedByReplacement => StatusTag::Replaced,
        RosterState::WorkedByVacancyCoverage => StatusTag::VacancyCovered,
        RosterState::Absent => StatusTag::Absent,
        RosterState::Free => StatusTag::Free,
        RosterState::OnLeavePaid | RosterState::OnLeaveUnpaid | RosterState::Medical => {
            StatusTag::OnLeave
        }
        RosterState::Vacation => StatusTag::Vacation,
    }
}

/// The guard shown for a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedGuard {
    /// Guard id
    pub id: i64,
    /// Display name
    pub full_name: String,
    /// Contact number for check-in calls
    pub phone: Option<String>,
    /// False when the guard is covering for someone else
    pub standing: bool,
}

/// One row of the daily operations view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyPostStatus {
    /// Post id
    pub post_id: i64,
    /// Post name
    pub post_name: String,
    /// Name of the post's service role
    pub role_name: String,
    /// None when the day was never generated for this post
    pub roster_id: Option<i64>,
    /// Roster state of the day, if generated
    pub state: Option<RosterState>,
    /// Operator-facing status
    pub tag: StatusTag,
    /// Guard on the post for the day, if any
    pub guard: Option<ResolvedGuard>,
    /// Shift start from the role
    pub shift_start: NaiveTime,
    /// Shift end from the role; earlier than the start for overnight shifts
    pub shift_end: NaiveTime,
}

/// Builds the view for every active post of an installation, ordered by post id.
///
/// Should a post ever have more than one row for the day, the most recently
/// updated one is used.
///
/// # Errors
/// Returns `NotFound` if the installation or a post's role does not exist.
#[instrument(skip(db))]
pub async fn daily_operations_view<C>(
    db: &C,
    installation_id: i64,
    date: NaiveDate,
) -> Result<Vec<DailyPostStatus>>
where
    C: ConnectionTrait,
{
    registry::get_installation_by_id(db, installation_id)
        .await?
        .ok_or_else(|| Error::not_found("installation", installation_id))?;

    let posts = registry::list_active_posts(db, installation_id).await?;
    if posts.is_empty() {
        return Ok(Vec::new());
    }

    let role_ids: Vec<i64> = posts.iter().map(|p| p.role_id).collect();
    let roles: HashMap<i64, service_role::Model> = ServiceRole::find()
        .filter(service_role::Column::Id.is_in(role_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|role| (role.id, role))
        .collect();

    let post_ids = posts.iter().map(|p| p.id).collect();
    let mut latest: HashMap<i64, roster_record::Model> = HashMap::new();
    for record in list_roster_for_posts_on(db, post_ids, date).await? {
        if latest.contains_key(&record.post_id) {
            debug!(post_id = record.post_id, roster_id = record.id, "Skipping older duplicate row");
            continue;
        }
        latest.insert(record.post_id, record);
    }

    let resolved: HashMap<i64, (i64, bool)> = posts
        .iter()
        .filter_map(|post| {
            resolve_guard_id(post.guard_id, latest.get(&post.id)).map(|g| (post.id, g))
        })
        .collect();
    let guard_ids: Vec<i64> = resolved.values().map(|(id, _)| *id).collect();
    let guards: HashMap<i64, guard::Model> = Guard::find()
        .filter(guard::Column::Id.is_in(guard_ids))
        .all(db)
        .await?
        .into_iter()
        .map(|g| (g.id, g))
        .collect();

    posts
        .into_iter()
        .map(|post| {
            let role = roles
                .get(&post.role_id)
                .ok_or_else(|| Error::not_found("service role", post.role_id))?;
            let record = latest.get(&post.id);
            let guard = resolved.get(&post.id).and_then(|(guard_id, standing)| {
                guards.get(guard_id).map(|g| ResolvedGuard {
                    id: g.id,
                    full_name: g.full_name.clone(),
                    phone: g.phone.clone(),
                    standing: *standing,
                })
            });

            Ok(DailyPostStatus {
                post_id: post.id,
                post_name: post.name,
                role_name: role.name.clone(),
                roster_id: record.map(|r| r.id),
                state: record.map(|r| r.state),
                tag: status_tag(post.is_vacancy, record),
                guard,
                shift_start: role.shift_start,
                shift_end: role.shift_end,
            })
        })
        .collect()
}

/// Guard id to show and whether they are the standing guard. Coverage rows
/// show the coverage guard; days without a row fall back to the post.
fn resolve_guard_id(
    post_guard: Option<i64>,
    record: Option<&roster_record::Model>,
) -> Option<(i64, bool)> {
    match record {
        Some(record) if record.state.is_coverage() => {
            record.effective_guard_id().map(|id| (id, false))
        }
        Some(record) => record.guard_id.map(|id| (id, true)),
        None => post_guard.map(|id| (id, true)),
    }
}

/// A scheduled check-in call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckIn {
    /// Post to call
    pub post_id: i64,
    /// When to call
    pub at: NaiveDateTime,
}

/// Check-in calls for the staffed posts of a view, in time order.
///
/// Calls start at shift start and repeat every `interval_minutes` while the
/// shift lasts. A shift whose end is not after its start runs overnight into
/// the next day. An interval of zero schedules one call at shift start.
#[must_use]
pub fn check_in_plan(
    rows: &[DailyPostStatus],
    date: NaiveDate,
    interval_minutes: u32,
) -> Vec<CheckIn> {
    let step = Duration::minutes(i64::from(interval_minutes));
    let mut plan = Vec::new();

    for row in rows.iter().filter(|row| row.tag.is_staffed()) {
        let start = date.and_time(row.shift_start);
        let mut end = date.and_time(row.shift_end);
        if end <= start {
            end += Duration::days(1);
        }

        if interval_minutes == 0 {
            plan.push(CheckIn {
                post_id: row.post_id,
                at: start,
            });
            continue;
        }

        let mut at = start;
        while at < end {
            plan.push(CheckIn {
                post_id: row.post_id,
                at,
            });
            at += step;
        }
    }

    plan.sort_by_key(|check_in| (check_in.at, check_in.post_id));
    plan
}
