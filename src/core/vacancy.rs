//! Vacancy (PPC) resolver - Open posts and who can cover them.
//!
//! A vacancy is an active post without a standing guard. It is open on a given
//! day while that day's roster row is still `planned` (or was never generated).

use crate::{
    core::{
        audit::AuditLog,
        registry,
        roster::{list_roster_for_posts_on, reassign_untouched_rows},
        transition::{CoverageOutcome, assign_coverage_to_vacancy},
    },
    entities::{Guard, OperationalPost, RosterState, guard, operational_post, roster_record},
    errors::{Error, Result},
};
use chrono::NaiveDate;
use sea_orm::{QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, instrument};

/// Lists the vacancies of an installation that are still open on `date`,
/// ordered by post id.
pub async fn list_vacancies_for_installation<C>(
    db: &C,
    installation_id: i64,
    date: NaiveDate,
) -> Result<Vec<operational_post::Model>>
where
    C: ConnectionTrait,
{
    let vacancies = OperationalPost::find()
        .filter(operational_post::Column::InstallationId.eq(installation_id))
        .filter(operational_post::Column::Active.eq(true))
        .filter(operational_post::Column::IsVacancy.eq(true))
        .order_by_asc(operational_post::Column::Id)
        .all(db)
        .await?;

    let post_ids = vacancies.iter().map(|p| p.id).collect();
    // Latest row per post wins
    let mut day_state: HashMap<i64, RosterState> = HashMap::new();
    for record in list_roster_for_posts_on(db, post_ids, date).await? {
        day_state.entry(record.post_id).or_insert(record.state);
    }

    Ok(vacancies
        .into_iter()
        .filter(|post| {
            day_state
                .get(&post.id)
                .is_none_or(|state| *state == RosterState::Planned)
        })
        .collect())
}

/// Gives a vacant post a standing guard from `effective_from` onwards.
///
/// Generated rows from that day on that no transition has written yet are
/// handed to the guard in the same transaction. Earlier days and rows that
/// already carry a transition keep their history.
///
/// # Errors
/// - `NotFound` if the post or guard does not exist
/// - `PreconditionFailed` if the post is inactive, already staffed by another
///   guard, or the guard is inactive
/// - [`Error::GuardAlreadyPosted`] if the guard holds another active post
#[instrument(skip(db))]
pub async fn resolve_vacancy_permanently(
    db: &DatabaseConnection,
    post_id: i64,
    guard_id: i64,
    effective_from: NaiveDate,
) -> Result<operational_post::Model> {
    let txn = db.begin().await?;
    let post = registry::require_post(&txn, post_id).await?;

    if post.guard_id == Some(guard_id) {
        debug!(post_id, guard_id, "Guard already holds this post");
        return Ok(post);
    }
    if !post.active {
        return Err(Error::precondition(format!("post {post_id} is inactive")));
    }
    if post.guard_id.is_some() {
        return Err(Error::precondition(format!(
            "post {post_id} is not a vacancy"
        )));
    }
    registry::require_active_guard(&txn, guard_id).await?;
    registry::ensure_guard_unposted(&txn, guard_id, Some(post_id)).await?;

    let mut model: operational_post::ActiveModel = post.into();
    model.guard_id = Set(Some(guard_id));
    model.is_vacancy = Set(false);
    let updated = model.update(&txn).await?;
    let rows = reassign_untouched_rows(&txn, post_id, effective_from, Some(guard_id)).await?;
    txn.commit().await?;

    info!(post_id, guard_id, rows, "Vacancy resolved with a standing guard");
    Ok(updated)
}

/// Active guards free to cover a post on `date`, ordered by name.
///
/// A guard is busy when some row that day is staffed by them, either as
/// standing guard (`planned`/`worked`) or as the coverage guard. `name_filter`
/// matches case-insensitively anywhere in the name.
pub async fn find_coverage_candidates(
    db: &DatabaseConnection,
    date: NaiveDate,
    name_filter: Option<&str>,
) -> Result<Vec<guard::Model>> {
    let all_posts: Vec<i64> = OperationalPost::find()
        .select_only()
        .column(operational_post::Column::Id)
        .into_tuple()
        .all(db)
        .await?;

    let busy: HashSet<i64> = list_roster_for_posts_on(db, all_posts, date)
        .await?
        .iter()
        .filter(|record| record.state.is_staffed())
        .filter_map(roster_record::Model::effective_guard_id)
        .collect();

    let needle = name_filter
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase);

    let guards = Guard::find()
        .filter(guard::Column::Active.eq(true))
        .order_by_asc(guard::Column::FullName)
        .order_by_asc(guard::Column::Id)
        .all(db)
        .await?;

    Ok(guards
        .into_iter()
        .filter(|g| !busy.contains(&g.id))
        .filter(|g| {
            needle
                .as_ref()
                .is_none_or(|n| g.full_name.to_lowercase().contains(n))
        })
        .collect())
}

/// Assigns the guard to the first open vacancy of the installation on `date`.
/// Returns None when nothing is open.
///
/// # Errors
/// Same as [`assign_coverage_to_vacancy`].
#[instrument(skip(db, audit))]
pub async fn cover_next_vacancy(
    db: &DatabaseConnection,
    audit: &AuditLog,
    installation_id: i64,
    guard_id: i64,
    date: NaiveDate,
    actor_ref: &str,
) -> Result<Option<CoverageOutcome>> {
    let Some(post) = list_vacancies_for_installation(db, installation_id, date)
        .await?
        .into_iter()
        .next()
    else {
        debug!(installation_id, %date, "No open vacancy");
        return Ok(None);
    };

    assign_coverage_to_vacancy(db, audit, post.id, guard_id, date, actor_ref)
        .await
        .map(Some)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::core::registry::{NewPost, create_post, get_post_by_id, release_guard_from_post};
    use crate::core::roster::list_roster_for_post;
    use crate::core::daily_view::{StatusTag, daily_operations_view};
    use crate::core::transition::{AbsenceReport, mark_absence_with_coverage, mark_worked};
    use crate::test_utils::*;

    async fn open_on(fixture: &Fixture, day: u32) -> Result<Vec<operational_post::Model>> {
        list_vacancies_for_installation(&fixture.db, fixture.installation.id, test_date(day)).await
    }

    #[tokio::test]
    async fn test_list_vacancies_open_until_covered() -> Result<()> {
        let fixture = setup_fixture().await?;

        let open = open_on(&fixture, 3).await?;
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].id, fixture.vacancy.id);

        assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            fixture.cover_guard.id,
            test_date(3),
            "dispatcher",
        )
        .await?;

        let open = open_on(&fixture, 3).await?;
        assert!(open.is_empty());
        // Other days stay open
        let open = open_on(&fixture, 4).await?;
        assert_eq!(open.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_vacancies_includes_ungenerated_days() -> Result<()> {
        let fixture = setup_fixture().await?;
        let date = NaiveDate::from_ymd_opt(2026, 5, 1).unwrap();

        let open =
            list_vacancies_for_installation(&fixture.db, fixture.installation.id, date).await?;
        assert_eq!(open.len(), 1);

        Ok(())
    }

    #[tokio::test]
    async fn test_list_vacancies_ordered_by_post() -> Result<()> {
        let fixture = setup_fixture().await?;
        let second = create_post(
            &fixture.db,
            NewPost {
                installation_id: fixture.installation.id,
                role_id: fixture.role.id,
                name: "Control Room".to_string(),
                guard_id: None,
                cycle_start: test_date(1),
            },
        )
        .await?;

        let open = open_on(&fixture, 6).await?;
        let ids: Vec<i64> = open.iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![fixture.vacancy.id, second.id]);

        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_vacancy_permanently() -> Result<()> {
        let fixture = setup_fixture().await?;
        let guard_id = fixture.cover_guard.id;

        let resolved =
            resolve_vacancy_permanently(&fixture.db, fixture.vacancy.id, guard_id, test_date(15))
                .await?;
        assert_eq!(resolved.guard_id, Some(guard_id));
        assert!(!resolved.is_vacancy);

        // Days before the resolution stay vacancy days, later ones get the guard
        let rows = list_roster_for_post(&fixture.db, fixture.vacancy.id, 2026, 3).await?;
        for row in &rows {
            let expected = (row.work_date >= test_date(15)).then_some(guard_id);
            assert_eq!(row.guard_id, expected, "day {}", row.work_date);
        }

        let open = open_on(&fixture, 5).await?;
        assert!(open.is_empty());

        // Repeating is harmless
        let again =
            resolve_vacancy_permanently(&fixture.db, fixture.vacancy.id, guard_id, test_date(15))
                .await?;
        assert_eq!(again, resolved);

        Ok(())
    }

    #[tokio::test]
    async fn test_resolved_vacancy_days_accept_transitions() -> Result<()> {
        let fixture = setup_fixture().await?;
        let guard_id = fixture.cover_guard.id;
        let spare = create_test_guard(&fixture.db, "Ana Spare").await?;

        // Covered before the resolution; this day must keep its coverage
        assign_coverage_to_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.vacancy.id,
            spare.id,
            test_date(18),
            "dispatcher",
        )
        .await?;

        resolve_vacancy_permanently(&fixture.db, fixture.vacancy.id, guard_id, test_date(15))
            .await?;

        let covered = fixture.record_on(&fixture.vacancy, 18).await?;
        assert_eq!(covered.guard_id, None);
        assert_eq!(covered.state, RosterState::WorkedByVacancyCoverage);

        let day = fixture.record_on(&fixture.vacancy, 20).await?;
        let worked = mark_worked(&fixture.db, &fixture.audit, day.id, "ops").await?;
        assert_eq!(worked.state, RosterState::Worked);
        assert_eq!(worked.guard_id, Some(guard_id));

        let view = daily_operations_view(&fixture.db, fixture.installation.id, test_date(21))
            .await?;
        let row = view.iter().find(|r| r.post_id == fixture.vacancy.id).unwrap();
        assert_eq!(row.tag, StatusTag::Plan);
        assert_eq!(row.guard.as_ref().map(|g| g.id), Some(guard_id));

        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_vacancy_with_posted_guard_conflicts() -> Result<()> {
        let fixture = setup_fixture().await?;

        let result = resolve_vacancy_permanently(
            &fixture.db,
            fixture.vacancy.id,
            fixture.standing_guard.id,
            test_date(1),
        )
        .await;
        match result {
            Err(err @ Error::GuardAlreadyPosted { .. }) => {
                assert_eq!(err.kind(), crate::errors::ErrorKind::Conflict);
                assert!(err.to_string().contains("North Gate"));
            }
            other => panic!("expected GuardAlreadyPosted, got {other:?}"),
        }

        let prior = get_post_by_id(&fixture.db, fixture.post.id).await?.unwrap();
        assert_eq!(prior.guard_id, Some(fixture.standing_guard.id));
        let vacancy = get_post_by_id(&fixture.db, fixture.vacancy.id).await?.unwrap();
        assert!(vacancy.is_vacancy);
        assert_eq!(vacancy.guard_id, None);

        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_staffed_post_fails() -> Result<()> {
        let fixture = setup_fixture().await?;

        let result =
            resolve_vacancy_permanently(
                &fixture.db,
                fixture.post.id,
                fixture.cover_guard.id,
                test_date(1),
            )
            .await;
        assert!(matches!(result, Err(Error::PreconditionFailed { .. })));

        Ok(())
    }

    #[tokio::test]
    async fn test_release_then_resolve() -> Result<()> {
        let fixture = setup_fixture().await?;

        release_guard_from_post(&fixture.db, fixture.post.id, test_date(1)).await?;
        let open = open_on(&fixture, 2).await?;
        assert_eq!(open.len(), 2);

        // The released guard can take the other vacancy
        let resolved = resolve_vacancy_permanently(
            &fixture.db,
            fixture.vacancy.id,
            fixture.standing_guard.id,
            test_date(1),
        )
        .await?;
        assert_eq!(resolved.guard_id, Some(fixture.standing_guard.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_find_coverage_candidates() -> Result<()> {
        let fixture = setup_fixture().await?;
        let spare = create_test_guard(&fixture.db, "Ana Spare").await?;

        let candidates = find_coverage_candidates(&fixture.db, test_date(8), None).await?;
        let names: Vec<&str> = candidates.iter().map(|g| g.full_name.as_str()).collect();
        // The standing guard is planned that day
        assert_eq!(names, vec!["Ana Spare", "Cover Guard"]);

        let filtered = find_coverage_candidates(&fixture.db, test_date(8), Some("ana")).await?;
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].id, spare.id);

        Ok(())
    }

    #[tokio::test]
    async fn test_coverage_guard_is_not_a_candidate_that_day() -> Result<()> {
        let fixture = setup_fixture().await?;
        let record = fixture.record_on(&fixture.post, 9).await?;
        mark_absence_with_coverage(
            &fixture.db,
            &fixture.audit,
            record.id,
            AbsenceReport::new("sick", true),
            fixture.cover_guard.id,
            "dispatcher",
        )
        .await?;

        let candidates = find_coverage_candidates(&fixture.db, test_date(9), None).await?;
        assert!(candidates.iter().all(|g| g.id != fixture.cover_guard.id));
        // The absent standing guard is free again
        assert!(candidates.iter().any(|g| g.id == fixture.standing_guard.id));

        let candidates = find_coverage_candidates(&fixture.db, test_date(10), None).await?;
        assert!(candidates.iter().any(|g| g.id == fixture.cover_guard.id));

        Ok(())
    }

    #[tokio::test]
    async fn test_inactive_guards_are_not_candidates() -> Result<()> {
        let fixture = setup_fixture().await?;
        registry::set_guard_active(&fixture.db, fixture.cover_guard.id, false).await?;

        let candidates = find_coverage_candidates(&fixture.db, test_date(8), None).await?;
        assert!(candidates.is_empty());

        Ok(())
    }

    #[tokio::test]
    async fn test_cover_next_vacancy() -> Result<()> {
        let fixture = setup_fixture().await?;

        let outcome = cover_next_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.installation.id,
            fixture.cover_guard.id,
            test_date(11),
            "dispatcher",
        )
        .await?
        .unwrap();
        assert_eq!(outcome.record.post_id, fixture.vacancy.id);
        assert_eq!(outcome.record.state, RosterState::WorkedByVacancyCoverage);

        let spare = create_test_guard(&fixture.db, "Spare").await?;
        let none = cover_next_vacancy(
            &fixture.db,
            &fixture.audit,
            fixture.installation.id,
            spare.id,
            test_date(11),
            "dispatcher",
        )
        .await?;
        assert!(none.is_none());

        Ok(())
    }
}
