#![allow(clippy::result_large_err)]

use chrono::{Datelike, NaiveDate, Utc};
use dotenvy::dotenv;
use roster_ledger::{
    config::{database, staffing},
    core::{
        audit::{AuditLog, spawn_audit_writer},
        daily_view::{check_in_plan, daily_operations_view},
        overtime::{UnpaidFilter, list_unpaid},
        roster, seed,
        vacancy::{cover_next_vacancy, find_coverage_candidates, list_vacancies_for_installation},
    },
    entities::{Installation, installation},
    errors::Result,
};
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const ACTOR: &str = "roster-ledger";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can be set externally too
    dotenv().ok();

    // 3. Load the staffing configuration
    let config = staffing::load_default_config()
        .inspect_err(|e| error!("Failed to load staffing configuration: {}", e))?;
    let operations = config.operations.clone();

    // 4. Initialize database
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {}", e))?;
    database::create_tables(&db).await?;
    seed::seed_reference_data(&db, &config).await?;

    // 5. Audit stream
    let (audit, receiver) = AuditLog::channel(operations.audit_channel_capacity);
    let writer = spawn_audit_writer(db.clone(), receiver);

    // 6. Daily pass over every active installation
    let today = Utc::now().date_naive();
    let installations = Installation::find()
        .filter(installation::Column::Active.eq(true))
        .all(&db)
        .await?;

    for site in &installations {
        let generated =
            roster::generate_installation_roster(&db, site.id, today.year(), today.month()).await?;
        info!(
            installation = %site.name,
            created = generated.created,
            skipped = generated.skipped,
            "Monthly roster ready"
        );

        if operations.auto_cover_vacancies {
            auto_cover(&db, &audit, site.id, today).await?;
        }

        let view = daily_operations_view(&db, site.id, today).await?;
        for row in &view {
            info!(
                installation = %site.name,
                post = %row.post_name,
                status = %row.tag,
                guard = row.guard.as_ref().map_or("-", |g| g.full_name.as_str()),
                "Post status"
            );
        }

        let plan = check_in_plan(&view, today, operations.check_in_interval_minutes);
        if let (Some(first), Some(last)) = (plan.first(), plan.last()) {
            info!(
                installation = %site.name,
                calls = plan.len(),
                first = %first.at,
                last = %last.at,
                "Check-in plan"
            );
        }
    }

    report_unpaid_overtime(&db, today, operations.overtime_page_size).await?;

    // 7. Close the audit stream and let the writer drain it
    drop(audit);
    if let Err(e) = writer.await {
        warn!("Audit writer stopped abnormally: {}", e);
    }

    Ok(())
}

/// Covers today's open vacancies, first post first, with the first free guard.
async fn auto_cover(
    db: &DatabaseConnection,
    audit: &AuditLog,
    installation_id: i64,
    today: NaiveDate,
) -> Result<()> {
    let open = list_vacancies_for_installation(db, installation_id, today).await?;
    for _ in &open {
        let Some(candidate) = find_coverage_candidates(db, today, None)
            .await?
            .into_iter()
            .next()
        else {
            warn!(installation_id, "Open vacancies left without free guards");
            break;
        };
        match cover_next_vacancy(db, audit, installation_id, candidate.id, today, ACTOR).await? {
            Some(outcome) => info!(
                post_id = outcome.record.post_id,
                guard = %candidate.full_name,
                value = outcome.shift.value,
                "Vacancy covered automatically"
            ),
            None => break,
        }
    }
    Ok(())
}

async fn report_unpaid_overtime(
    db: &DatabaseConnection,
    today: NaiveDate,
    page_size: u64,
) -> Result<()> {
    let (from, to) = roster::month_bounds(today.year(), today.month())?;
    let mut unpaid = list_unpaid(db, UnpaidFilter::DateRange { from, to }, page_size).await?;

    let mut count = 0_usize;
    let mut value = 0.0;
    while let Some(page) = unpaid.next_page().await? {
        count += page.len();
        value += page.iter().map(|s| s.value).sum::<f64>();
    }
    info!(shifts = count, value, "Unpaid overtime this month");
    Ok(())
}
