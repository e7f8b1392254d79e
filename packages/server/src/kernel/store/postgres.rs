//! PostgreSQL store.
//!
//! Guarded writes lock the row (`SELECT ... FOR UPDATE`), check the guard,
//! then update with `WHERE id = $1 AND status = ANY($2)` inside the same
//! transaction. Creation paths serialize per scope with a transaction-level
//! advisory lock so the "one active job" check cannot race.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{FromRow, PgConnection, PgPool};
use tracing::debug;

use super::{
    AuditCompletion, AuditFailure, AuditGuard, AuditStore, CapacityError, CreditLedger,
    NotificationStore, OptimizationCompletion, OptimizationFailure, OptimizationGuard,
    OptimizationStore, PriceListStore, PromptTemplateStore, PurchaseStore, ScrapeCommit,
    StoreError, StoreResult, UserStore, DUPLICATE_WINDOW_SECS,
};
use crate::common::{
    AuditJobId, NotificationId, OptimizationJobId, PriceListId, PricingData, PromptTemplateId,
    UserId,
};
use crate::domains::analysis::{CategoryProposal, KeywordReport, OptimizationOption};
use crate::domains::audits::models::{
    AuditJob, AuditPatch, AuditReport, AuditStatus, NewAuditJob, ScrapedProfile,
};
use crate::domains::billing::models::{PurchaseEffect, PurchaseOutcome};
use crate::domains::notifications::models::{NewNotification, Notification};
use crate::domains::optimization::models::{
    AuditContext, NewOptimizationJob, OptimizationJob, OptimizationPatch, OptimizationResult,
    PromptTemplate,
};
use crate::domains::price_lists::{NewPriceList, PriceList, PriceListSource};
use crate::domains::users::User;

// =============================================================================
// Rows
// =============================================================================

const AUDIT_COLUMNS: &str = "id, user_id, purchase_id, status, source_url, progress, \
    progress_message, error_message, retry_count, last_retry_at, credit_consumed, scraped_data, \
    salon_name, salon_address, salon_logo_url, categories_count, services_count, \
    base_price_list_id, pro_price_list_id, overall_score, report, keyword_report, \
    category_proposal, created_at, started_at, scraping_completed_at, completed_at, updated_at";

const OPTIMIZATION_COLUMNS: &str = "id, user_id, price_list_id, audit_id, purchase_id, status, \
    options, progress, progress_message, current_step, total_steps, retry_count, error_message, \
    input_pricing_data, audit_context, output_pricing_data, optimization_result, created_at, \
    started_at, completed_at, updated_at";

const PRICE_LIST_COLUMNS: &str = "id, user_id, name, source, pricing_data, original_pricing_data, \
    is_optimized, audit_id, optimization_job_id, optimized_version_id, quality_score, created_at, \
    updated_at";

const TERMINAL_AUDIT_STATUSES: [&str; 2] = ["completed", "failed"];
const TERMINAL_OPTIMIZATION_STATUSES: [&str; 2] = ["completed", "failed"];

#[derive(FromRow)]
struct AuditRow {
    id: AuditJobId,
    user_id: UserId,
    purchase_id: Option<String>,
    status: String,
    source_url: Option<String>,
    progress: i32,
    progress_message: Option<String>,
    error_message: Option<String>,
    retry_count: i32,
    last_retry_at: Option<DateTime<Utc>>,
    credit_consumed: bool,
    scraped_data: Option<Json<ScrapedProfile>>,
    salon_name: Option<String>,
    salon_address: Option<String>,
    salon_logo_url: Option<String>,
    categories_count: i32,
    services_count: i32,
    base_price_list_id: Option<PriceListId>,
    pro_price_list_id: Option<PriceListId>,
    overall_score: Option<i32>,
    report: Option<Json<AuditReport>>,
    keyword_report: Option<Json<KeywordReport>>,
    category_proposal: Option<Json<CategoryProposal>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    scraping_completed_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditJob {
    type Error = StoreError;

    fn try_from(row: AuditRow) -> StoreResult<Self> {
        // Legacy 'processing' rows normalize to Scraping here.
        let status = row.status.parse::<AuditStatus>().map_err(StoreError::Corrupt)?;
        Ok(AuditJob {
            id: row.id,
            user_id: row.user_id,
            purchase_id: row.purchase_id,
            status,
            source_url: row.source_url,
            progress: row.progress,
            progress_message: row.progress_message,
            error_message: row.error_message,
            retry_count: row.retry_count,
            last_retry_at: row.last_retry_at,
            credit_consumed: row.credit_consumed,
            scraped_data: row.scraped_data.map(|j| j.0),
            salon_name: row.salon_name,
            salon_address: row.salon_address,
            salon_logo_url: row.salon_logo_url,
            categories_count: row.categories_count,
            services_count: row.services_count,
            base_price_list_id: row.base_price_list_id,
            pro_price_list_id: row.pro_price_list_id,
            overall_score: row.overall_score,
            report: row.report.map(|j| j.0),
            keyword_report: row.keyword_report.map(|j| j.0),
            category_proposal: row.category_proposal.map(|j| j.0),
            created_at: row.created_at,
            started_at: row.started_at,
            scraping_completed_at: row.scraping_completed_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct OptimizationRow {
    id: OptimizationJobId,
    user_id: UserId,
    price_list_id: PriceListId,
    audit_id: Option<AuditJobId>,
    purchase_id: Option<String>,
    status: String,
    options: Json<Vec<OptimizationOption>>,
    progress: i32,
    progress_message: Option<String>,
    current_step: i32,
    total_steps: i32,
    retry_count: i32,
    error_message: Option<String>,
    input_pricing_data: Json<PricingData>,
    audit_context: Option<Json<AuditContext>>,
    output_pricing_data: Option<Json<PricingData>>,
    optimization_result: Option<Json<OptimizationResult>>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<OptimizationRow> for OptimizationJob {
    type Error = StoreError;

    fn try_from(row: OptimizationRow) -> StoreResult<Self> {
        Ok(OptimizationJob {
            id: row.id,
            user_id: row.user_id,
            price_list_id: row.price_list_id,
            audit_id: row.audit_id,
            purchase_id: row.purchase_id,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            options: row.options.0,
            progress: row.progress,
            progress_message: row.progress_message,
            current_step: row.current_step,
            total_steps: row.total_steps,
            retry_count: row.retry_count,
            error_message: row.error_message,
            input_pricing_data: row.input_pricing_data.0,
            audit_context: row.audit_context.map(|j| j.0),
            output_pricing_data: row.output_pricing_data.map(|j| j.0),
            optimization_result: row.optimization_result.map(|j| j.0),
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct PriceListRow {
    id: PriceListId,
    user_id: UserId,
    name: String,
    source: String,
    pricing_data: Json<PricingData>,
    original_pricing_data: Option<Json<PricingData>>,
    is_optimized: bool,
    audit_id: Option<AuditJobId>,
    optimization_job_id: Option<OptimizationJobId>,
    optimized_version_id: Option<PriceListId>,
    quality_score: Option<i32>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<PriceListRow> for PriceList {
    type Error = StoreError;

    fn try_from(row: PriceListRow) -> StoreResult<Self> {
        Ok(PriceList {
            id: row.id,
            user_id: row.user_id,
            name: row.name,
            source: row.source.parse::<PriceListSource>().map_err(StoreError::Corrupt)?,
            pricing_data: row.pricing_data.0,
            original_pricing_data: row.original_pricing_data.map(|j| j.0),
            is_optimized: row.is_optimized,
            audit_id: row.audit_id,
            optimization_job_id: row.optimization_job_id,
            optimized_version_id: row.optimized_version_id,
            quality_score: row.quality_score,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(FromRow)]
struct NotificationRow {
    id: NotificationId,
    user_id: UserId,
    kind: String,
    title: String,
    message: String,
    link: Option<String>,
    read: bool,
    created_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct PromptTemplateRow {
    id: PromptTemplateId,
    option: String,
    system_prompt: String,
    temperature: f32,
    max_tokens: i32,
    model: Option<String>,
    active: bool,
    updated_at: DateTime<Utc>,
}

#[derive(FromRow)]
struct UserRow {
    id: UserId,
    email: String,
    credits: i32,
    is_admin: bool,
    created_at: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            email: row.email,
            credits: row.credits,
            is_admin: row.is_admin,
            created_at: row.created_at,
        }
    }
}

/// Status strings a guard accepts, including the legacy alias of `scraping`.
fn audit_guard_statuses(guard: &AuditGuard) -> Vec<String> {
    let mut statuses: Vec<String> = guard.statuses.iter().map(|s| s.as_str().to_string()).collect();
    if guard.statuses.contains(&AuditStatus::Scraping) {
        statuses.push("processing".to_string());
    }
    statuses
}

fn optimization_guard_statuses(guard: &OptimizationGuard) -> Vec<String> {
    guard.statuses.iter().map(|s| s.as_str().to_string()).collect()
}

// =============================================================================
// Store
// =============================================================================

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects and applies migrations.
    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Serializes creations within one scope until the transaction ends.
async fn lock_scope(conn: &mut PgConnection, scope: &str, id: uuid::Uuid) -> StoreResult<()> {
    sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1 || ':' || $2::text))")
        .bind(scope)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

// -----------------------------------------------------------------------------
// Audit helpers
// -----------------------------------------------------------------------------

async fn lock_audit(conn: &mut PgConnection, id: AuditJobId) -> StoreResult<AuditJob> {
    let sql = format!("SELECT {} FROM audit_jobs WHERE id = $1 FOR UPDATE", AUDIT_COLUMNS);
    let row = sqlx::query_as::<_, AuditRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(StoreError::NotFound("audit"))?;
    row.try_into()
}

async fn insert_audit_row(conn: &mut PgConnection, job: &AuditJob) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO audit_jobs (id, user_id, purchase_id, status, source_url, progress,
            progress_message, retry_count, credit_consumed, created_at, started_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
        "#,
    )
    .bind(job.id)
    .bind(job.user_id)
    .bind(&job.purchase_id)
    .bind(job.status.as_str())
    .bind(&job.source_url)
    .bind(job.progress)
    .bind(&job.progress_message)
    .bind(job.retry_count)
    .bind(job.credit_consumed)
    .bind(job.created_at)
    .bind(job.started_at)
    .bind(job.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

/// Writes every mutable column, guarded by the row's pre-write status.
async fn write_audit(
    conn: &mut PgConnection,
    job: &AuditJob,
    guard: &AuditGuard,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE audit_jobs
        SET status = $4,
            source_url = $5,
            progress = $6,
            progress_message = $7,
            error_message = $8,
            retry_count = $9,
            last_retry_at = $10,
            credit_consumed = $11,
            scraped_data = $12,
            salon_name = $13,
            salon_address = $14,
            salon_logo_url = $15,
            categories_count = $16,
            services_count = $17,
            base_price_list_id = $18,
            pro_price_list_id = $19,
            overall_score = $20,
            report = $21,
            keyword_report = $22,
            category_proposal = $23,
            started_at = $24,
            scraping_completed_at = $25,
            completed_at = $26,
            updated_at = $27
        WHERE id = $1
          AND status = ANY($2)
          AND ($3::INTEGER IS NULL OR retry_count = $3)
        "#,
    )
    .bind(job.id)
    .bind(audit_guard_statuses(guard))
    .bind(guard.retry_count)
    .bind(job.status.as_str())
    .bind(&job.source_url)
    .bind(job.progress)
    .bind(&job.progress_message)
    .bind(&job.error_message)
    .bind(job.retry_count)
    .bind(job.last_retry_at)
    .bind(job.credit_consumed)
    .bind(job.scraped_data.as_ref().map(Json))
    .bind(&job.salon_name)
    .bind(&job.salon_address)
    .bind(&job.salon_logo_url)
    .bind(job.categories_count)
    .bind(job.services_count)
    .bind(job.base_price_list_id)
    .bind(job.pro_price_list_id)
    .bind(job.overall_score)
    .bind(job.report.as_ref().map(Json))
    .bind(job.keyword_report.as_ref().map(Json))
    .bind(job.category_proposal.as_ref().map(Json))
    .bind(job.started_at)
    .bind(job.scraping_completed_at)
    .bind(job.completed_at)
    .bind(job.updated_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

async fn create_audit_in(
    conn: &mut PgConnection,
    new: NewAuditJob,
    now: DateTime<Utc>,
) -> StoreResult<AuditJob> {
    lock_scope(&mut *conn, "audit-user", new.user_id.into_uuid()).await?;

    let active: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM audit_jobs WHERE user_id = $1 AND status <> ALL($2))",
    )
    .bind(new.user_id)
    .bind(&TERMINAL_AUDIT_STATUSES[..])
    .fetch_one(&mut *conn)
    .await?;
    if active {
        return Err(CapacityError::ActiveAuditExists.into());
    }

    if let Some(url) = &new.source_url {
        let duplicate: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM audit_jobs
                WHERE user_id = $1 AND source_url = $2 AND created_at > $3
            )
            "#,
        )
        .bind(new.user_id)
        .bind(url)
        .bind(now - Duration::seconds(DUPLICATE_WINDOW_SECS))
        .fetch_one(&mut *conn)
        .await?;
        if duplicate {
            return Err(CapacityError::DuplicateSubmission.into());
        }
    }

    if new.consume_credit && !debit_in(&mut *conn, new.user_id).await? {
        return Err(CapacityError::InsufficientCredits.into());
    }

    let job = new.into_job(now);
    insert_audit_row(&mut *conn, &job).await?;
    Ok(job)
}

async fn debit_in(conn: &mut PgConnection, user_id: UserId) -> StoreResult<bool> {
    let result = sqlx::query("UPDATE users SET credits = credits - 1 WHERE id = $1 AND credits > 0")
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

// -----------------------------------------------------------------------------
// Optimization helpers
// -----------------------------------------------------------------------------

async fn lock_optimization(
    conn: &mut PgConnection,
    id: OptimizationJobId,
) -> StoreResult<OptimizationJob> {
    let sql = format!(
        "SELECT {} FROM optimization_jobs WHERE id = $1 FOR UPDATE",
        OPTIMIZATION_COLUMNS
    );
    let row = sqlx::query_as::<_, OptimizationRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .ok_or(StoreError::NotFound("optimization job"))?;
    row.try_into()
}

async fn write_optimization(
    conn: &mut PgConnection,
    job: &OptimizationJob,
    guard: &OptimizationGuard,
) -> StoreResult<bool> {
    let result = sqlx::query(
        r#"
        UPDATE optimization_jobs
        SET status = $4,
            progress = $5,
            progress_message = $6,
            current_step = $7,
            retry_count = $8,
            error_message = $9,
            output_pricing_data = $10,
            optimization_result = $11,
            started_at = $12,
            completed_at = $13,
            updated_at = $14,
            purchase_id = $15
        WHERE id = $1
          AND status = ANY($2)
          AND ($3::INTEGER IS NULL OR retry_count = $3)
        "#,
    )
    .bind(job.id)
    .bind(optimization_guard_statuses(guard))
    .bind(guard.retry_count)
    .bind(job.status.as_str())
    .bind(job.progress)
    .bind(&job.progress_message)
    .bind(job.current_step)
    .bind(job.retry_count)
    .bind(&job.error_message)
    .bind(job.output_pricing_data.as_ref().map(Json))
    .bind(job.optimization_result.as_ref().map(Json))
    .bind(job.started_at)
    .bind(job.completed_at)
    .bind(job.updated_at)
    .bind(&job.purchase_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

// -----------------------------------------------------------------------------
// Price list and notification helpers
// -----------------------------------------------------------------------------

async fn insert_price_list_row(conn: &mut PgConnection, list: &PriceList) -> StoreResult<()> {
    sqlx::query(
        r#"
        INSERT INTO price_lists (id, user_id, name, source, pricing_data, original_pricing_data,
            is_optimized, audit_id, optimization_job_id, optimized_version_id, quality_score,
            created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
        "#,
    )
    .bind(list.id)
    .bind(list.user_id)
    .bind(&list.name)
    .bind(list.source.as_str())
    .bind(Json(&list.pricing_data))
    .bind(list.original_pricing_data.as_ref().map(Json))
    .bind(list.is_optimized)
    .bind(list.audit_id)
    .bind(list.optimization_job_id)
    .bind(list.optimized_version_id)
    .bind(list.quality_score)
    .bind(list.created_at)
    .bind(list.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn fetch_price_list(
    conn: &mut PgConnection,
    id: PriceListId,
    for_update: bool,
) -> StoreResult<Option<PriceList>> {
    let sql = format!(
        "SELECT {} FROM price_lists WHERE id = $1{}",
        PRICE_LIST_COLUMNS,
        if for_update { " FOR UPDATE" } else { "" }
    );
    sqlx::query_as::<_, PriceListRow>(&sql)
        .bind(id)
        .fetch_optional(conn)
        .await?
        .map(PriceList::try_from)
        .transpose()
}

async fn write_price_list(conn: &mut PgConnection, list: &PriceList) -> StoreResult<()> {
    sqlx::query(
        r#"
        UPDATE price_lists
        SET pricing_data = $2,
            original_pricing_data = $3,
            is_optimized = $4,
            optimization_job_id = $5,
            optimized_version_id = $6,
            quality_score = $7,
            updated_at = $8
        WHERE id = $1
        "#,
    )
    .bind(list.id)
    .bind(Json(&list.pricing_data))
    .bind(list.original_pricing_data.as_ref().map(Json))
    .bind(list.is_optimized)
    .bind(list.optimization_job_id)
    .bind(list.optimized_version_id)
    .bind(list.quality_score)
    .bind(list.updated_at)
    .execute(conn)
    .await?;
    Ok(())
}

async fn insert_notification(
    conn: &mut PgConnection,
    notification: NewNotification,
    now: DateTime<Utc>,
) -> StoreResult<()> {
    let notification = notification.into_notification(now);
    sqlx::query(
        r#"
        INSERT INTO notifications (id, user_id, kind, title, message, link, read, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(notification.id)
    .bind(notification.user_id)
    .bind(notification.kind.as_str())
    .bind(&notification.title)
    .bind(&notification.message)
    .bind(&notification.link)
    .bind(notification.read)
    .bind(notification.created_at)
    .execute(conn)
    .await?;
    Ok(())
}

// =============================================================================
// Trait implementations
// =============================================================================

#[async_trait]
impl CreditLedger for PostgresStore {
    async fn debit(&self, user_id: UserId) -> StoreResult<bool> {
        let mut conn = self.pool.acquire().await?;
        debit_in(&mut conn, user_id).await
    }

    async fn credit(&self, user_id: UserId, amount: i32) -> StoreResult<i32> {
        sqlx::query_scalar("UPDATE users SET credits = credits + $2 WHERE id = $1 RETURNING credits")
            .bind(user_id)
            .bind(amount)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(StoreError::NotFound("user"))
    }

    async fn balance(&self, user_id: UserId) -> StoreResult<i32> {
        let credits: Option<i32> = sqlx::query_scalar("SELECT credits FROM users WHERE id = $1")
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(credits.unwrap_or(0))
    }
}

#[async_trait]
impl UserStore for PostgresStore {
    async fn upsert_user(&self, user_id: UserId, email: &str) -> StoreResult<User> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (id, email) VALUES ($1, $2)
            ON CONFLICT (id) DO UPDATE SET email = EXCLUDED.email
            RETURNING id, email, credits, is_admin, created_at
            "#,
        )
        .bind(user_id)
        .bind(email)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn find_user(&self, user_id: UserId) -> StoreResult<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, email, credits, is_admin, created_at FROM users WHERE id = $1",
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(User::from))
    }
}

#[async_trait]
impl AuditStore for PostgresStore {
    async fn create_audit(&self, new: NewAuditJob) -> StoreResult<AuditJob> {
        let mut tx = self.pool.begin().await?;
        let job = create_audit_in(&mut tx, new, Utc::now()).await?;
        tx.commit().await?;
        debug!(audit_id = %job.id, status = %job.status, "audit created");
        Ok(job)
    }

    async fn find_audit(&self, id: AuditJobId) -> StoreResult<Option<AuditJob>> {
        let sql = format!("SELECT {} FROM audit_jobs WHERE id = $1", AUDIT_COLUMNS);
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(AuditJob::try_from)
            .transpose()
    }

    async fn list_audits_for_user(&self, user_id: UserId) -> StoreResult<Vec<AuditJob>> {
        let sql = format!(
            "SELECT {} FROM audit_jobs WHERE user_id = $1 ORDER BY created_at DESC",
            AUDIT_COLUMNS
        );
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(AuditJob::try_from)
            .collect()
    }

    async fn active_audit_for_user(&self, user_id: UserId) -> StoreResult<Option<AuditJob>> {
        let sql = format!(
            "SELECT {} FROM audit_jobs WHERE user_id = $1 AND status <> ALL($2) \
             ORDER BY created_at DESC LIMIT 1",
            AUDIT_COLUMNS
        );
        sqlx::query_as::<_, AuditRow>(&sql)
            .bind(user_id)
            .bind(&TERMINAL_AUDIT_STATUSES[..])
            .fetch_optional(&self.pool)
            .await?
            .map(AuditJob::try_from)
            .transpose()
    }

    async fn update_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        patch: AuditPatch,
    ) -> StoreResult<Option<AuditJob>> {
        let mut tx = self.pool.begin().await?;
        let mut job = lock_audit(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }
        patch.apply(&mut job, Utc::now());
        if !write_audit(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(job))
    }

    async fn commit_scrape(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        commit: ScrapeCommit,
    ) -> StoreResult<Option<(AuditJob, PriceList)>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut job = lock_audit(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }

        let pricing_data = commit.profile.pricing_data();
        let existing = match job.base_price_list_id {
            Some(base_id) => fetch_price_list(&mut tx, base_id, true).await?,
            None => None,
        };
        // A repeated scrape refreshes the audit's base list in place.
        let base = match existing {
            Some(mut base) => {
                base.refresh_import(pricing_data, now);
                write_price_list(&mut tx, &base).await?;
                base
            }
            None => {
                let base = NewPriceList {
                    user_id: job.user_id,
                    name: commit.base_list_name,
                    source: PriceListSource::Booksy,
                    pricing_data,
                    audit_id: Some(id),
                    quality_score: None,
                }
                .into_price_list(now);
                insert_price_list_row(&mut tx, &base).await?;
                base
            }
        };

        job.record_scrape(commit.profile, base.id, commit.progress_message, now);
        if !write_audit(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some((job, base)))
    }

    async fn complete_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        completion: AuditCompletion,
    ) -> StoreResult<Option<AuditJob>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut job = lock_audit(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }

        let base = match job.base_price_list_id {
            Some(base_id) => fetch_price_list(&mut tx, base_id, true).await?,
            None => None,
        };
        let mut pro_id = None;
        if let Some(mut base) = base {
            let pro = NewPriceList {
                user_id: job.user_id,
                name: completion.pro_list_name,
                source: PriceListSource::Audit,
                pricing_data: base.pricing_data.clone(),
                audit_id: Some(id),
                quality_score: Some(completion.report.overall_score),
            }
            .into_price_list(now);
            insert_price_list_row(&mut tx, &pro).await?;

            base.optimized_version_id = Some(pro.id);
            base.updated_at = now;
            write_price_list(&mut tx, &base).await?;
            pro_id = Some(pro.id);
        }

        job.record_completion(
            completion.report,
            completion.keyword_report,
            completion.category_proposal,
            pro_id,
            now,
        );
        if !write_audit(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        insert_notification(&mut tx, completion.notification, now).await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    async fn fail_audit(
        &self,
        id: AuditJobId,
        guard: AuditGuard,
        failure: AuditFailure,
    ) -> StoreResult<Option<AuditJob>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut job = lock_audit(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }

        let refund = job.record_failure(failure.error_message, failure.refund, now);
        if !write_audit(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        if refund {
            sqlx::query("UPDATE users SET credits = credits + 1 WHERE id = $1")
                .bind(job.user_id)
                .execute(&mut *tx)
                .await?;
        }
        insert_notification(&mut tx, failure.notification, now).await?;
        tx.commit().await?;
        Ok(Some(job))
    }
}

#[async_trait]
impl OptimizationStore for PostgresStore {
    async fn create_optimization(
        &self,
        new: NewOptimizationJob,
        started: NewNotification,
    ) -> StoreResult<OptimizationJob> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        lock_scope(&mut tx, "optimization-price-list", new.price_list_id.into_uuid()).await?;

        let active: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM optimization_jobs WHERE price_list_id = $1 AND status <> ALL($2))",
        )
        .bind(new.price_list_id)
        .bind(&TERMINAL_OPTIMIZATION_STATUSES[..])
        .fetch_one(&mut *tx)
        .await?;
        if active {
            return Err(CapacityError::ActiveOptimizationExists.into());
        }

        let job = new.into_job(now);
        sqlx::query(
            r#"
            INSERT INTO optimization_jobs (id, user_id, price_list_id, audit_id, status, options,
                progress, progress_message, current_step, total_steps, retry_count,
                input_pricing_data, audit_context, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(job.id)
        .bind(job.user_id)
        .bind(job.price_list_id)
        .bind(job.audit_id)
        .bind(job.status.as_str())
        .bind(Json(&job.options))
        .bind(job.progress)
        .bind(&job.progress_message)
        .bind(job.current_step)
        .bind(job.total_steps)
        .bind(job.retry_count)
        .bind(Json(&job.input_pricing_data))
        .bind(job.audit_context.as_ref().map(Json))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&mut *tx)
        .await?;

        insert_notification(&mut tx, started, now).await?;
        tx.commit().await?;
        Ok(job)
    }

    async fn find_optimization(
        &self,
        id: OptimizationJobId,
    ) -> StoreResult<Option<OptimizationJob>> {
        let sql = format!("SELECT {} FROM optimization_jobs WHERE id = $1", OPTIMIZATION_COLUMNS);
        sqlx::query_as::<_, OptimizationRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(OptimizationJob::try_from)
            .transpose()
    }

    async fn active_optimization_for_price_list(
        &self,
        price_list_id: PriceListId,
    ) -> StoreResult<Option<OptimizationJob>> {
        let sql = format!(
            "SELECT {} FROM optimization_jobs WHERE price_list_id = $1 AND status <> ALL($2) \
             ORDER BY created_at DESC LIMIT 1",
            OPTIMIZATION_COLUMNS
        );
        sqlx::query_as::<_, OptimizationRow>(&sql)
            .bind(price_list_id)
            .bind(&TERMINAL_OPTIMIZATION_STATUSES[..])
            .fetch_optional(&self.pool)
            .await?
            .map(OptimizationJob::try_from)
            .transpose()
    }

    async fn update_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        patch: OptimizationPatch,
    ) -> StoreResult<Option<OptimizationJob>> {
        let mut tx = self.pool.begin().await?;
        let mut job = lock_optimization(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }
        patch.apply(&mut job, Utc::now());
        if !write_optimization(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        tx.commit().await?;
        Ok(Some(job))
    }

    async fn complete_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        completion: OptimizationCompletion,
    ) -> StoreResult<Option<OptimizationJob>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut job = lock_optimization(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }
        let mut list = fetch_price_list(&mut tx, job.price_list_id, true)
            .await?
            .ok_or(StoreError::NotFound("price list"))?;

        let quality_score = completion.result.quality_score;
        job.record_completion(completion.output.clone(), completion.result, now);
        if !write_optimization(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        list.apply_optimization(
            id,
            job.input_pricing_data.clone(),
            completion.output,
            quality_score,
            now,
        );
        write_price_list(&mut tx, &list).await?;
        insert_notification(&mut tx, completion.notification, now).await?;
        tx.commit().await?;
        Ok(Some(job))
    }

    async fn fail_optimization(
        &self,
        id: OptimizationJobId,
        guard: OptimizationGuard,
        failure: OptimizationFailure,
    ) -> StoreResult<Option<OptimizationJob>> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let mut job = lock_optimization(&mut tx, id).await?;
        if !guard.allows(job.status, job.retry_count) {
            return Ok(None);
        }
        job.record_failure(failure.error_message, now);
        if !write_optimization(&mut tx, &job, &guard).await? {
            return Ok(None);
        }
        insert_notification(&mut tx, failure.notification, now).await?;
        tx.commit().await?;
        Ok(Some(job))
    }
}

#[async_trait]
impl PriceListStore for PostgresStore {
    async fn create_price_list(&self, new: NewPriceList) -> StoreResult<PriceList> {
        let list = new.into_price_list(Utc::now());
        let mut conn = self.pool.acquire().await?;
        insert_price_list_row(&mut conn, &list).await?;
        Ok(list)
    }

    async fn find_price_list(&self, id: PriceListId) -> StoreResult<Option<PriceList>> {
        let mut conn = self.pool.acquire().await?;
        fetch_price_list(&mut conn, id, false).await
    }
}

#[async_trait]
impl NotificationStore for PostgresStore {
    async fn list_notifications(&self, user_id: UserId) -> StoreResult<Vec<Notification>> {
        let rows = sqlx::query_as::<_, NotificationRow>(
            r#"
            SELECT id, user_id, kind, title, message, link, read, created_at
            FROM notifications
            WHERE user_id = $1
            ORDER BY created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(Notification {
                    id: row.id,
                    user_id: row.user_id,
                    kind: row.kind.parse().map_err(StoreError::Corrupt)?,
                    title: row.title,
                    message: row.message,
                    link: row.link,
                    read: row.read,
                    created_at: row.created_at,
                })
            })
            .collect()
    }
}

#[async_trait]
impl PromptTemplateStore for PostgresStore {
    async fn templates_for(
        &self,
        options: &[OptimizationOption],
    ) -> StoreResult<Vec<PromptTemplate>> {
        let names: Vec<&str> = options.iter().map(|o| o.as_str()).collect();
        let rows = sqlx::query_as::<_, PromptTemplateRow>(
            r#"
            SELECT id, option, system_prompt, temperature, max_tokens, model, active, updated_at
            FROM prompt_templates
            WHERE active AND option = ANY($1)
            "#,
        )
        .bind(&names)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(PromptTemplate {
                    id: row.id,
                    option: row.option.parse().map_err(StoreError::Corrupt)?,
                    system_prompt: row.system_prompt,
                    temperature: row.temperature,
                    max_tokens: u32::try_from(row.max_tokens)
                        .map_err(|_| StoreError::Corrupt(format!("max_tokens {}", row.max_tokens)))?,
                    model: row.model,
                    active: row.active,
                    updated_at: row.updated_at,
                })
            })
            .collect()
    }

    async fn upsert_prompt_template(&self, template: PromptTemplate) -> StoreResult<()> {
        sqlx::query(
            r#"
            INSERT INTO prompt_templates (id, option, system_prompt, temperature, max_tokens,
                model, active, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (option) DO UPDATE SET
                system_prompt = EXCLUDED.system_prompt,
                temperature = EXCLUDED.temperature,
                max_tokens = EXCLUDED.max_tokens,
                model = EXCLUDED.model,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(template.id)
        .bind(template.option.as_str())
        .bind(&template.system_prompt)
        .bind(template.temperature)
        .bind(template.max_tokens as i32)
        .bind(&template.model)
        .bind(template.active)
        .bind(template.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait]
impl PurchaseStore for PostgresStore {
    async fn apply_purchase(
        &self,
        purchase_id: &str,
        user_id: UserId,
        effect: PurchaseEffect,
    ) -> StoreResult<PurchaseOutcome> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let recorded = sqlx::query(
            "INSERT INTO purchases (purchase_id, user_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
        )
        .bind(purchase_id)
        .bind(user_id)
        .execute(&mut *tx)
        .await?;
        if recorded.rows_affected() == 0 {
            return Ok(PurchaseOutcome::AlreadyProcessed);
        }

        let outcome = match effect {
            PurchaseEffect::CreatePendingAudit => {
                let job = create_audit_in(
                    &mut tx,
                    NewAuditJob::pending(user_id, Some(purchase_id.to_string())),
                    now,
                )
                .await?;
                PurchaseOutcome::AuditCreated(job)
            }
            PurchaseEffect::Credit(amount) => {
                let balance: i32 = sqlx::query_scalar(
                    "UPDATE users SET credits = credits + $2 WHERE id = $1 RETURNING credits",
                )
                .bind(user_id)
                .bind(amount)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or(StoreError::NotFound("user"))?;
                PurchaseOutcome::Credited { balance }
            }
            PurchaseEffect::LinkOptimization(price_list_id) => {
                let linked: Option<OptimizationJobId> = sqlx::query_scalar(
                    r#"
                    UPDATE optimization_jobs
                    SET purchase_id = $3, updated_at = NOW()
                    WHERE id = (
                        SELECT id FROM optimization_jobs
                        WHERE price_list_id = $1 AND user_id = $2
                        ORDER BY created_at DESC
                        LIMIT 1
                    )
                    RETURNING id
                    "#,
                )
                .bind(price_list_id)
                .bind(user_id)
                .bind(purchase_id)
                .fetch_optional(&mut *tx)
                .await?;
                PurchaseOutcome::OptimizationLinked(linked)
            }
        };

        tx.commit().await?;
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scraping_guard_matches_legacy_rows() {
        let guard = AuditGuard::from_statuses(&[AuditStatus::Scraping, AuditStatus::ScrapingRetry]);
        let statuses = audit_guard_statuses(&guard);
        assert!(statuses.contains(&"processing".to_string()));
        assert!(statuses.contains(&"scraping_retry".to_string()));

        let analyzing = AuditGuard::from_status(AuditStatus::Analyzing);
        assert_eq!(audit_guard_statuses(&analyzing), vec!["analyzing".to_string()]);
    }
}
