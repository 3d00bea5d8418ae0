use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{Event, ModerationVerdict, NewEvent};
use crate::store::EventStore;
use crate::utils::error::AppError;

/// Name of the pg_cron job that replaces the in-process scheduler when the
/// operator installs the sweep database-side.
const NATIVE_LIFECYCLE_JOB: &str = "fieldday_lifecycle_sweep";

/// How many events a public listing returns at most.
const LIST_LIMIT: i64 = 100;

#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Persist a submission as `pending`. The caller hands the stored row to
    /// the moderation worker afterwards.
    pub async fn insert(&self, new_event: NewEvent) -> Result<Event, AppError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            INSERT INTO events (id, title, description, location, start_at, end_at, status)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending')
            RETURNING id, title, description, location, start_at, end_at, status,
                      created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_event.title)
        .bind(&new_event.description)
        .bind(&new_event.location)
        .bind(new_event.start_at)
        .bind(new_event.end_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(event)
    }

    pub async fn get(&self, id: Uuid) -> Result<Option<Event>, AppError> {
        let event = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, location, start_at, end_at, status,
                   created_at, updated_at
            FROM events
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(event)
    }

    /// Live events that have not yet ended, soonest first. Events past their
    /// `end_at` are excluded here even before the scheduler sweeps them.
    pub async fn list_visible(&self, now: DateTime<Utc>) -> Result<Vec<Event>, AppError> {
        let events = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, title, description, location, start_at, end_at, status,
                   created_at, updated_at
            FROM events
            WHERE status IN ('approved', 'active') AND end_at > $1
            ORDER BY start_at ASC
            LIMIT $2
            "#,
        )
        .bind(now)
        .bind(LIST_LIMIT)
        .fetch_all(&self.pool)
        .await?;

        Ok(events)
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn finalize_moderation(
        &self,
        id: Uuid,
        verdict: ModerationVerdict,
    ) -> Result<bool, AppError> {
        // The status guard makes the write a no-op if anything else already
        // moved the event out of pending.
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = $2, updated_at = now()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(id)
        .bind(verdict.status())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = 'inactive', updated_at = now()
            WHERE status IN ('approved', 'active') AND end_at < $1
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn purge_stale_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            r#"
            UPDATE events
            SET status = 'deleted', updated_at = now()
            WHERE status = 'inactive' AND end_at < $1
            "#,
        )
        .bind(cutoff)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn count_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<i64, AppError> {
        let count = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT COUNT(*)
            FROM events
            WHERE status = 'pending' AND created_at < $1
            "#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn has_native_lifecycle_job(&self) -> Result<bool, AppError> {
        // pg_cron may simply not be installed; look for its job table before
        // querying it so this works on a vanilla Postgres.
        let cron_installed =
            sqlx::query_scalar::<_, bool>("SELECT to_regclass('cron.job') IS NOT NULL")
                .fetch_one(&self.pool)
                .await?;

        if !cron_installed {
            return Ok(false);
        }

        let job_exists = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM cron.job WHERE jobname = $1)",
        )
        .bind(NATIVE_LIFECYCLE_JOB)
        .fetch_one(&self.pool)
        .await?;

        Ok(job_exists)
    }
}
