use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::ModerationVerdict;
use crate::utils::error::AppError;

pub mod postgres;

pub use postgres::PgEventStore;

/// Persistence operations the moderation worker and lifecycle scheduler run
/// against. Request handlers talk to the concrete store directly; the
/// background tasks go through this trait so tests can script the storage
/// side.
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Record the moderation verdict for `id`, but only if the event is still
    /// `pending`. Returns whether a row was actually updated; `false` means
    /// the event was already finalized (or gone) and the verdict was dropped.
    async fn finalize_moderation(
        &self,
        id: Uuid,
        verdict: ModerationVerdict,
    ) -> Result<bool, AppError>;

    /// Move every live event whose `end_at` has passed `now` to `inactive`.
    /// Returns the number of events deactivated.
    async fn deactivate_expired(&self, now: DateTime<Utc>) -> Result<u64, AppError>;

    /// Move every `inactive` event whose `end_at` predates `cutoff` to
    /// `deleted`. Returns the number of events purged.
    async fn purge_stale_inactive(&self, cutoff: DateTime<Utc>) -> Result<u64, AppError>;

    /// Count events still `pending` that were created before `cutoff`. A
    /// non-zero count means moderation verdicts are going missing.
    async fn count_stale_pending(&self, cutoff: DateTime<Utc>) -> Result<i64, AppError>;

    /// Whether the database itself runs a lifecycle sweep job, making the
    /// in-process scheduler redundant.
    async fn has_native_lifecycle_job(&self) -> Result<bool, AppError>;
}
