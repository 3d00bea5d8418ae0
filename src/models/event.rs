use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use uuid::Uuid;

/// Lifecycle status of a listed event.
///
/// The moderation worker owns the `Pending -> Approved | Spam` edge; the
/// lifecycle scheduler owns `Approved | Active -> Inactive` and
/// `Inactive -> Deleted`. `Spam` and `Deleted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "event_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EventStatus {
    Pending,
    Approved,
    Spam,
    Active,
    Inactive,
    Deleted,
}

impl EventStatus {
    /// Live events are the ones surfaced to users and watched for expiry.
    /// `Approved -> Active` promotion is implicit: both count as live.
    pub fn is_live(self) -> bool {
        matches!(self, EventStatus::Approved | EventStatus::Active)
    }

    /// Terminal statuses are never transitioned again.
    pub fn is_terminal(self) -> bool {
        matches!(self, EventStatus::Spam | EventStatus::Deleted)
    }

    /// Whether `next` is reachable from `self` in a single step. An event can
    /// never skip moderation: nothing past `Pending` is reachable until the
    /// moderation write has happened.
    pub fn can_transition_to(self, next: EventStatus) -> bool {
        use EventStatus::*;
        matches!(
            (self, next),
            (Pending, Approved)
                | (Pending, Spam)
                | (Approved, Active)
                | (Approved, Inactive)
                | (Active, Inactive)
                | (Inactive, Deleted)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventStatus::Pending => "pending",
            EventStatus::Approved => "approved",
            EventStatus::Spam => "spam",
            EventStatus::Active => "active",
            EventStatus::Inactive => "inactive",
            EventStatus::Deleted => "deleted",
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Final call made by the moderation worker for a pending event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationVerdict {
    Approved,
    Spam,
}

impl ModerationVerdict {
    pub fn status(self) -> EventStatus {
        match self {
            ModerationVerdict::Approved => EventStatus::Approved,
            ModerationVerdict::Spam => EventStatus::Spam,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Event {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
    pub status: EventStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Submission payload for a new event; persisted as `Pending` before the
/// moderation worker ever sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct NewEvent {
    pub title: String,
    pub description: Option<String>,
    pub location: String,
    pub start_at: DateTime<Utc>,
    pub end_at: DateTime<Utc>,
}
