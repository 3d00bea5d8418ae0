use axum::extract::{Path, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::models::NewEvent;
use crate::routes::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// Accept a submission, persist it as pending and hand it to the moderation
/// worker. Submission success is independent of whatever moderation later
/// decides; a rejected event simply never shows up.
pub async fn submit_event(
    State(state): State<AppState>,
    Json(payload): Json<NewEvent>,
) -> Result<Response, AppError> {
    validate(&payload)?;

    let event = state.store.insert(payload).await?;
    state
        .moderation
        .clone()
        .spawn(event.id, event.title.clone(), event.description.clone());

    Ok(created(event, "Event submitted for review").into_response())
}

pub async fn list_events(State(state): State<AppState>) -> Result<Response, AppError> {
    let events = state.store.list_visible(Utc::now()).await?;
    Ok(success(events, "Events retrieved").into_response())
}

/// Single-event lookup. Anything that is not currently live answers 404, so
/// pending and rejected events are indistinguishable from missing ones.
pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let event = state
        .store
        .get(id)
        .await?
        .filter(|event| event.status.is_live())
        .ok_or_else(|| AppError::NotFound(format!("Event with id '{}' was not found", id)))?;

    Ok(success(event, "Event retrieved").into_response())
}

fn validate(payload: &NewEvent) -> Result<(), AppError> {
    if payload.title.trim().is_empty() {
        return Err(AppError::ValidationError(
            "title must not be empty".to_string(),
        ));
    }
    if payload.location.trim().is_empty() {
        return Err(AppError::ValidationError(
            "location must not be empty".to_string(),
        ));
    }
    if payload.end_at <= payload.start_at {
        return Err(AppError::ValidationError(
            "end_at must be after start_at".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn payload() -> NewEvent {
        let start = Utc::now() + Duration::days(1);
        NewEvent {
            title: "Sunday league final".to_string(),
            description: Some("Kickoff at noon".to_string()),
            location: "Riverside park, field 3".to_string(),
            start_at: start,
            end_at: start + Duration::hours(2),
        }
    }

    #[test]
    fn accepts_a_well_formed_submission() {
        assert!(validate(&payload()).is_ok());
    }

    #[test]
    fn rejects_a_blank_title() {
        let mut p = payload();
        p.title = "   ".to_string();
        assert!(matches!(
            validate(&p),
            Err(AppError::ValidationError(msg)) if msg.contains("title")
        ));
    }

    #[test]
    fn rejects_a_blank_location() {
        let mut p = payload();
        p.location = String::new();
        assert!(matches!(
            validate(&p),
            Err(AppError::ValidationError(msg)) if msg.contains("location")
        ));
    }

    #[test]
    fn rejects_an_event_that_ends_before_it_starts() {
        let mut p = payload();
        p.end_at = p.start_at - Duration::minutes(1);
        assert!(validate(&p).is_err());

        // Zero-length events are rejected as well.
        p.end_at = p.start_at;
        assert!(validate(&p).is_err());
    }
}
