use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::models::ModerationVerdict;
use crate::store::EventStore;

pub mod classifier;
pub mod retry;

pub use classifier::{ClassifierError, HttpClassifier, SpamClassifier};

/// How many times the verdict write is attempted before the event is left
/// stranded in pending. The lifecycle scheduler alarms on stranded events.
const FINALIZE_WRITE_ATTEMPTS: u32 = 3;
const FINALIZE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Moderates newly submitted events in the background. Each submission gets
/// its own task; nothing about a slow or failing classifier is allowed to
/// surface in the submit request.
pub struct ModerationWorker {
    store: Arc<dyn EventStore>,
    classifier: Arc<dyn SpamClassifier>,
    call_timeout: Duration,
}

impl ModerationWorker {
    pub fn new(
        store: Arc<dyn EventStore>,
        classifier: Arc<dyn SpamClassifier>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            store,
            classifier,
            call_timeout,
        }
    }

    /// Fire-and-forget moderation of one submitted event. The caller returns
    /// immediately; the spawned task owns the outcome.
    pub fn spawn(
        self: Arc<Self>,
        id: Uuid,
        title: String,
        description: Option<String>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.moderate(id, &title, description.as_deref()).await;
        })
    }

    async fn moderate(&self, id: Uuid, title: &str, description: Option<&str>) {
        let verdict = match self.classify_with_retry(id, title, description).await {
            Some(verdict) => verdict,
            None => {
                // The classifier never answered. Content we could not vet
                // must not go live on a guess.
                warn!(event_id = %id, "Classifier unavailable, defaulting to spam");
                ModerationVerdict::Spam
            }
        };

        self.finalize(id, verdict).await;
    }

    async fn classify_with_retry(
        &self,
        id: Uuid,
        title: &str,
        description: Option<&str>,
    ) -> Option<ModerationVerdict> {
        let mut attempt = 0;
        loop {
            match self.classify_once(title, description).await {
                Ok(verdict) => return Some(verdict),
                Err(err) => match retry::after_failure(attempt) {
                    retry::RetryStep::Retry {
                        attempt: next,
                        delay,
                    } => {
                        warn!(
                            event_id = %id,
                            attempt,
                            error = %err,
                            retry_in_ms = delay.as_millis() as u64,
                            "Classification attempt failed"
                        );
                        tokio::time::sleep(delay).await;
                        attempt = next;
                    }
                    retry::RetryStep::GiveUp => {
                        warn!(
                            event_id = %id,
                            attempt,
                            error = %err,
                            "Classification attempt failed, attempt budget exhausted"
                        );
                        return None;
                    }
                },
            }
        }
    }

    /// One full classification pass. The title goes first: a spammy title
    /// settles the verdict without a second call. Blank descriptions are not
    /// sent at all.
    async fn classify_once(
        &self,
        title: &str,
        description: Option<&str>,
    ) -> Result<ModerationVerdict, ClassifierError> {
        if self.bounded_classify(title).await? {
            return Ok(ModerationVerdict::Spam);
        }

        if let Some(description) = description.filter(|d| !d.trim().is_empty()) {
            if self.bounded_classify(description).await? {
                return Ok(ModerationVerdict::Spam);
            }
        }

        Ok(ModerationVerdict::Approved)
    }

    /// Classifier implementations are not trusted to return: every call gets
    /// a hard upper bound, and hitting it counts as a failed attempt.
    async fn bounded_classify(&self, text: &str) -> Result<bool, ClassifierError> {
        tokio::time::timeout(self.call_timeout, self.classifier.classify(text))
            .await
            .map_err(|_| ClassifierError::Timeout(self.call_timeout))?
    }

    async fn finalize(&self, id: Uuid, verdict: ModerationVerdict) {
        for write_attempt in 0..FINALIZE_WRITE_ATTEMPTS {
            match self.store.finalize_moderation(id, verdict).await {
                Ok(true) => {
                    info!(event_id = %id, status = %verdict.status(), "Moderation complete");
                    return;
                }
                Ok(false) => {
                    // Something else moved the event out of pending first.
                    warn!(event_id = %id, "Event no longer pending, dropping verdict");
                    return;
                }
                Err(err) => {
                    warn!(event_id = %id, write_attempt, error = %err, "Verdict write failed");
                    if write_attempt + 1 < FINALIZE_WRITE_ATTEMPTS {
                        tokio::time::sleep(FINALIZE_RETRY_DELAY).await;
                    }
                }
            }
        }

        error!(
            event_id = %id,
            status = %verdict.status(),
            "Verdict could not be written, event stranded in pending"
        );
    }
}
