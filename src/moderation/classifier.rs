use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("classifier returned {0}")]
    Status(StatusCode),

    #[error("classifier call exceeded {0:?}")]
    Timeout(Duration),
}

/// Spam decision for one piece of text. Implementations must treat every
/// call as independent; the worker owns retries and timeouts.
#[async_trait]
pub trait SpamClassifier: Send + Sync {
    /// Returns `true` when `text` reads as spam.
    async fn classify(&self, text: &str) -> Result<bool, ClassifierError>;
}

#[derive(Serialize)]
struct ClassifyRequest<'a> {
    text: &'a str,
}

#[derive(Deserialize)]
struct ClassifyResponse {
    spam: bool,
}

/// Client for the external classification service.
pub struct HttpClassifier {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpClassifier {
    pub fn new(url: String, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
            timeout,
        }
    }
}

#[async_trait]
impl SpamClassifier for HttpClassifier {
    async fn classify(&self, text: &str) -> Result<bool, ClassifierError> {
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&ClassifyRequest { text })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ClassifierError::Status(response.status()));
        }

        let body: ClassifyResponse = response.json().await?;
        Ok(body.spam)
    }
}
