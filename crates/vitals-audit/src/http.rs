use crate::{AuditEvent, Observer};
use async_trait::async_trait;
use std::time::Duration;

const MAX_RETRIES: u32 = 3;
const BACKOFF_MIN: Duration = Duration::from_secs(1);
const BACKOFF_MAX: Duration = Duration::from_secs(10);

/// POSTs events to an HTTP sink with a retry-aware client.
///
/// Transport errors and 5xx responses retry with exponential backoff bounded
/// to 1..10 s; 4xx responses are treated as final. Failures are logged only.
pub struct HttpObserver {
    url: String,
    client: reqwest::Client,
}

impl HttpObserver {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
        }
    }

    fn backoff(attempt: u32) -> Duration {
        (BACKOFF_MIN * 2u32.saturating_pow(attempt)).min(BACKOFF_MAX)
    }
}

#[async_trait]
impl Observer for HttpObserver {
    async fn notify(&self, event: &AuditEvent) {
        for attempt in 0..=MAX_RETRIES {
            match self.client.post(&self.url).json(event).send().await {
                Ok(resp) if resp.status().is_success() => return,
                Ok(resp) if resp.status().is_client_error() => {
                    tracing::warn!(
                        url = %self.url,
                        status = %resp.status(),
                        "Audit sink rejected event"
                    );
                    return;
                }
                Ok(resp) => {
                    tracing::warn!(
                        url = %self.url,
                        status = %resp.status(),
                        attempt,
                        "Audit sink returned server error"
                    );
                }
                Err(e) => {
                    tracing::warn!(url = %self.url, error = %e, attempt, "Audit sink unreachable");
                }
            }
            if attempt < MAX_RETRIES {
                tokio::time::sleep(Self::backoff(attempt)).await;
            }
        }
        tracing::warn!(url = %self.url, "Audit event dropped after retries");
    }
}
