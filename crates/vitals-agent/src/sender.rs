//! Shipment of metrics to the server over HTTP.
//!
//! Per request: serialize, then encrypt (when a public key is configured) or
//! gzip, then sign the exact bytes sent, then POST with a fixed retry
//! schedule. Encrypted requests skip signing; possession of the key
//! authenticates them.

use anyhow::{Context, Result};
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::StatusCode;
use rsa::RsaPublicKey;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use vitals_common::metric::Metric;
use vitals_common::pool::Pool;
use vitals_common::{crypto, hash};

const RETRY_WAITS: [Duration; 3] = [
    Duration::from_secs(1),
    Duration::from_secs(3),
    Duration::from_secs(5),
];
const SINGLE_TIMEOUT: Duration = Duration::from_secs(5);
const BATCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
enum SendError {
    #[error("unexpected status code: {0}")]
    Status(StatusCode),
    #[error(transparent)]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Encode(#[from] anyhow::Error),
}

pub struct Sender {
    client: reqwest::Client,
    base_url: String,
    key: Option<String>,
    public_key: Option<RsaPublicKey>,
    local_ip: String,
    // Scratch buffers for gzip output, reused across requests.
    buffers: Pool<Vec<u8>>,
}

impl Sender {
    /// Builds a sender. A public key that fails to load logs a warning and
    /// disables encryption rather than aborting the agent.
    pub fn new(address: &str, key: &str, crypto_key: &str, local_ip: String) -> Self {
        let public_key = if crypto_key.is_empty() {
            None
        } else {
            match crypto::load_public_key(Path::new(crypto_key)) {
                Ok(loaded) => Some(loaded),
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to load public key, encryption disabled");
                    None
                }
            }
        };
        Self {
            client: reqwest::Client::new(),
            base_url: format!("http://{address}"),
            key: (!key.is_empty()).then(|| key.to_string()),
            public_key,
            local_ip,
            buffers: Pool::new(Vec::new),
        }
    }

    /// Ships one metric to `/update` with a 5 s per-request timeout.
    pub async fn send_metric(&self, metric: &Metric) -> Result<()> {
        let payload = serde_json::to_vec(metric).context("failed to serialize metric")?;
        let url = format!("{}/update", self.base_url);
        self.send_with_retry(&url, &payload, SINGLE_TIMEOUT, false)
            .await
    }

    /// Ships a batch to `/updates` with a 30 s per-request timeout.
    ///
    /// A 400 response marks the payload as poison: it is dropped without
    /// retries, since resending the same bytes cannot succeed.
    pub async fn send_batch(&self, metrics: &[Metric]) -> Result<()> {
        if metrics.is_empty() {
            return Ok(());
        }
        let payload = serde_json::to_vec(metrics).context("failed to serialize metrics")?;
        let url = format!("{}/updates", self.base_url);
        self.send_with_retry(&url, &payload, BATCH_TIMEOUT, true)
            .await
    }

    async fn send_with_retry(
        &self,
        url: &str,
        payload: &[u8],
        timeout: Duration,
        drop_on_bad_request: bool,
    ) -> Result<()> {
        let mut last = match self.send_once(url, payload, timeout).await {
            Ok(()) => return Ok(()),
            Err(e) => e,
        };

        if drop_on_bad_request {
            if let SendError::Status(status) = &last {
                if *status == StatusCode::BAD_REQUEST {
                    tracing::warn!(url, "Server rejected batch as malformed, dropping");
                    return Ok(());
                }
            }
        }

        for wait in RETRY_WAITS {
            tokio::time::sleep(wait).await;
            match self.send_once(url, payload, timeout).await {
                Ok(()) => return Ok(()),
                Err(e) => last = e,
            }
        }
        Err(last.into())
    }

    async fn send_once(&self, url: &str, payload: &[u8], timeout: Duration) -> Result<(), SendError> {
        let (body, encoding) = self.encode_body(payload)?;

        let mut request = self
            .client
            .post(url)
            .timeout(timeout)
            .header("Content-Type", "application/json")
            .header("Content-Encoding", encoding)
            .header("X-Real-IP", &self.local_ip);
        if let Some(key) = &self.key {
            if encoding != "encrypt" {
                request = request.header("HashSHA256", hash::compute_hash(&body, key));
            }
        }

        let response = request.body(body).send().await?;
        if !response.status().is_success() {
            return Err(SendError::Status(response.status()));
        }
        Ok(())
    }

    /// Encrypts or compresses the serialized payload, returning the bytes to
    /// send and the matching `Content-Encoding` value.
    fn encode_body(&self, payload: &[u8]) -> Result<(Vec<u8>, &'static str)> {
        if let Some(public_key) = &self.public_key {
            return Ok((crypto::encrypt(payload, public_key)?, "encrypt"));
        }

        let mut buffer = self.buffers.acquire();
        let mut encoder = GzEncoder::new(&mut buffer, Compression::default());
        encoder
            .write_all(payload)
            .context("failed to write data to gzip encoder")?;
        encoder.finish().context("failed to finish gzip encoder")?;
        let body = buffer.clone();
        self.buffers.release(buffer);
        Ok((body, "gzip"))
    }
}
