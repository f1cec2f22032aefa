//! Thin layer between the request handlers and the storage contract.
//!
//! Converts storage results into the error kinds a handler maps onto status
//! codes, and keeps kind/payload agreement checks out of the handlers.

use axum::http::StatusCode;
use std::collections::HashMap;
use std::sync::Arc;
use vitals_common::metric::{InvalidMetric, Metric, MetricKind, MetricValue};
use vitals_storage::{MetricStorage, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error(transparent)]
    InvalidRecord(#[from] InvalidMetric),
    #[error("metric not found")]
    NotFound,
    #[error(transparent)]
    Storage(StorageError),
}

impl From<StorageError> for ServiceError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::InvalidRecord(invalid) => ServiceError::InvalidRecord(invalid),
            other => ServiceError::Storage(other),
        }
    }
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::InvalidRecord(_) => StatusCode::BAD_REQUEST,
            ServiceError::NotFound => StatusCode::NOT_FOUND,
            ServiceError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Clone)]
pub struct MetricsService {
    storage: Arc<dyn MetricStorage>,
}

impl MetricsService {
    pub fn new(storage: Arc<dyn MetricStorage>) -> Self {
        Self { storage }
    }

    /// Applies a single update, requiring the payload to match the kind.
    pub async fn apply(
        &self,
        kind: MetricKind,
        name: &str,
        value: MetricValue,
    ) -> Result<(), ServiceError> {
        if name.is_empty() {
            return Err(ServiceError::InvalidRecord(InvalidMetric::MissingId));
        }
        match (kind, value) {
            (MetricKind::Gauge, MetricValue::Gauge(v)) => {
                self.storage.update_gauge(name, v).await?;
            }
            (MetricKind::Counter, MetricValue::Counter(d)) => {
                self.storage.update_counter(name, d).await?;
            }
            (MetricKind::Gauge, _) => {
                return Err(ServiceError::InvalidRecord(InvalidMetric::MissingValue));
            }
            (MetricKind::Counter, _) => {
                return Err(ServiceError::InvalidRecord(InvalidMetric::MissingDelta));
            }
        }
        Ok(())
    }

    /// Returns the current value of `name`, or `NotFound`.
    pub async fn value(&self, kind: MetricKind, name: &str) -> Result<MetricValue, ServiceError> {
        match kind {
            MetricKind::Gauge => self
                .storage
                .gauges()
                .await?
                .get(name)
                .copied()
                .map(MetricValue::Gauge)
                .ok_or(ServiceError::NotFound),
            MetricKind::Counter => self
                .storage
                .counters()
                .await?
                .get(name)
                .copied()
                .map(MetricValue::Counter)
                .ok_or(ServiceError::NotFound),
        }
    }

    /// Validates every record, then applies the batch through the store.
    ///
    /// Nothing is written when any record is invalid, so a rejected batch is
    /// never partially observable regardless of backend.
    pub async fn update_batch(&self, metrics: &[Metric]) -> Result<(), ServiceError> {
        for metric in metrics {
            metric.payload()?;
        }
        self.storage.update_batch(metrics).await?;
        Ok(())
    }

    pub async fn gauges(&self) -> Result<Arc<HashMap<String, f64>>, ServiceError> {
        Ok(self.storage.gauges().await?)
    }

    pub async fn counters(&self) -> Result<Arc<HashMap<String, i64>>, ServiceError> {
        Ok(self.storage.counters().await?)
    }

    pub async fn ping(&self) -> Result<(), ServiceError> {
        Ok(self.storage.ping().await?)
    }
}
