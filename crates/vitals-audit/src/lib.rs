//! Fan-out of metric-change events to attached observers.
//!
//! The server builds one [`AuditEvent`] per request that touched metrics and
//! hands it to a [`Subject`], which notifies every attached observer in
//! attach order. Observer failures are logged and swallowed; they must never
//! fail the request that triggered the event.

mod file;
mod http;

#[cfg(test)]
mod tests;

pub use file::FileObserver;
pub use http::HttpObserver;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, RwLock};

/// A record of the metrics touched by one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// UNIX seconds.
    #[serde(rename = "ts")]
    pub timestamp: i64,
    /// Metric ids in the order the request touched them.
    pub metrics: Vec<String>,
    pub ip_address: String,
}

impl AuditEvent {
    pub fn new(metrics: Vec<String>, ip_address: String) -> Self {
        Self {
            timestamp: chrono::Utc::now().timestamp(),
            metrics,
            ip_address,
        }
    }
}

#[async_trait]
pub trait Observer: Send + Sync {
    async fn notify(&self, event: &AuditEvent);
}

/// Holds the observer list and fans events out to it.
#[derive(Default)]
pub struct Subject {
    observers: RwLock<Vec<Arc<dyn Observer>>>,
}

impl Subject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, observer: Arc<dyn Observer>) {
        self.observers.write().unwrap().push(observer);
    }

    pub fn detach(&self, observer: &Arc<dyn Observer>) {
        self.observers
            .write()
            .unwrap()
            .retain(|o| !Arc::ptr_eq(o, observer));
    }

    pub fn is_empty(&self) -> bool {
        self.observers.read().unwrap().is_empty()
    }

    /// Notifies all observers in attach order.
    ///
    /// The list is snapshotted under the read lock and released before any
    /// observer runs, so slow observers never block attach/detach.
    pub async fn notify_all(&self, event: &AuditEvent) {
        let observers: Vec<_> = self.observers.read().unwrap().clone();
        for observer in observers {
            observer.notify(event).await;
        }
    }
}
