use crate::{AuditEvent, Observer};
use async_trait::async_trait;
use std::io::Write;
use std::path::PathBuf;
use tokio::sync::Mutex;

/// Appends one JSON line per event to a file.
///
/// The file is opened and closed per event; a mutex keeps lines intact when
/// several requests notify at once.
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileObserver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, event: &AuditEvent) -> std::io::Result<()> {
        let line = serde_json::to_string(event)?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{line}")
    }
}

#[async_trait]
impl Observer for FileObserver {
    async fn notify(&self, event: &AuditEvent) {
        let _guard = self.lock.lock().await;
        if let Err(e) = self.append(event) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to write audit event");
        }
    }
}
