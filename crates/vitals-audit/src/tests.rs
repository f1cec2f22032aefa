use crate::{AuditEvent, FileObserver, HttpObserver, Observer, Subject};
use async_trait::async_trait;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

struct Recorder {
    label: &'static str,
    log: Arc<Mutex<Vec<(&'static str, AuditEvent)>>>,
}

#[async_trait]
impl Observer for Recorder {
    async fn notify(&self, event: &AuditEvent) {
        self.log.lock().unwrap().push((self.label, event.clone()));
    }
}

#[tokio::test]
async fn notify_all_preserves_attach_order_and_metric_order() {
    let subject = Subject::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    subject.attach(Arc::new(Recorder {
        label: "first",
        log: log.clone(),
    }));
    subject.attach(Arc::new(Recorder {
        label: "second",
        log: log.clone(),
    }));

    let event = AuditEvent::new(
        vec!["a".to_string(), "b".to_string(), "c".to_string()],
        "10.0.0.1".to_string(),
    );
    subject.notify_all(&event).await;

    let log = log.lock().unwrap();
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].0, "first");
    assert_eq!(log[1].0, "second");
    assert_eq!(log[0].1.metrics, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn detached_observer_is_not_notified() {
    let subject = Subject::new();
    let log = Arc::new(Mutex::new(Vec::new()));

    let observer: Arc<dyn Observer> = Arc::new(Recorder {
        label: "only",
        log: log.clone(),
    });
    subject.attach(observer.clone());
    subject.detach(&observer);
    assert!(subject.is_empty());

    subject
        .notify_all(&AuditEvent::new(vec!["m".to_string()], "::1".to_string()))
        .await;
    assert!(log.lock().unwrap().is_empty());
}

#[tokio::test]
async fn file_observer_appends_one_json_line_per_event() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("audit.log");
    let observer = FileObserver::new(&path);

    observer
        .notify(&AuditEvent::new(vec!["hits".to_string()], "10.0.0.1".to_string()))
        .await;
    observer
        .notify(&AuditEvent::new(vec!["temp".to_string()], "10.0.0.2".to_string()))
        .await;

    let content = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 2);

    let first: AuditEvent = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first.metrics, vec!["hits"]);
    assert_eq!(first.ip_address, "10.0.0.1");

    let raw: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
    assert!(raw["ts"].is_i64());
}

#[tokio::test]
async fn file_observer_failure_is_swallowed() {
    let observer = FileObserver::new("/nonexistent-dir/audit.log");
    // Must not panic or propagate.
    observer
        .notify(&AuditEvent::new(vec!["m".to_string()], "::1".to_string()))
        .await;
}

async fn spawn_sink(status: StatusCode) -> (String, Arc<AtomicUsize>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let state = hits.clone();
    let app = Router::new()
        .route(
            "/audit",
            post(
                move |State(hits): State<Arc<AtomicUsize>>, Json(_event): Json<AuditEvent>| async move {
                    hits.fetch_add(1, Ordering::SeqCst);
                    status
                },
            ),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}/audit"), hits)
}

#[tokio::test]
async fn http_observer_posts_the_event() {
    let (url, hits) = spawn_sink(StatusCode::OK).await;
    let observer = HttpObserver::new(url);

    observer
        .notify(&AuditEvent::new(vec!["hits".to_string()], "10.1.2.3".to_string()))
        .await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn http_observer_does_not_retry_client_errors() {
    let (url, hits) = spawn_sink(StatusCode::BAD_REQUEST).await;
    let observer = HttpObserver::new(url);

    observer
        .notify(&AuditEvent::new(vec!["hits".to_string()], "10.1.2.3".to_string()))
        .await;
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}
