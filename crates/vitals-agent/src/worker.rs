//! A bounded pool of send workers.
//!
//! The dispatcher enqueues boxed task closures into a channel of capacity
//! 100; N long-lived workers pull and execute them, logging per-task errors
//! and continuing. Each task receives the shutdown token so an in-flight
//! send aborts on cancellation, while tasks already queued when `stop` is
//! called still drain: the channel closing, not the token, is what ends a
//! worker.

use anyhow::Result;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub type Task = Box<dyn FnOnce(CancellationToken) -> BoxFuture<'static, Result<()>> + Send>;

const QUEUE_CAPACITY: usize = 100;

pub struct WorkerPool {
    worker_count: usize,
    tx: Mutex<Option<mpsc::Sender<Task>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        Self {
            worker_count: worker_count.max(1),
            tx: Mutex::new(None),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawns the workers. `shutdown` is handed to every executing task.
    pub fn start(&self, shutdown: CancellationToken) {
        let (tx, rx) = mpsc::channel::<Task>(QUEUE_CAPACITY);
        let rx = Arc::new(tokio::sync::Mutex::new(rx));

        let mut handles = self.handles.lock().unwrap();
        for _ in 0..self.worker_count {
            let rx = rx.clone();
            let shutdown = shutdown.clone();
            handles.push(tokio::spawn(async move {
                loop {
                    let task = rx.lock().await.recv().await;
                    let Some(task) = task else {
                        return;
                    };
                    if let Err(e) = task(shutdown.clone()).await {
                        tracing::warn!(error = %e, "Error executing task");
                    }
                }
            }));
        }
        *self.tx.lock().unwrap() = Some(tx);
    }

    /// Enqueues a task, waiting while the queue is full. Returns false once
    /// the pool is stopped.
    pub async fn submit(&self, task: Task) -> bool {
        let tx = self.tx.lock().unwrap().clone();
        match tx {
            Some(tx) => tx.send(task).await.is_ok(),
            None => false,
        }
    }

    /// Closes the queue and waits for the workers to drain it and exit.
    pub async fn stop(&self) {
        self.tx.lock().unwrap().take();
        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
    }
}
