//! Agent lifecycle: two pollers and a dispatcher over one cancellation
//! token, with a worker pool executing the sends.

use crate::collector::Collector;
use crate::config::AgentConfig;
use crate::grpc::RpcClient;
use crate::net;
use crate::sender::Sender;
use crate::worker::{Task, WorkerPool};
use anyhow::{anyhow, Result};
use futures::FutureExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use vitals_common::metric::Metric;

const FINAL_SEND_DEADLINE: Duration = Duration::from_secs(10);

pub struct MetricsService {
    collector: Arc<Collector>,
    shipper: Arc<Shipper>,
    pool: Arc<WorkerPool>,
    token: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl MetricsService {
    pub fn new(config: &AgentConfig) -> Result<Self> {
        let local_ip = match net::local_ip() {
            Ok(ip) => ip.to_string(),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to resolve local IP, using empty value");
                String::new()
            }
        };

        let rpc = if config.grpc_address.is_empty() {
            None
        } else {
            match RpcClient::new(&config.grpc_address) {
                Ok(client) => {
                    tracing::info!(address = %config.grpc_address, "gRPC client initialized");
                    Some(client)
                }
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to create gRPC client, falling back to HTTP");
                    None
                }
            }
        };

        Ok(Self {
            collector: Arc::new(Collector::new()?),
            shipper: Arc::new(Shipper {
                sender: Sender::new(
                    &config.address,
                    &config.key,
                    &config.crypto_key,
                    local_ip.clone(),
                ),
                rpc,
                use_batch: config.batch,
                local_ip,
            }),
            pool: Arc::new(WorkerPool::new(config.rate_limit)),
            token: CancellationToken::new(),
            handles: Mutex::new(Vec::new()),
        })
    }

    /// Launches the runtime poller, the system poller, and the dispatcher.
    pub fn start(&self, poll_interval: u64, report_interval: u64) {
        self.pool.start(self.token.clone());

        let mut handles = self.handles.lock().unwrap();

        let collector = self.collector.clone();
        let token = self.token.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(poll_interval));
            tick.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => collector.collect_runtime(),
                    _ = token.cancelled() => return,
                }
            }
        }));

        let collector = self.collector.clone();
        let token = self.token.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(poll_interval));
            tick.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => collector.collect_system(),
                    _ = token.cancelled() => return,
                }
            }
        }));

        let collector = self.collector.clone();
        let shipper = self.shipper.clone();
        let pool = self.pool.clone();
        let token = self.token.clone();
        handles.push(tokio::spawn(async move {
            let mut tick = tokio::time::interval(Duration::from_secs(report_interval));
            tick.tick().await; // discard the immediate first tick
            loop {
                tokio::select! {
                    _ = tick.tick() => enqueue_send(&collector, &shipper, &pool).await,
                    _ = token.cancelled() => return,
                }
            }
        }));
    }

    /// Graceful shutdown: stop collection, flush once with a fresh deadline,
    /// drain the workers, join the pollers.
    pub async fn shutdown(&self) {
        tracing::info!("Agent shutdown: stopping metrics collection");
        self.token.cancel();
        tokio::time::sleep(Duration::from_millis(100)).await;

        tracing::info!("Agent shutdown: sending final metrics");
        self.send_final().await;

        tracing::info!("Agent shutdown: waiting for tasks to complete");
        self.pool.stop().await;

        let handles: Vec<_> = self.handles.lock().unwrap().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }
        tracing::info!("Agent shutdown: all operations completed");
    }

    /// One final send under a fresh 10 s deadline, so the signal that
    /// triggered shutdown cannot discard the last samples.
    async fn send_final(&self) {
        let metrics = self.collector.to_metrics();
        if metrics.is_empty() {
            return;
        }

        match tokio::time::timeout(FINAL_SEND_DEADLINE, self.shipper.send(&metrics)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::warn!(error = %e, "Final metrics send failed"),
            Err(_) => tracing::warn!("Final metrics send timed out"),
        }
    }
}

/// Snapshots the collector and enqueues the send work: one batch task in
/// batch or RPC mode, one task per metric otherwise. Tasks capture copies of
/// the snapshot, so workers never alias the live maps.
async fn enqueue_send(collector: &Collector, shipper: &Arc<Shipper>, pool: &WorkerPool) {
    let metrics = collector.to_metrics();
    if metrics.is_empty() {
        return;
    }

    if shipper.use_batch || shipper.rpc.is_some() {
        let shipper = shipper.clone();
        let task: Task = Box::new(move |task_token| {
            async move {
                tokio::select! {
                    result = shipper.send(&metrics) => result,
                    _ = task_token.cancelled() => Err(anyhow!("send aborted by shutdown")),
                }
            }
            .boxed()
        });
        if !pool.submit(task).await {
            tracing::warn!("Worker pool is stopped, dropping send task");
        }
        return;
    }

    // Single-metric mode: one task per metric, spread across the workers.
    for metric in metrics {
        let shipper = shipper.clone();
        let task: Task = Box::new(move |task_token| {
            async move {
                tokio::select! {
                    result = shipper.sender.send_metric(&metric) => result,
                    _ = task_token.cancelled() => Err(anyhow!("send aborted by shutdown")),
                }
            }
            .boxed()
        });
        if !pool.submit(task).await {
            tracing::warn!("Worker pool is stopped, dropping send tasks");
            return;
        }
    }
}

/// The transport choice: RPC with HTTP fallback when configured, plain HTTP
/// otherwise.
struct Shipper {
    sender: Sender,
    rpc: Option<RpcClient>,
    use_batch: bool,
    local_ip: String,
}

impl Shipper {
    async fn send(&self, metrics: &[Metric]) -> Result<()> {
        if let Some(rpc) = &self.rpc {
            if let Err(e) = rpc.update_metrics(metrics, &self.local_ip).await {
                tracing::warn!(error = %e, "gRPC send failed, falling back to HTTP");
                return self.send_http(metrics).await;
            }
            return Ok(());
        }
        self.send_http(metrics).await
    }

    async fn send_http(&self, metrics: &[Metric]) -> Result<()> {
        if self.use_batch {
            self.sender.send_batch(metrics).await
        } else {
            for metric in metrics {
                self.sender.send_metric(metric).await?;
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Bytes;
    use axum::extract::State;
    use axum::http::StatusCode;
    use axum::routing::post;
    use axum::Router;
    use flate2::read::GzDecoder;
    use std::io::Read;

    async fn spawn_capture_server() -> (String, Arc<Mutex<Vec<Vec<Metric>>>>) {
        let batches: Arc<Mutex<Vec<Vec<Metric>>>> = Arc::new(Mutex::new(Vec::new()));
        let state = batches.clone();
        let app = Router::new()
            .route(
                "/updates",
                post(
                    |State(batches): State<Arc<Mutex<Vec<Vec<Metric>>>>>, body: Bytes| async move {
                        let mut inflated = Vec::new();
                        GzDecoder::new(&body[..]).read_to_end(&mut inflated).unwrap();
                        let metrics: Vec<Metric> = serde_json::from_slice(&inflated).unwrap();
                        batches.lock().unwrap().push(metrics);
                        StatusCode::OK
                    },
                ),
            )
            .route(
                "/update",
                post(
                    |State(batches): State<Arc<Mutex<Vec<Vec<Metric>>>>>, body: Bytes| async move {
                        let mut inflated = Vec::new();
                        GzDecoder::new(&body[..]).read_to_end(&mut inflated).unwrap();
                        let metric: Metric = serde_json::from_slice(&inflated).unwrap();
                        batches.lock().unwrap().push(vec![metric]);
                        StatusCode::OK
                    },
                ),
            )
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        (addr.to_string(), batches)
    }

    #[tokio::test]
    async fn shutdown_flushes_collected_metrics() {
        let (addr, batches) = spawn_capture_server().await;

        let config = AgentConfig {
            address: addr,
            poll_interval: 1,
            // Far in the future: only the shutdown flush may deliver.
            report_interval: 3600,
            ..Default::default()
        };
        let service = MetricsService::new(&config).unwrap();
        service.start(config.poll_interval, config.report_interval);

        // Let at least one poll land (the first poll fires after one
        // poll_interval).
        tokio::time::sleep(Duration::from_millis(1200)).await;
        service.shutdown().await;

        let batches = batches.lock().unwrap();
        assert_eq!(batches.len(), 1);
        let flushed = &batches[0];
        assert!(flushed.iter().any(|m| m.id == "PollCount"));
        assert!(flushed.iter().any(|m| m.id == "Alloc"));
    }

    #[tokio::test]
    async fn dispatcher_ships_batches_on_the_report_interval() {
        let (addr, batches) = spawn_capture_server().await;

        let config = AgentConfig {
            address: addr,
            poll_interval: 1,
            report_interval: 1,
            ..Default::default()
        };
        let service = MetricsService::new(&config).unwrap();
        service.start(config.poll_interval, config.report_interval);

        tokio::time::sleep(Duration::from_millis(1300)).await;
        service.shutdown().await;

        assert!(!batches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn single_metric_mode_ships_one_request_per_metric() {
        let (addr, batches) = spawn_capture_server().await;

        let config = AgentConfig {
            address: addr,
            poll_interval: 1,
            report_interval: 3600,
            batch: false,
            ..Default::default()
        };
        let service = MetricsService::new(&config).unwrap();
        service.start(config.poll_interval, config.report_interval);

        tokio::time::sleep(Duration::from_millis(1200)).await;
        service.shutdown().await;

        let batches = batches.lock().unwrap();
        // One request per metric, each carrying exactly one record.
        assert!(batches.len() > 1);
        assert!(batches.iter().all(|b| b.len() == 1));
        assert!(batches.iter().any(|b| b[0].id == "PollCount"));
    }

    #[tokio::test]
    async fn shutdown_without_samples_sends_nothing() {
        let (addr, batches) = spawn_capture_server().await;

        let config = AgentConfig {
            address: addr,
            poll_interval: 3600,
            report_interval: 3600,
            ..Default::default()
        };
        let service = MetricsService::new(&config).unwrap();
        service.start(config.poll_interval, config.report_interval);
        service.shutdown().await;

        assert!(batches.lock().unwrap().is_empty());
    }
}
