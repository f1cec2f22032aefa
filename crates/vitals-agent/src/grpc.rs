//! gRPC shipment path: one batched `UpdateMetrics` call per report.

use anyhow::{Context, Result};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use vitals_common::metric::Metric;
use vitals_common::proto::metrics_client::MetricsClient;
use vitals_common::proto::UpdateMetricsRequest;

const RPC_DEADLINE: Duration = Duration::from_secs(10);

pub struct RpcClient {
    client: MetricsClient<Channel>,
}

impl RpcClient {
    /// Builds a client with a lazy connection; the first call dials.
    pub fn new(address: &str) -> Result<Self> {
        let endpoint = if address.contains("://") {
            address.to_string()
        } else {
            format!("http://{address}")
        };
        let channel = Endpoint::from_shared(endpoint)
            .context("invalid gRPC address")?
            .connect_lazy();
        Ok(Self {
            client: MetricsClient::new(channel),
        })
    }

    /// Ships the batch with a 10 s deadline and the caller IP as metadata.
    pub async fn update_metrics(&self, metrics: &[Metric], client_ip: &str) -> Result<()> {
        let mut request = tonic::Request::new(UpdateMetricsRequest {
            metrics: metrics.iter().map(Metric::to_proto).collect(),
        });
        request.set_timeout(RPC_DEADLINE);
        request.metadata_mut().insert(
            "x-real-ip",
            client_ip.parse().context("invalid x-real-ip metadata")?,
        );

        self.client
            .clone()
            .update_metrics(request)
            .await
            .context("gRPC UpdateMetrics failed")?;
        tracing::debug!(count = metrics.len(), "Metrics sent via gRPC");
        Ok(())
    }
}
