//! gRPC ingestion surface: one unary `UpdateMetrics` call, gated by the same
//! trusted-subnet rule as the HTTP side via `x-real-ip` metadata.

use crate::service::{MetricsService, ServiceError};
use ipnet::IpNet;
use std::net::IpAddr;
use tonic::{Request, Response, Status};
use vitals_common::metric::Metric;
use vitals_common::proto::metrics_server::Metrics;
use vitals_common::proto::{UpdateMetricsRequest, UpdateMetricsResponse};

pub struct MetricsRpc {
    service: MetricsService,
}

impl MetricsRpc {
    pub fn new(service: MetricsService) -> Self {
        Self { service }
    }
}

#[tonic::async_trait]
impl Metrics for MetricsRpc {
    async fn update_metrics(
        &self,
        request: Request<UpdateMetricsRequest>,
    ) -> Result<Response<UpdateMetricsResponse>, Status> {
        let req = request.into_inner();
        if req.metrics.is_empty() {
            return Err(Status::invalid_argument("no metrics provided"));
        }

        let mut metrics = Vec::with_capacity(req.metrics.len());
        for proto_metric in &req.metrics {
            let metric = Metric::from_proto(proto_metric)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            metrics.push(metric);
        }

        self.service.update_batch(&metrics).await.map_err(|e| {
            match e {
                ServiceError::Storage(ref inner) => {
                    tracing::error!(error = %inner, "Failed to update metrics batch");
                    Status::internal("failed to update metrics")
                }
                other => Status::invalid_argument(other.to_string()),
            }
        })?;

        tracing::debug!(count = metrics.len(), "Metrics ingested via gRPC");
        Ok(Response::new(UpdateMetricsResponse {}))
    }
}

/// Unary interceptor enforcing the trusted-subnet rule on `x-real-ip`
/// metadata. Unconfigured subnet admits every call.
pub fn trusted_subnet_interceptor(
    subnet: Option<IpNet>,
) -> impl FnMut(Request<()>) -> Result<Request<()>, Status> + Clone {
    move |req: Request<()>| {
        let Some(subnet) = subnet else {
            return Ok(req);
        };

        let Some(real_ip) = req.metadata().get("x-real-ip").and_then(|v| v.to_str().ok()) else {
            tracing::warn!("x-real-ip metadata is required but missing");
            return Err(Status::permission_denied("x-real-ip metadata is required"));
        };

        let Ok(ip) = real_ip.parse::<IpAddr>() else {
            tracing::warn!(real_ip, "Invalid IP address in x-real-ip metadata");
            return Err(Status::permission_denied(
                "Invalid IP address in x-real-ip metadata",
            ));
        };

        if !subnet.contains(&ip) {
            tracing::warn!(ip = %ip, subnet = %subnet, "IP address is not in trusted subnet");
            return Err(Status::permission_denied(
                "IP address is not in trusted subnet",
            ));
        }

        Ok(req)
    }
}
