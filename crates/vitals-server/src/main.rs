use anyhow::Result;
use axum::extract::Request;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tower::Layer;
use tower_http::normalize_path::NormalizePathLayer;
use tracing_subscriber::EnvFilter;
use vitals_audit::{FileObserver, HttpObserver, Subject};
use vitals_common::proto::metrics_server::MetricsServer;
use vitals_server::config::ServerConfig;
use vitals_server::state::AppState;
use vitals_server::{app, grpc};
use vitals_storage::file::FileStorage;
use vitals_storage::memory::MemStorage;
use vitals_storage::sql::SqlStorage;
use vitals_storage::MetricStorage;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vitals=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1);
    let config = ServerConfig::load(config_path.as_deref())?;

    tracing::info!(
        address = %config.address,
        store_interval = config.store_interval,
        store_file = %config.store_file,
        restore = config.restore,
        "vitals-server starting"
    );

    // Pick the storage backend: SQL when a DSN is configured, file-backed
    // when a snapshot path is, plain memory otherwise.
    let mut autosave = None;
    let storage: Arc<dyn MetricStorage> = if !config.database_dsn.is_empty() {
        Arc::new(SqlStorage::new(&config.database_dsn)?)
    } else if !config.store_file.is_empty() {
        let file_storage = Arc::new(FileStorage::new(
            &config.store_file,
            config.store_interval == 0,
            config.restore,
        ));
        if config.store_interval > 0 {
            autosave = Some(
                file_storage
                    .clone()
                    .spawn_autosave(Duration::from_secs(config.store_interval)),
            );
        }
        file_storage
    } else {
        Arc::new(MemStorage::new())
    };

    let audit = Arc::new(Subject::new());
    if !config.audit_file.is_empty() {
        audit.attach(Arc::new(FileObserver::new(&config.audit_file)));
        tracing::info!(path = %config.audit_file, "Audit file observer attached");
    }
    if !config.audit_url.is_empty() {
        audit.attach(Arc::new(HttpObserver::new(&config.audit_url)));
        tracing::info!(url = %config.audit_url, "Audit HTTP observer attached");
    }

    let state = AppState::new(storage.clone(), &config, audit)?;

    let grpc_server = if config.grpc_address.is_empty() {
        None
    } else {
        let addr: SocketAddr = config.grpc_address.parse()?;
        let service = MetricsServer::with_interceptor(
            grpc::MetricsRpc::new(state.service.clone()),
            grpc::trusted_subnet_interceptor(state.trusted_subnet),
        );
        tracing::info!(grpc = %addr, "Starting gRPC server");
        Some(tokio::spawn(async move {
            if let Err(e) = tonic::transport::Server::builder()
                .add_service(service)
                .serve(addr)
                .await
            {
                tracing::error!(error = %e, "gRPC server error");
            }
        }))
    };

    // Trailing-slash normalization must wrap the router so it applies
    // before route matching.
    let router = NormalizePathLayer::trim_trailing_slash().layer(app::build_router(state));
    let listener = tokio::net::TcpListener::bind(&config.address).await?;
    tracing::info!(http = %config.address, "Server started");

    axum::serve(
        listener,
        axum::ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(router),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Shutting down gracefully");
    if let Some(handle) = grpc_server {
        handle.abort();
    }
    if let Some(handle) = autosave {
        handle.abort();
    }
    if let Err(e) = storage.flush().await {
        tracing::warn!(error = %e, "Final flush failed");
    }
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.ok();
    };
    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };
    #[cfg(unix)]
    let quit = async {
        signal::unix::signal(signal::unix::SignalKind::quit())
            .expect("failed to install SIGQUIT handler")
            .recv()
            .await;
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();
    #[cfg(not(unix))]
    let quit = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = quit => {}
    }
}
