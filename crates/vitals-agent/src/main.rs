mod collector;
mod config;
mod grpc;
mod net;
mod sender;
mod service;
mod worker;

use anyhow::Result;
use tokio::signal;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("vitals=info".parse()?))
        .init();

    let config_path = std::env::args().nth(1);
    let config = config::AgentConfig::load(config_path.as_deref())?;

    tracing::info!(
        address = %config.address,
        poll_interval = config.poll_interval,
        report_interval = config.report_interval,
        batch = config.batch,
        rate_limit = config.rate_limit,
        "vitals-agent starting"
    );

    let service = service::MetricsService::new(&config)?;
    service.start(config.poll_interval, config.report_interval);

    shutdown_signal().await;

    service.shutdown().await;
    tracing::info!("Agent gracefully stopped");
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
