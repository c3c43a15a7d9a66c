mod app;
mod args;
mod handlers;
mod metrics;
mod state;

use std::sync::Arc;

use clap::Parser;

use skiff_common::auth::parse_auth_from_env;
use skiff_common::telemetry::init_tracing;
use skiff_lifecycle::{create_host, LifecycleManager};
use skiff_meta::{EtcdMetaStore, RegistryStore};
use skiff_registry::Registry;
use skiff_router::client::client_for_host;
use skiff_router::strategy::parse_strategy;

use crate::args::Args;
use crate::metrics::Metrics;
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let otel_provider = init_tracing(
        "skiff-server",
        args.log_format,
        args.otlp_endpoint.as_deref(),
        args.otlp_token.as_deref(),
    );

    let host = create_host(args.host, &args.host_config())?;
    let lifecycle = LifecycleManager::new(host, args.lifecycle_config());
    let registry = Registry::new(Arc::new(lifecycle.clone()));

    let store = match &args.etcd_endpoint {
        Some(endpoint) => {
            let etcd = EtcdMetaStore::connect(std::slice::from_ref(endpoint)).await?;
            let store = RegistryStore::new(Arc::new(etcd));
            registry.restore(store.load().await?);
            Some(store)
        }
        None => {
            tracing::warn!("no etcd endpoint configured, registry state is in-memory only");
            None
        }
    };

    let strategy = parse_strategy(&args.selection_strategy).map_err(anyhow::Error::msg)?;
    let client = client_for_host(lifecycle.host_kind())?;
    let router = skiff_router::Router::new(registry.clone(), lifecycle.clone(), client)
        .with_strategy(strategy)
        .with_retry_max(args.retry_max);
    tracing::info!(
        host = lifecycle.host_kind(),
        strategy = router.strategy_name(),
        retry_max = args.retry_max,
        "router initialized"
    );

    let health_loop = lifecycle.spawn_health_loop();

    let st = AppState {
        registry,
        lifecycle: lifecycle.clone(),
        router: Arc::new(router),
        store,
        metrics: Arc::new(Metrics::default()),
        auth: parse_auth_from_env(),
    };

    let listener = tokio::net::TcpListener::bind(&args.listen_addr).await?;
    tracing::info!(addr=%args.listen_addr, "skiff-server listening");
    axum::serve(listener, app::build_app(st))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    health_loop.abort();
    lifecycle.shutdown().await;
    if let Some(provider) = otel_provider {
        if let Err(e) = provider.shutdown() {
            eprintln!("failed to flush traces: {e}");
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error=%e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error=%e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received, stopping replicas");
}
