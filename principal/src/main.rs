pub mod api;
pub mod config;
pub mod registry;
pub mod scheduler;
pub mod telemetry;

use std::process::ExitCode as ProcessExitCode;
use std::sync::Arc;

use dotenv::dotenv;
use store::{RedisStore, Store};
use tokio_util::sync::CancellationToken;
use worker::{BollardContainerRuntime, ContainerRuntime};

use crate::api::server::{self, AppState};
use crate::config::{Config, ExitCode};
use crate::registry::{NodeRegistry, PodRegistry};
use crate::scheduler::{balanced::ScoringWeights, BalancedScheduler, DdqnScheduler};
use crate::telemetry::Telemetry;

/// Seed node count the DDQN scheduler starts with; `schedule` rebuilds its
/// networks as soon as the live fleet size first diverges from this, so the
/// only consequence of getting it wrong is one extra rebuild.
const DDQN_INITIAL_NODE_COUNT: usize = 1;
const DDQN_SEED: u64 = 0xC0FFEE;

fn main() -> ProcessExitCode {
    dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return ProcessExitCode::from(ExitCode::ConfigError as u8);
        }
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("failed to build tokio runtime");

    match runtime.block_on(run(config)) {
        Ok(()) => ProcessExitCode::from(ExitCode::Ok as u8),
        Err(code) => ProcessExitCode::from(code as u8),
    }
}

async fn run(config: Config) -> Result<(), ExitCode> {
    let store: Arc<dyn Store> = match RedisStore::new(&config.store_addr) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            tracing::error!(error = %e, store_addr = %config.store_addr, "store unreachable at startup");
            return Err(ExitCode::StoreUnreachable);
        }
    };

    let container_runtime: Arc<dyn ContainerRuntime> = match BollardContainerRuntime::new().await {
        Ok(rt) => Arc::new(rt),
        Err(e) => {
            tracing::error!(error = %e, "container runtime unreachable at startup");
            return Err(ExitCode::StoreUnreachable);
        }
    };

    let nodes = Arc::new(NodeRegistry::new(store.clone()));
    let pods = Arc::new(PodRegistry::new(store.clone(), container_runtime.clone()));
    let balanced = Arc::new(BalancedScheduler::new(ScoringWeights::default()));
    let ddqn = Arc::new(DdqnScheduler::new(DDQN_INITIAL_NODE_COUNT, DDQN_SEED));
    let telemetry = Arc::new(Telemetry::new());
    let cancellation = CancellationToken::new();

    let state = Arc::new(AppState {
        store,
        runtime: container_runtime,
        nodes,
        pods,
        balanced,
        ddqn,
        telemetry,
        cancellation: cancellation.clone(),
    });

    server::serve(config.bind, state, shutdown_signal(cancellation))
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "http server error");
            ExitCode::StoreUnreachable
        })
}

/// Resolves on Ctrl-C or SIGTERM, whichever comes first, so the server
/// shuts down gracefully under both an interactive session and an
/// orchestrator sending SIGTERM. Cancels `token` first, so in-flight
/// scheduling calls see it before axum stops accepting new connections.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("shutdown signal received");
    token.cancel();
}
