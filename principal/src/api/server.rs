use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::{Extension, Router};
use store::Store;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use worker::ContainerRuntime;

use crate::api::handlers::{health, nodes, pods, schedule};
use crate::registry::{NodeRegistry, PodRegistry};
use crate::scheduler::{BalancedScheduler, DdqnScheduler};
use crate::telemetry::Telemetry;

/// Every collaborator a handler might need, shared across the process via
/// `Extension`. Handlers only ever see this through an `Arc`, so cloning it
/// to satisfy Axum's per-request extractor is just a refcount bump.
pub struct AppState {
    pub store: Arc<dyn Store>,
    pub runtime: Arc<dyn ContainerRuntime>,
    pub nodes: Arc<NodeRegistry>,
    pub pods: Arc<PodRegistry>,
    pub balanced: Arc<BalancedScheduler>,
    pub ddqn: Arc<DdqnScheduler>,
    pub telemetry: Arc<Telemetry>,
    /// Cancelled when the process begins graceful shutdown. Scheduling calls
    /// in flight at that point treat it as a no-op if it fires before they've
    /// bound a node, and ignore it once they have.
    pub cancellation: CancellationToken,
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/nodes", post(nodes::register).get(nodes::list))
        .route(
            "/nodes/:name",
            get(nodes::get).delete(nodes::remove),
        )
        .route("/nodes/:name/schedule", post(nodes::schedule_onto))
        .route("/pods", post(pods::create).get(pods::list))
        .route(
            "/pods/:namespace/:name",
            get(pods::get).delete(pods::remove),
        )
        .route("/pods/:namespace/:name/start", post(pods::start))
        .route("/pods/:namespace/:name/stop", post(pods::stop))
        .route("/pods/:namespace/:name/restart", post(pods::restart))
        .route("/kube_schedule", post(schedule::kube_schedule))
        .route("/DDQN_schedule", post(schedule::ddqn_schedule))
        .route("/save_kube_schedule", post(schedule::save_kube_schedule))
        .route("/save_DDQN_schedule", post(schedule::save_ddqn_schedule))
        .layer(Extension(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(
    bind: SocketAddr,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    let app = router(state);
    tracing::info!(%bind, "listening");
    axum::Server::bind(&bind)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
}
