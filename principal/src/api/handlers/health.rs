use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct HealthBody {
    pub ok: bool,
    pub store_reachable: bool,
    pub node_count: usize,
    pub pod_count: usize,
}

/// Liveness/readiness: the process is up, and its store connection still
/// answers. A store probe failure degrades the response to 503 rather than
/// panicking -- a caller polling `/healthz` should see exactly that.
pub async fn healthz(Extension(state): Extension<Arc<AppState>>) -> (StatusCode, Json<HealthBody>) {
    let store_reachable = state.store.get("healthz/probe").await.is_ok();
    let node_count = state.nodes.list().await.unwrap_or_default().len();
    let pod_count = state.pods.list().await.len();
    let ok = store_reachable;
    let status = if ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(HealthBody {
            ok,
            store_reachable,
            node_count,
            pod_count,
        }),
    )
}
