use std::sync::Arc;

use axum::extract::{Extension, Path, Query};
use axum::http::StatusCode;
use axum::Json;
use models::{Node, NodeManifest, Pod, PodManifest};

use crate::api::error::ApiError;
use crate::api::server::AppState;

pub async fn register(
    Extension(state): Extension<Arc<AppState>>,
    Json(manifest): Json<NodeManifest>,
) -> Result<(StatusCode, Json<Node>), ApiError> {
    let node = Node::try_from(manifest)?;
    state.nodes.register(node.clone()).await?;
    Ok((StatusCode::CREATED, Json(node)))
}

pub async fn list(Extension(state): Extension<Arc<AppState>>) -> Result<Json<Vec<Node>>, ApiError> {
    Ok(Json(state.nodes.list().await?))
}

pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<Node>, ApiError> {
    Ok(Json(state.nodes.get(&name).await?))
}

#[derive(Debug, serde::Deserialize)]
pub struct RemoveQuery {
    #[serde(default)]
    pub force: bool,
}

pub async fn remove(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    Query(query): Query<RemoveQuery>,
) -> Result<StatusCode, ApiError> {
    let orphaned = state.nodes.remove(&name, query.force).await?;
    for pod_key in orphaned {
        let _ = state.pods.stop(&pod_key).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Binds a pod manifest directly to a named node, bypassing both
/// schedulers' filter/score entirely. Still goes through the node
/// registry's own feasibility check, so an oversized request is still
/// rejected rather than silently overcommitting the node.
pub async fn schedule_onto(
    Extension(state): Extension<Arc<AppState>>,
    Path(name): Path<String>,
    Json(manifest): Json<PodManifest>,
) -> Result<Json<Pod>, ApiError> {
    let pod = Pod::try_from(manifest)?;
    let pod_key = pod.key();
    let requested = pod.resources().requests;

    state.pods.create(pod).await?;
    if let Err(e) = state.nodes.bind(&name, &pod_key, requested).await {
        let _ = state.pods.delete(&pod_key).await;
        return Err(e.into());
    }
    state.pods.set_node(&pod_key, &name).await?;
    Ok(Json(state.pods.get(&pod_key).await?))
}
