use std::sync::Arc;

use axum::extract::{Extension, Path};
use axum::http::StatusCode;
use axum::Json;
use models::{ControlPlaneError, Pod, PodManifest};

use crate::api::error::ApiError;
use crate::api::server::AppState;

fn key_of(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

pub async fn create(
    Extension(state): Extension<Arc<AppState>>,
    Json(manifest): Json<PodManifest>,
) -> Result<(StatusCode, Json<Pod>), ApiError> {
    let pod = Pod::try_from(manifest)?;
    state.pods.create(pod.clone()).await?;
    Ok((StatusCode::CREATED, Json(pod)))
}

pub async fn list(Extension(state): Extension<Arc<AppState>>) -> Json<Vec<Pod>> {
    Json(state.pods.list().await)
}

pub async fn get(
    Extension(state): Extension<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Pod>, ApiError> {
    Ok(Json(state.pods.get(&key_of(&namespace, &name)).await?))
}

pub async fn remove(
    Extension(state): Extension<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let key = key_of(&namespace, &name);
    let pod = state.pods.delete(&key).await?;
    if let Some(node_name) = pod.node_name.as_ref() {
        let requested = pod.resources().requests;
        let _ = state.nodes.unbind(node_name, &key, requested).await;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `RuntimeFailure` surfaces as a 200 with the pod's `Failed` status rather
/// than an error response -- the request to start/stop was handled, the
/// runtime just refused it, and the resulting pod state says so.
async fn lifecycle<F, Fut>(
    state: &AppState,
    key: &str,
    op: F,
) -> Result<Json<Pod>, ApiError>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<(), ControlPlaneError>>,
{
    match op().await {
        Ok(()) | Err(ControlPlaneError::RuntimeFailure(_)) => {
            Ok(Json(state.pods.get(key).await?))
        }
        Err(e) => Err(e.into()),
    }
}

pub async fn start(
    Extension(state): Extension<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Pod>, ApiError> {
    let key = key_of(&namespace, &name);
    lifecycle(&state, &key, || state.pods.start(&key)).await
}

pub async fn stop(
    Extension(state): Extension<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Pod>, ApiError> {
    let key = key_of(&namespace, &name);
    lifecycle(&state, &key, || state.pods.stop(&key)).await
}

pub async fn restart(
    Extension(state): Extension<Arc<AppState>>,
    Path((namespace, name)): Path<(String, String)>,
) -> Result<Json<Pod>, ApiError> {
    let key = key_of(&namespace, &name);
    match state.pods.stop(&key).await {
        Ok(()) | Err(ControlPlaneError::RuntimeFailure(_)) => {}
        Err(e) => return Err(e.into()),
    }
    lifecycle(&state, &key, || state.pods.start(&key)).await
}
