use std::sync::Arc;

use axum::extract::Extension;
use axum::http::StatusCode;
use axum::Json;
use models::{Pod, PodManifest};
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::server::AppState;

#[derive(Debug, Serialize)]
pub struct ScheduledBody {
    pub pod: Pod,
    pub node_name: String,
}

pub async fn kube_schedule(
    Extension(state): Extension<Arc<AppState>>,
    Json(manifest): Json<PodManifest>,
) -> Result<(StatusCode, Json<ScheduledBody>), ApiError> {
    let pod = Pod::try_from(manifest)?;
    state.pods.create(pod.clone()).await?;
    let pod_key = pod.key();

    let node_name = state.balanced.schedule(&pod, &state.nodes, &state.cancellation).await?;
    state.pods.set_node(&pod_key, &node_name).await?;
    let reward = state.balanced.last_reward().await;
    state.telemetry.record(pod_key.clone(), node_name.clone(), reward).await;

    let bound = state.pods.get(&pod_key).await?;
    Ok((
        StatusCode::OK,
        Json(ScheduledBody {
            pod: bound,
            node_name,
        }),
    ))
}

pub async fn ddqn_schedule(
    Extension(state): Extension<Arc<AppState>>,
    Json(manifest): Json<PodManifest>,
) -> Result<(StatusCode, Json<ScheduledBody>), ApiError> {
    let pod = Pod::try_from(manifest)?;
    state.pods.create(pod.clone()).await?;
    let pod_key = pod.key();

    let node_name = state.ddqn.schedule(&pod, &state.nodes, &state.cancellation).await?;
    state.pods.set_node(&pod_key, &node_name).await?;
    let reward = state.ddqn.last_reward().await;
    state.telemetry.record(pod_key.clone(), node_name.clone(), reward).await;

    let bound = state.pods.get(&pod_key).await?;
    Ok((
        StatusCode::OK,
        Json(ScheduledBody {
            pod: bound,
            node_name,
        }),
    ))
}

pub async fn save_kube_schedule(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.telemetry.render_png("kube_schedule.png").await?;
    Ok(StatusCode::OK)
}

pub async fn save_ddqn_schedule(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.telemetry.render_png("ddqn_schedule.png").await?;
    Ok(StatusCode::OK)
}
