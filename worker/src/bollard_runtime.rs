use std::sync::Arc;

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
    StopContainerOptions,
};
use bollard::models::HostConfig;
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::Docker;
use models::{Container, ControlPlaneError};
use std::collections::HashMap;
use tracing::info;

const NETWORK_NAME: &str = "control-plane";

/// Default `ContainerRuntime`: talks to the local Docker engine over its
/// Unix socket. Resource requests are translated into a cgroup quota rather
/// than passed straight through, since Docker has no native millicore unit.
#[derive(Clone)]
pub struct BollardContainerRuntime {
    docker: Arc<Docker>,
    network_name: String,
}

impl BollardContainerRuntime {
    pub async fn new() -> Result<Self, ControlPlaneError> {
        let docker = Docker::connect_with_socket_defaults()
            .map_err(|e| ControlPlaneError::RuntimeFailure(e.to_string()))?;

        docker
            .version()
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(format!("docker unreachable: {e}")))?;

        let runtime = Self {
            docker: Arc::new(docker),
            network_name: NETWORK_NAME.to_string(),
        };
        runtime.ensure_network_exists().await?;
        Ok(runtime)
    }

    async fn ensure_network_exists(&self) -> Result<(), ControlPlaneError> {
        let networks = self
            .docker
            .list_networks(Some(ListNetworksOptions::<String> {
                filters: HashMap::from([("name".to_string(), vec![self.network_name.clone()])]),
            }))
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(e.to_string()))?;

        if networks.is_empty() {
            self.docker
                .create_network(CreateNetworkOptions {
                    name: self.network_name.clone(),
                    driver: "bridge".to_string(),
                    ..Default::default()
                })
                .await
                .map_err(|e| ControlPlaneError::RuntimeFailure(e.to_string()))?;
            info!(network = %self.network_name, "created container network");
        }

        Ok(())
    }
}

#[async_trait]
impl crate::runtime::ContainerRuntime for BollardContainerRuntime {
    async fn start(&self, container: &Container) -> Result<String, ControlPlaneError> {
        let host_config = HostConfig {
            memory: if container.resources.limits.memory > 0 {
                Some(container.resources.limits.memory)
            } else {
                None
            },
            nano_cpus: if container.resources.limits.cpu > 0 {
                // millicores -> nanocpus: 1 core == 1e9 nanocpus, 1 core == 1000m
                Some(container.resources.limits.cpu * 1_000_000)
            } else {
                None
            },
            network_mode: Some(self.network_name.clone()),
            ..Default::default()
        };

        let config = Config {
            image: Some(container.image.clone()),
            cmd: container.command.clone(),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container.name.clone(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(format!("create container: {e}")))?;

        self.docker
            .start_container(&created.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(format!("start container: {e}")))?;

        info!(container = %container.name, id = %created.id, "started container");
        Ok(created.id)
    }

    async fn stop(&self, container_id: &str) -> Result<(), ControlPlaneError> {
        self.docker
            .stop_container(container_id, Some(StopContainerOptions { t: 10 }))
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(format!("stop container: {e}")))?;

        self.docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| ControlPlaneError::RuntimeFailure(format!("remove container: {e}")))?;

        info!(id = %container_id, "stopped container");
        Ok(())
    }
}
