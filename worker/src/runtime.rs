use async_trait::async_trait;
use models::{Container, ControlPlaneError};

/// Collaborator the pod registry delegates actual container lifecycle to.
/// Kept separate from scheduling/accounting so a test double can stand in
/// without touching a real container engine.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Starts one container, returning the runtime's own id for it.
    async fn start(&self, container: &Container) -> Result<String, ControlPlaneError>;

    /// Stops a previously started container, identified by the id `start`
    /// returned.
    async fn stop(&self, container_id: &str) -> Result<(), ControlPlaneError>;
}
