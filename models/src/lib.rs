pub mod error;
pub mod quantity;
pub mod resource;
pub mod container;
pub mod pod;
pub mod node;
pub mod record;

pub use error::ControlPlaneError;
pub use resource::ResourceVector;
pub use container::{Container, ContainerManifest, ContainerStatus, RawResourceRequirements, ResourceRequirements};
pub use pod::{Pod, PodManifest, PodStatus};
pub use node::{Node, NodeManifest, NodeStatus};
pub use record::ScheduleRecord;
