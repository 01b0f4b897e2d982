pub mod bollard_runtime;
pub mod fake;
pub mod runtime;

pub use bollard_runtime::BollardContainerRuntime;
pub use fake::FakeContainerRuntime;
pub use runtime::ContainerRuntime;
