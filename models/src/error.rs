use thiserror::Error;

/// Result alias used across the control plane crates.
pub type Result<T> = std::result::Result<T, ControlPlaneError>;

/// The error taxonomy shared by the node registry, pod registry, schedulers,
/// store adapter and HTTP layer. Each variant maps to exactly one HTTP status
/// at the API boundary; see `principal::api::status_for`.
#[derive(Error, Debug)]
pub enum ControlPlaneError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("insufficient resources on node {node}: requested {requested:?}")]
    InsufficientResources {
        node: String,
        requested: crate::resource::ResourceVector,
    },

    #[error("no feasible node for pod {0}")]
    NoFeasibleNode(String),

    #[error("operation cancelled: {0}")]
    Cancelled(String),

    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("container runtime failure: {0}")]
    RuntimeFailure(String),

    #[error("internal error ({correlation_id}): {message}")]
    Internal {
        correlation_id: String,
        message: String,
    },
}

impl ControlPlaneError {
    pub fn internal(message: impl Into<String>) -> Self {
        ControlPlaneError::Internal {
            correlation_id: uuid_like_id(),
            message: message.into(),
        }
    }
}

/// A small dependency-free stand-in for a correlation id. Not a UUID:
/// Internal errors never reach the client body, only this id does, so
/// RFC-4122 compliance buys nothing here.
fn uuid_like_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{nanos:x}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = ControlPlaneError::NotFound("pods/default/web".to_string());
        assert_eq!(err.to_string(), "not found: pods/default/web");
    }

    #[test]
    fn internal_hides_nothing_but_the_message_and_id() {
        let err = ControlPlaneError::internal("disk full");
        assert!(err.to_string().contains("disk full"));
    }
}
