//! Collaborator seams for the session store and the tool runtime.
//!
//! Both live outside this system; the gateway only routes to them. Payloads
//! cross the boundary as opaque JSON so their schemas stay with the
//! collaborator.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::{ApiError, ErrorCode};

/// Failures a collaborator can report.
#[derive(Debug, thiserror::Error)]
pub enum CollabError {
    /// The named resource does not exist.
    #[error("{0} not found")]
    NotFound(String),

    /// The collaborator does not support this optional operation.
    #[error("operation not implemented")]
    NotImplemented,

    /// The collaborator failed. The detail is logged, never sent to
    /// clients.
    #[error("collaborator failure: {0}")]
    Failed(String),
}

impl From<CollabError> for ApiError {
    fn from(error: CollabError) -> Self {
        match error {
            CollabError::NotFound(what) => ApiError::not_found(format!("{what} not found")),
            CollabError::NotImplemented => {
                ApiError::new(ErrorCode::NotImplemented, "Operation not supported by this deployment")
            }
            CollabError::Failed(detail) => {
                log::error!("Collaborator call failed: {detail}");
                ApiError::internal()
            }
        }
    }
}

/// The persistent session/message store seam. Every operation is optional;
/// unimplemented ones surface as 501.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Lists known sessions.
    async fn list_sessions(&self) -> Result<Value, CollabError> {
        Err(CollabError::NotImplemented)
    }

    /// Fetches one session.
    async fn get_session(&self, _session_id: &str) -> Result<Value, CollabError> {
        Err(CollabError::NotImplemented)
    }

    /// Deletes one session.
    async fn delete_session(&self, _session_id: &str) -> Result<(), CollabError> {
        Err(CollabError::NotImplemented)
    }

    /// Lists a session's messages.
    async fn session_messages(&self, _session_id: &str) -> Result<Value, CollabError> {
        Err(CollabError::NotImplemented)
    }
}

/// The tool runtime seam.
#[async_trait]
pub trait ToolBroker: Send + Sync {
    /// Lists available tools.
    async fn list_tools(&self) -> Result<Value, CollabError> {
        Err(CollabError::NotImplemented)
    }

    /// Invokes a tool by name.
    async fn invoke_tool(&self, _name: &str, _arguments: Value) -> Result<Value, CollabError> {
        Err(CollabError::NotImplemented)
    }
}
