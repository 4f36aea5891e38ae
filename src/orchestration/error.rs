// Error types shared by the registry and the communicator

use std::time::Duration;

use super::retry::RetriesExhausted;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("Model {0} not found")]
    NotFound(String),

    #[error("Request to {model_id} timed out after {timeout:?}")]
    Timeout { model_id: String, timeout: Duration },

    #[error("Error communicating with {model_id}: {message}")]
    Communication { model_id: String, message: String },

    #[error("Model {model_id} returned HTTP {status}")]
    Http { model_id: String, status: u16 },

    #[error("Invalid response from {model_id}: {message}")]
    InvalidResponse { model_id: String, message: String },

    #[error("Max retries exceeded")]
    MaxRetriesExceeded,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ModelError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelError::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, ModelError::Timeout { .. })
    }

    pub fn is_invalid_config(&self) -> bool {
        matches!(self, ModelError::InvalidConfig(_))
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        ModelError::InvalidConfig(message.into())
    }
}

impl From<RetriesExhausted> for ModelError {
    fn from(_: RetriesExhausted) -> Self {
        ModelError::MaxRetriesExceeded
    }
}
