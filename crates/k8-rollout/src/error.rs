use std::io::Error as IoError;
use std::path::PathBuf;
use std::time::Duration;

use http::{Method, StatusCode};

use crate::http::Operation;

pub type Result<T, E = RolloutError> = core::result::Result<T, E>;

/// The types of errors that can occur while rolling out manifests
#[derive(thiserror::Error, Debug)]
pub enum RolloutError {
    /// Manifest file is missing or unreadable
    #[error("Failed to read manifest {path:?}")]
    FileRead { path: PathBuf, source: IoError },
    /// Manifest file is not a JSON document with the expected fields
    #[error("Failed to parse manifest {path:?}: {source}")]
    ManifestParse {
        path: PathBuf,
        source: serde_json::Error,
    },
    /// Manifest has an empty `metadata.name`
    #[error("Manifest {0:?} has no metadata.name")]
    MissingName(PathBuf),
    /// Manifest kind does not map to a known collection endpoint
    #[error("Unsupported resource kind: {0}")]
    UnsupportedKind(String),
    #[error("Failed to build HTTP client")]
    HttpClient(#[source] reqwest::Error),
    /// Network or TLS failure, the request never produced a status
    #[error("{method} {url} failed: {source}")]
    Transport {
        method: Method,
        url: String,
        source: reqwest::Error,
    },
    /// A status outside the accepted set for the operation
    #[error("{operation} {method} {url} returned {status}")]
    UnexpectedStatus {
        operation: Operation,
        method: Method,
        url: String,
        status: StatusCode,
        body: String,
    },
    /// Poll drain gave up before the controller reported zero replicas
    #[error("Timed out after {waited:?} waiting for {name} to scale down")]
    DrainTimeout { name: String, waited: Duration },
    /// Webhook delivery failed
    #[error("Failed to send deployment webhook")]
    Notify(#[source] Box<RolloutError>),
    /// Invalid or incomplete configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Config file error")]
    ConfigFile(#[from] serde_yaml::Error),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),
}

impl From<derive_builder::UninitializedFieldError> for RolloutError {
    fn from(err: derive_builder::UninitializedFieldError) -> Self {
        Self::Config(err.to_string())
    }
}

impl RolloutError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Response body of the failed exchange, when there was one
    pub fn response_body(&self) -> Option<&str> {
        match self {
            Self::UnexpectedStatus { body, .. } => Some(body),
            Self::Notify(inner) => inner.response_body(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unexpected_status_carries_body() {
        //given
        let err = RolloutError::UnexpectedStatus {
            operation: Operation::Delete,
            method: Method::DELETE,
            url: "https://k8s/api/v1/namespaces/default/services/web".to_string(),
            status: StatusCode::CONFLICT,
            body: "{\"reason\":\"Conflict\"}".to_string(),
        };

        //when
        let message = err.to_string();

        //then
        assert_eq!(
            message,
            "delete DELETE https://k8s/api/v1/namespaces/default/services/web returned 409 Conflict"
        );
        assert_eq!(err.response_body(), Some("{\"reason\":\"Conflict\"}"));
    }

    #[test]
    fn test_notify_error_exposes_inner_body() {
        let inner = RolloutError::UnexpectedStatus {
            operation: Operation::Notify,
            method: Method::POST,
            url: "https://hooks.local/deploy".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: "boom".to_string(),
        };
        let err = RolloutError::Notify(Box::new(inner));

        assert_eq!(err.response_body(), Some("boom"));
        assert_eq!(RolloutError::config("x").response_body(), None);
    }
}
