use std::time::Duration;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

/// Conditions that abort a whole dispatch before any mail is sent.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no tenant could be derived from the request")]
    NoTenant,

    #[error("tenant not found for domain {0}")]
    TenantNotFound(String),

    #[error("mail relay credentials are missing or incomplete")]
    CredentialsMissing,

    #[error("mail relay credentials are unusable: {0}")]
    CredentialsUnusable(String),

    #[error("mail relay verification failed: {0}")]
    VerificationFailed(String),

    #[error("lead submission {0} not found")]
    SubmissionNotFound(Uuid),

    #[error("datastore error: {0:#}")]
    Datastore(#[from] anyhow::Error),
}

impl DispatchError {
    /// Stable machine-readable identifier for API consumers.
    pub fn kind(&self) -> &'static str {
        match self {
            DispatchError::NoTenant => "no_tenant",
            DispatchError::TenantNotFound(_) => "tenant_not_found",
            DispatchError::CredentialsMissing => "credentials_missing",
            DispatchError::CredentialsUnusable(_) => "credentials_unusable",
            DispatchError::VerificationFailed(_) => "credentials_verification_failed",
            DispatchError::SubmissionNotFound(_) => "submission_not_found",
            DispatchError::Datastore(_) => "datastore",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            DispatchError::NoTenant => StatusCode::BAD_REQUEST,
            DispatchError::TenantNotFound(_) | DispatchError::SubmissionNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            DispatchError::CredentialsMissing | DispatchError::CredentialsUnusable(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            DispatchError::VerificationFailed(_) => StatusCode::BAD_GATEWAY,
            DispatchError::Datastore(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Handler-facing rejection in the `(status, {"error", "kind"})` shape.
    pub fn into_rejection(self) -> (StatusCode, Json<Value>) {
        if let DispatchError::Datastore(e) = &self {
            tracing::error!("datastore failure: {e:#}");
        }
        (
            self.status(),
            Json(json!({ "error": self.to_string(), "kind": self.kind() })),
        )
    }
}

/// Failures reported by a mail relay for a single verify or send.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RelayError {
    #[error("invalid address {address}: {reason}")]
    Address { address: String, reason: String },

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("relay did not answer within {0:?}")]
    Timeout(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_and_statuses() {
        let err = DispatchError::TenantNotFound("acme.example.com".into());
        assert_eq!(err.kind(), "tenant_not_found");
        assert_eq!(err.status(), StatusCode::NOT_FOUND);
        assert_eq!(err.to_string(), "tenant not found for domain acme.example.com");

        let err = DispatchError::VerificationFailed("535 auth failed".into());
        assert_eq!(err.kind(), "credentials_verification_failed");
        assert_eq!(err.status(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn relay_error_messages() {
        let err = RelayError::Timeout(Duration::from_secs(15));
        assert_eq!(err.to_string(), "relay did not answer within 15s");
        let err = RelayError::Address { address: "nope".into(), reason: "missing @".into() };
        assert_eq!(err.to_string(), "invalid address nope: missing @");
    }
}
