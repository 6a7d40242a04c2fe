//! Error types
//!
//! `ClientError` is what a client application reports. `AuthError` is what
//! the provider and the facade surface to the host.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error raised by a [`ClientApplication`](crate::client::ClientApplication).
///
/// Carries the identity platform error code (`invalid_grant`,
/// `interaction_required`, ...) and a human readable description.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{code}: {message}")]
pub struct ClientError {
    pub code: String,
    pub message: String,
}

impl ClientError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn uninitialized() -> Self {
        Self::new(
            "uninitialized_public_client_application",
            "initialize() must be awaited before calling any other API",
        )
    }

    pub fn interaction_in_progress() -> Self {
        Self::new(
            "interaction_in_progress",
            "Interaction is currently in progress; wait for it to finish",
        )
    }

    pub fn interaction_required(message: impl Into<String>) -> Self {
        Self::new("interaction_required", message)
    }

    pub fn no_account() -> Self {
        Self::new("no_account_error", "No account object provided")
    }

    pub fn state_mismatch() -> Self {
        Self::new(
            "state_mismatch",
            "State returned by the server does not match the pending request",
        )
    }

    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::new("invalid_client_configuration", message)
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::new("cache_error", message)
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new("network_error", message)
    }

    pub fn is_interaction_required(&self) -> bool {
        matches!(
            self.code.as_str(),
            "interaction_required" | "consent_required" | "login_required" | "invalid_grant"
        )
    }
}

/// Stage of the provider start-up sequence that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStage {
    Construct,
    Initialize,
    HandleRedirect,
}

impl fmt::Display for InitStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            InitStage::Construct => "construct",
            InitStage::Initialize => "initialize",
            InitStage::HandleRedirect => "handle redirect",
        })
    }
}

/// Facade operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    LoginPopup,
    LoginRedirect,
    LogoutPopup,
    LogoutRedirect,
    AcquireTokenSilent,
    AcquireTokenPopup,
    AcquireTokenRedirect,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operation::LoginPopup => "login popup",
            Operation::LoginRedirect => "login redirect",
            Operation::LogoutPopup => "logout popup",
            Operation::LogoutRedirect => "logout redirect",
            Operation::AcquireTokenSilent => "silent token acquisition",
            Operation::AcquireTokenPopup => "token popup acquisition",
            Operation::AcquireTokenRedirect => "token redirect acquisition",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AuthError {
    #[error("client_id is required")]
    MissingClientId,

    #[error("tenant_id is required when authority_type is \"tenant\"")]
    MissingTenantId,

    #[error("No active account. Please login first.")]
    NoActiveAccount,

    #[error("Initialization failed during {stage}: {source}")]
    Initialization {
        stage: InitStage,
        #[source]
        source: ClientError,
    },

    #[error("{operation} failed: {source}")]
    Interaction {
        operation: Operation,
        #[source]
        source: ClientError,
    },
}

impl AuthError {
    /// Discriminant-only view, handy for comparing error kinds.
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::MissingClientId => AuthErrorKind::MissingClientId,
            AuthError::MissingTenantId => AuthErrorKind::MissingTenantId,
            AuthError::NoActiveAccount => AuthErrorKind::NoActiveAccount,
            AuthError::Initialization { .. } => AuthErrorKind::Initialization,
            AuthError::Interaction { .. } => AuthErrorKind::Interaction,
        }
    }

    /// The client error behind an initialization or interaction failure.
    pub fn client_error(&self) -> Option<&ClientError> {
        match self {
            AuthError::Initialization { source, .. } | AuthError::Interaction { source, .. } => {
                Some(source)
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    MissingClientId,
    MissingTenantId,
    NoActiveAccount,
    Initialization,
    Interaction,
}
