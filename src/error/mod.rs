//! OIDC Error Types
//!
//! Error hierarchy for the token lifecycle and authenticated requests.

use std::time::Duration;
use thiserror::Error;

use crate::types::{AccountIdentity, TokenType};

/// Root error type for OIDC operations.
#[derive(Error, Debug)]
pub enum OidcError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Control signal: the external login flow has to run for this account.
    #[error("Re-authorization required for account {account}")]
    ReauthRequired { account: AccountIdentity },

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Tokens of type {token_type} are not handed out to callers")]
    TokenNotExposed { token_type: TokenType },
}

impl OidcError {
    /// Stable error code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Configuration(_) => "OIDC_CONFIG",
            Self::Protocol(e) => e.error_code(),
            Self::ReauthRequired { .. } => "OIDC_REAUTH",
            Self::Authorization(_) => "OIDC_AUTH",
            Self::Storage(_) => "OIDC_STORAGE",
            Self::TokenNotExposed { .. } => "OIDC_TOKEN_NOT_EXPOSED",
        }
    }

    /// Check if the caller may retry the operation with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Protocol(e) if e.is_retryable())
    }

    /// Check if error requires re-authentication.
    pub fn needs_reauth(&self) -> bool {
        matches!(
            self,
            Self::ReauthRequired { .. } | Self::Protocol(ProtocolError::InvalidGrant { .. })
        )
    }
}

/// Configuration error. Fatal, never retried.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid URL for {field}: {url}")]
    InvalidUrl { field: String, url: String },

    #[error("Missing endpoint: {endpoint}")]
    MissingEndpoint { endpoint: String },

    #[error("Discovery failed: {message}")]
    DiscoveryFailed { message: String },
}

/// Discriminator for [`ProtocolError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolErrorKind {
    Network,
    InvalidGrant,
    Malformed,
    Rejected,
}

/// Failure talking to the provider's token endpoint (or any HTTP peer).
#[derive(Error, Debug, Clone)]
pub enum ProtocolError {
    #[error("Network error: {message}")]
    Network {
        message: String,
        timeout: Option<Duration>,
    },

    #[error("Invalid grant (HTTP {status}): {description}")]
    InvalidGrant {
        status: u16,
        description: String,
        body: String,
    },

    #[error("Malformed response: {message}")]
    Malformed { message: String },

    #[error("Provider rejected request (HTTP {status}): {error}")]
    Rejected {
        status: u16,
        error: String,
        body: String,
    },
}

impl ProtocolError {
    pub fn kind(&self) -> ProtocolErrorKind {
        match self {
            Self::Network { .. } => ProtocolErrorKind::Network,
            Self::InvalidGrant { .. } => ProtocolErrorKind::InvalidGrant,
            Self::Malformed { .. } => ProtocolErrorKind::Malformed,
            Self::Rejected { .. } => ProtocolErrorKind::Rejected,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "OIDC_NETWORK",
            Self::InvalidGrant { .. } => "OIDC_INVALID_GRANT",
            Self::Malformed { .. } => "OIDC_MALFORMED",
            Self::Rejected { .. } => "OIDC_REJECTED",
        }
    }

    /// Only transport failures are worth retrying; a misbehaving provider is not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network { .. })
    }

    pub(crate) fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            timeout: None,
        }
    }

    pub(crate) fn timeout(timeout: Duration) -> Self {
        Self::Network {
            message: format!("request timed out after {:?}", timeout),
            timeout: Some(timeout),
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// Authorization (login UI / redirect) error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationError {
    #[error("Authorization was cancelled")]
    Cancelled,

    #[error("Access denied: {}", .error_description.as_deref().unwrap_or("no description"))]
    AccessDenied { error_description: Option<String> },

    #[error("State parameter mismatch (possible CSRF attack)")]
    StateMismatch {
        expected: String,
        received: Option<String>,
    },

    #[error("ID token nonce does not match the authorization request")]
    NonceMismatch {
        expected: String,
        received: Option<String>,
    },

    #[error("Missing authorization code in redirect")]
    MissingCode,

    #[error("Authorization server returned {error}")]
    ServerError {
        error: String,
        error_description: Option<String>,
    },
}

/// Storage error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Read failed: {message}")]
    ReadFailed { message: String },

    #[error("Write failed: {message}")]
    WriteFailed { message: String },

    #[error("Delete failed: {message}")]
    DeleteFailed { message: String },
}

/// Failure of an authenticated request.
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Re-authorization required for account {account}")]
    ReauthRequired { account: AccountIdentity },

    #[error("Request failed: {status} {message} {body}")]
    Unrecoverable {
        status: u16,
        message: String,
        body: String,
    },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Authorization error: {0}")]
    Authorization(#[from] AuthorizationError),

    #[error("Tokens of type {token_type} are not handed out to callers")]
    TokenNotExposed { token_type: TokenType },
}

impl ExecutionError {
    /// HTTP status of the final response, when one was received.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unrecoverable { status, .. } => Some(*status),
            Self::Protocol(ProtocolError::InvalidGrant { status, .. })
            | Self::Protocol(ProtocolError::Rejected { status, .. }) => Some(*status),
            _ => None,
        }
    }

    pub fn needs_reauth(&self) -> bool {
        matches!(self, Self::ReauthRequired { .. })
    }
}

impl From<OidcError> for ExecutionError {
    fn from(error: OidcError) -> Self {
        match error {
            OidcError::Configuration(e) => Self::Configuration(e),
            OidcError::Protocol(e) => Self::Protocol(e),
            OidcError::ReauthRequired { account } => Self::ReauthRequired { account },
            OidcError::Authorization(e) => Self::Authorization(e),
            OidcError::Storage(e) => Self::Storage(e),
            OidcError::TokenNotExposed { token_type } => Self::TokenNotExposed { token_type },
        }
    }
}

/// Result type for OIDC operations.
pub type OidcResult<T> = Result<T, OidcError>;

/// OAuth2 error response body from the provider.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct OAuth2ErrorResponse {
    pub error: String,
    #[serde(default)]
    pub error_description: Option<String>,
    #[serde(default)]
    pub error_uri: Option<String>,
}

/// Parse error response from HTTP body.
pub fn parse_error_response(body: &str) -> Option<OAuth2ErrorResponse> {
    serde_json::from_str(body).ok()
}

/// Classify a non-2xx token endpoint response.
pub fn create_error_from_response(status: u16, body: &str) -> ProtocolError {
    let parsed = parse_error_response(body);
    let is_invalid_grant = match &parsed {
        Some(response) => response.error == "invalid_grant",
        None => body.contains("invalid_grant"),
    };

    if status == 400 && is_invalid_grant {
        let description = parsed
            .and_then(|r| r.error_description)
            .unwrap_or_else(|| "invalid_grant".to_string());
        return ProtocolError::InvalidGrant {
            status,
            description,
            body: body.to_string(),
        };
    }

    let error = match parsed {
        Some(response) => response.error,
        None => format!("HTTP {}", status),
    };

    ProtocolError::Rejected {
        status,
        error,
        body: body.to_string(),
    }
}

/// Get user-friendly error message.
pub fn get_user_message(error: &ExecutionError) -> String {
    match error {
        ExecutionError::ReauthRequired { .. } => {
            "Your session has expired. Please sign in again.".to_string()
        }
        ExecutionError::Unrecoverable {
            status,
            message,
            body,
        } => format!("The request failed: {} {} {}", status, message, body),
        ExecutionError::Protocol(ProtocolError::Network { .. }) => {
            "The request could not reach the server. Please check your connection and try again."
                .to_string()
        }
        ExecutionError::Protocol(ProtocolError::InvalidGrant { .. }) => {
            "Your session cannot be renewed. Please sign in again.".to_string()
        }
        ExecutionError::Protocol(_) => {
            "The authentication service returned an unexpected response.".to_string()
        }
        ExecutionError::Authorization(AuthorizationError::Cancelled) => {
            "Sign-in was cancelled.".to_string()
        }
        _ => "An authentication error occurred. Please try again.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_grant_detection() {
        let body = r#"{"error":"invalid_grant","error_description":"Refresh token expired"}"#;
        let error = create_error_from_response(400, body);
        assert_eq!(error.kind(), ProtocolErrorKind::InvalidGrant);
        match error {
            ProtocolError::InvalidGrant { description, .. } => {
                assert_eq!(description, "Refresh token expired");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_grant_in_plain_text_body() {
        let error = create_error_from_response(400, "error=invalid_grant");
        assert_eq!(error.kind(), ProtocolErrorKind::InvalidGrant);
    }

    #[test]
    fn test_invalid_grant_needs_bad_request_status() {
        let error = create_error_from_response(500, r#"{"error":"invalid_grant"}"#);
        assert_eq!(error.kind(), ProtocolErrorKind::Rejected);
    }

    #[test]
    fn test_other_provider_errors_are_rejected() {
        let error = create_error_from_response(401, r#"{"error":"invalid_client"}"#);
        match error {
            ProtocolError::Rejected { status, error, .. } => {
                assert_eq!(status, 401);
                assert_eq!(error, "invalid_client");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_only_network_is_retryable() {
        assert!(OidcError::Protocol(ProtocolError::network("reset")).is_retryable());
        assert!(!OidcError::Protocol(ProtocolError::malformed("bad json")).is_retryable());
        assert!(!OidcError::Configuration(ConfigurationError::MissingField {
            field: "client_id".to_string()
        })
        .is_retryable());
    }

    #[test]
    fn test_needs_reauth() {
        let account = AccountIdentity::new("alice", "example");
        assert!(OidcError::ReauthRequired { account }.needs_reauth());
        assert!(!OidcError::Protocol(ProtocolError::timeout(Duration::from_secs(5))).needs_reauth());
    }

    #[test]
    fn test_execution_error_keeps_status() {
        let error = ExecutionError::Unrecoverable {
            status: 403,
            message: "Forbidden".to_string(),
            body: "nope".to_string(),
        };
        assert_eq!(error.status(), Some(403));
        assert!(get_user_message(&error).contains("403 Forbidden nope"));
    }

    #[test]
    fn test_reauth_converts_to_execution_error() {
        let account = AccountIdentity::new("alice", "example");
        let error: ExecutionError = OidcError::ReauthRequired { account }.into();
        assert!(error.needs_reauth());
    }
}
