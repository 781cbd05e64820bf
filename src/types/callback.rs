//! Callback Types
//!
//! Parsing of the redirect a login UI captures at the end of authorization.

use url::Url;

use crate::error::AuthorizationError;
use crate::types::AuthorizationOutcome;

/// Callback parameters from authorization redirect.
#[derive(Clone, Debug, Default)]
pub struct CallbackParams {
    /// Authorization code (if success).
    pub code: Option<String>,
    /// State parameter.
    pub state: Option<String>,
    /// Error code (if authorization failed).
    pub error: Option<String>,
    /// Error description.
    pub error_description: Option<String>,
}

impl CallbackParams {
    /// Parse callback parameters from the redirect URL.
    pub fn from_redirect_url(url: &Url) -> Self {
        let mut params = Self::default();

        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => params.code = Some(value.into_owned()),
                "state" => params.state = Some(value.into_owned()),
                "error" => params.error = Some(value.into_owned()),
                "error_description" => params.error_description = Some(value.into_owned()),
                _ => {}
            }
        }

        params
    }

    /// The `state` an authorization URL carries, to check the redirect against.
    pub fn expected_state(authorization_url: &Url) -> Option<String> {
        authorization_url
            .query_pairs()
            .find(|(key, _)| key == "state")
            .map(|(_, value)| value.into_owned())
    }

    /// Whether `url` is the redirect target (same origin and path as `redirect_url`).
    pub fn is_redirect(url: &Url, redirect_url: &Url) -> bool {
        url.origin() == redirect_url.origin() && url.path() == redirect_url.path()
    }

    /// Check if callback contains an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Turn the redirect into the login UI's answer.
    ///
    /// `access_denied` counts as a cancellation. When `expected_state` is given the
    /// redirect must echo it.
    pub fn into_outcome(
        self,
        expected_state: Option<&str>,
    ) -> Result<AuthorizationOutcome, AuthorizationError> {
        if let Some(error) = self.error {
            return match error.as_str() {
                "access_denied" => Ok(AuthorizationOutcome::Cancelled),
                _ => Err(AuthorizationError::ServerError {
                    error,
                    error_description: self.error_description,
                }),
            };
        }

        if let Some(expected) = expected_state {
            if self.state.as_deref() != Some(expected) {
                return Err(AuthorizationError::StateMismatch {
                    expected: expected.to_string(),
                    received: self.state,
                });
            }
        }

        match self.code {
            Some(code) if !code.is_empty() => Ok(AuthorizationOutcome::Code(code)),
            _ => Err(AuthorizationError::MissingCode),
        }
    }
}
