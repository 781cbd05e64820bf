//! Authenticated Requests
//!
//! Attaches bearer tokens to outbound requests and recovers once from a
//! rejected token.

pub mod matcher;

pub use matcher::{
    AuthFailureMatcher, BadRequestPolicy, StatusMatcher, DEFAULT_INVALID_TOKEN_MARKERS,
};

use std::sync::Arc;
use tracing::{debug, instrument, warn};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{ExecutionError, ProtocolError};
use crate::token::TokenLifecycleManager;
use crate::types::{AccountIdentity, ClientOptions, TokenType};

/// Sends requests on behalf of an account with a single retry on token rejection.
pub struct AuthenticatedRequestExecutor<M: TokenLifecycleManager, T: HttpTransport> {
    manager: Arc<M>,
    transport: T,
    matcher: Box<dyn AuthFailureMatcher>,
}

impl<M: TokenLifecycleManager, T: HttpTransport> AuthenticatedRequestExecutor<M, T> {
    /// Executor with the default [`StatusMatcher`].
    pub fn new(manager: Arc<M>, transport: T) -> Self {
        Self {
            manager,
            transport,
            matcher: Box::new(StatusMatcher::default()),
        }
    }

    /// Replace the auth failure matcher.
    pub fn with_matcher(mut self, matcher: impl AuthFailureMatcher + 'static) -> Self {
        self.matcher = Box::new(matcher);
        self
    }

    pub fn manager(&self) -> &Arc<M> {
        &self.manager
    }

    /// Send `request` with the account's bearer token.
    ///
    /// A response the matcher recognizes as a token rejection invalidates the
    /// access token that was sent, unless it has already been replaced, and the
    /// request is sent once more. Any other
    /// non-2xx response, or a second rejection, is returned as
    /// [`ExecutionError::Unrecoverable`].
    #[instrument(skip(self, request, options), fields(account = %account, url = %request.url))]
    pub async fn execute(
        &self,
        request: HttpRequest,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<HttpResponse, ExecutionError> {
        let mut retried = false;

        loop {
            let token = self.manager.get_access_token(account, options).await?;

            let timeout = request.timeout.unwrap_or(options.request_timeout);
            let attempt = request
                .clone()
                .header("authorization", format!("Bearer {}", token))
                .timeout(timeout);

            let response = match tokio::time::timeout(timeout, self.transport.send(attempt)).await
            {
                Ok(result) => result?,
                Err(_) => return Err(ProtocolError::timeout(timeout).into()),
            };

            if response.is_success() {
                debug!(status = response.status, "Request succeeded");
                return Ok(response);
            }

            if !retried && self.matcher.is_auth_failure(&response) {
                warn!(status = response.status, "Token rejected, retrying with a fresh token");
                self.manager
                    .invalidate_token(account, TokenType::Access, &token)
                    .await?;
                retried = true;
                continue;
            }

            warn!(status = response.status, retried, "Request failed");
            return Err(ExecutionError::Unrecoverable {
                status: response.status,
                message: response.status_text,
                body: response.body,
            });
        }
    }

    /// GET `url` and parse the body as JSON.
    pub async fn get_json(
        &self,
        url: &str,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<serde_json::Value, ExecutionError> {
        let request = HttpRequest::get(url).header("accept", "application/json");
        let response = self.execute(request, account, options).await?;

        serde_json::from_str(&response.body).map_err(|e| {
            ExecutionError::Protocol(ProtocolError::malformed(format!(
                "invalid JSON response: {}",
                e
            )))
        })
    }
}
