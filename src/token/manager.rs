//! Token Lifecycle Manager
//!
//! The per-account token state machine:
//!
//! ```text
//! NoTokens -> HasRefreshOnly -> HasFullSet -> (Expired -> refresh) -> NeedsReauthorization
//! ```
//!
//! `NeedsReauthorization` is left only through a completed authorization,
//! which re-enters `HasFullSet`.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::error::{OidcError, ProtocolError};
use crate::flows::ProtocolClient;
use crate::token::TokenStore;
use crate::types::{
    AccountIdentity, ClientOptions, ProviderConfig, StoredTokens, TokenSet, TokenState,
    TokenType,
};

/// Token lifecycle manager interface.
#[async_trait]
pub trait TokenLifecycleManager: Send + Sync {
    /// Get a usable access token, refreshing through the provider when needed.
    ///
    /// Returns [`OidcError::ReauthRequired`] when only the login flow can help.
    async fn get_access_token(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<String, OidcError>;

    /// Get an ID or access token. Refresh tokens are never handed out.
    async fn get_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        options: &ClientOptions,
    ) -> Result<String, OidcError>;

    /// Clear a single token slot so the next lookup refreshes.
    async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), OidcError>;

    /// Clear a token slot only while it still holds `token`.
    ///
    /// A caller that saw `token` rejected uses this so a value refreshed in the
    /// meantime survives. Returns whether the slot was cleared.
    async fn invalidate_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        token: &str,
    ) -> Result<bool, OidcError>;

    /// Write a whole token set and leave the re-authorization state.
    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), OidcError>;

    /// Exchange an authorization code and store the result.
    async fn complete_authorization(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, OidcError>;

    /// Current lifecycle state of an account.
    async fn state(&self, account: &AccountIdentity) -> Result<TokenState, OidcError>;

    /// Forget everything about an account.
    async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, OidcError>;
}

/// Lifecycle manager configuration.
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Refresh this long before a known access token expiry (default: 60 seconds).
    pub refresh_buffer: Duration,
    /// Refresh ahead of a known expiry instead of waiting for a rejection.
    pub proactive_refresh: bool,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            refresh_buffer: Duration::from_secs(60),
            proactive_refresh: true,
        }
    }
}

/// Default lifecycle manager over a protocol client and a token store.
pub struct DefaultTokenLifecycleManager<P: ProtocolClient, S: TokenStore> {
    provider: ProviderConfig,
    config: LifecycleConfig,
    protocol: Arc<P>,
    store: Arc<S>,
    refresh_locks: Mutex<HashMap<AccountIdentity, Arc<tokio::sync::Mutex<()>>>>,
}

impl<P: ProtocolClient, S: TokenStore> DefaultTokenLifecycleManager<P, S> {
    pub fn new(provider: ProviderConfig, protocol: Arc<P>, store: Arc<S>) -> Self {
        Self::with_config(provider, LifecycleConfig::default(), protocol, store)
    }

    pub fn with_config(
        provider: ProviderConfig,
        config: LifecycleConfig,
        protocol: Arc<P>,
        store: Arc<S>,
    ) -> Self {
        Self {
            provider,
            config,
            protocol,
            store,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    pub fn protocol(&self) -> &Arc<P> {
        &self.protocol
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Exchange a code and store the result once `verify` accepts it.
    ///
    /// A rejected token set is never written.
    #[instrument(skip(self, options, code, verify), fields(account = %account))]
    pub async fn complete_authorization_verified<F>(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
        code: &str,
        verify: F,
    ) -> Result<TokenSet, OidcError>
    where
        F: FnOnce(&TokenSet) -> Result<(), OidcError> + Send,
    {
        options.validate()?;

        let token_set = self
            .protocol
            .exchange_code_for_tokens(&self.provider.token_endpoint, options, code)
            .await?;
        verify(&token_set)?;

        let lock = self.refresh_lock(account);
        let _guard = lock.lock().await;
        self.store.store_token_set(account, &token_set).await?;
        info!("Authorization completed");

        Ok(token_set)
    }

    fn refresh_lock(&self, account: &AccountIdentity) -> Arc<tokio::sync::Mutex<()>> {
        self.refresh_locks
            .lock()
            .entry(account.clone())
            .or_default()
            .clone()
    }

    /// A cached token that can be returned without touching the network.
    fn usable_token(&self, record: Option<&StoredTokens>, token_type: TokenType) -> Option<String> {
        let record = record?;
        let token = record.get(token_type)?;

        if token_type == TokenType::Access
            && self.config.proactive_refresh
            && record.refresh_token.is_some()
            && record.is_access_expiring(self.config.refresh_buffer)
        {
            return None;
        }

        Some(token.to_string())
    }

    async fn acquire(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        let record = self.store.load(account).await?;
        if let Some(token) = self.usable_token(record.as_ref(), token_type) {
            return Ok(token);
        }

        let lock = self.refresh_lock(account);
        let _guard = lock.lock().await;

        // Another caller may have refreshed while this one waited.
        let record = self.store.load(account).await?.unwrap_or_default();
        if let Some(token) = self.usable_token(Some(&record), token_type) {
            debug!("Token refreshed by a concurrent caller");
            return Ok(token);
        }

        let refresh_token = match record.refresh_token.as_deref() {
            Some(token) => token.to_string(),
            None => {
                debug!(state = ?record.state(), "No refresh token, re-authorization required");
                return Err(OidcError::ReauthRequired {
                    account: account.clone(),
                });
            }
        };

        options.validate()?;

        let refreshed = match self
            .protocol
            .refresh_tokens(&self.provider.token_endpoint, options, &refresh_token)
            .await
        {
            Ok(token_set) => token_set.retain_from(&record),
            Err(ProtocolError::InvalidGrant { description, .. }) => {
                warn!(%description, "Refresh token rejected, re-authorization required");
                self.store.mark_reauth_required(account).await?;
                return Err(OidcError::ReauthRequired {
                    account: account.clone(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Token refresh failed");
                return Err(e.into());
            }
        };

        self.store.store_token_set(account, &refreshed).await?;
        info!("Tokens refreshed");

        let token = match token_type {
            TokenType::Access => Some(refreshed.access_token),
            TokenType::Id => refreshed.id_token,
            TokenType::Refresh => None,
        };
        token.ok_or_else(|| OidcError::ReauthRequired {
            account: account.clone(),
        })
    }
}

#[async_trait]
impl<P: ProtocolClient, S: TokenStore> TokenLifecycleManager for DefaultTokenLifecycleManager<P, S> {
    #[instrument(skip(self, options), fields(account = %account))]
    async fn get_access_token(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        self.acquire(account, TokenType::Access, options).await
    }

    #[instrument(skip(self, options), fields(account = %account))]
    async fn get_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        if token_type == TokenType::Refresh {
            return Err(OidcError::TokenNotExposed { token_type });
        }
        self.acquire(account, token_type, options).await
    }

    #[instrument(skip(self), fields(account = %account))]
    async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), OidcError> {
        debug!("Invalidating token");
        Ok(self.store.invalidate(account, token_type).await?)
    }

    #[instrument(skip(self, token), fields(account = %account))]
    async fn invalidate_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        token: &str,
    ) -> Result<bool, OidcError> {
        let cleared = self.store.invalidate_if(account, token_type, token).await?;
        if !cleared {
            debug!("Token already replaced, keeping the current one");
        }
        Ok(cleared)
    }

    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), OidcError> {
        Ok(self.store.store_token_set(account, token_set).await?)
    }

    async fn complete_authorization(
        &self,
        account: &AccountIdentity,
        options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, OidcError> {
        self.complete_authorization_verified(account, options, code, |_| Ok(()))
            .await
    }

    async fn state(&self, account: &AccountIdentity) -> Result<TokenState, OidcError> {
        Ok(self
            .store
            .load(account)
            .await?
            .map(|record| record.state())
            .unwrap_or(TokenState::NoTokens))
    }

    #[instrument(skip(self), fields(account = %account))]
    async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, OidcError> {
        let removed = self.store.remove_account(account).await?;
        self.refresh_locks.lock().remove(account);
        info!(removed, "Account removed");
        Ok(removed)
    }
}

/// Mock lifecycle manager for testing.
///
/// Queued results are served in order; with an empty queue the current token
/// is returned, or `ReauthRequired` once that has been invalidated.
pub struct MockTokenLifecycleManager {
    token_results: Mutex<VecDeque<Result<String, OidcError>>>,
    current_token: Mutex<Option<String>>,
    get_token_history: Mutex<Vec<AccountIdentity>>,
    invalidate_history: Mutex<Vec<(AccountIdentity, TokenType)>>,
    store_history: Mutex<Vec<(AccountIdentity, TokenSet)>>,
    exchange_history: Mutex<Vec<String>>,
    next_error: Mutex<Option<OidcError>>,
}

impl Default for MockTokenLifecycleManager {
    fn default() -> Self {
        Self {
            token_results: Mutex::new(VecDeque::new()),
            current_token: Mutex::new(Some("mock-access-token".to_string())),
            get_token_history: Mutex::new(Vec::new()),
            invalidate_history: Mutex::new(Vec::new()),
            store_history: Mutex::new(Vec::new()),
            exchange_history: Mutex::new(Vec::new()),
            next_error: Mutex::new(None),
        }
    }
}

impl MockTokenLifecycleManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the result of the next token lookup.
    pub fn queue_token(&self, result: Result<String, OidcError>) -> &Self {
        self.token_results.lock().push_back(result);
        self
    }

    /// Set the token returned once the queue is empty. `None` means no tokens.
    pub fn set_current_token(&self, token: Option<&str>) -> &Self {
        *self.current_token.lock() = token.map(String::from);
        self
    }

    /// Fail the next operation other than a token lookup.
    pub fn set_next_error(&self, error: OidcError) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    pub fn get_token_history(&self) -> Vec<AccountIdentity> {
        self.get_token_history.lock().clone()
    }

    pub fn get_invalidate_history(&self) -> Vec<(AccountIdentity, TokenType)> {
        self.invalidate_history.lock().clone()
    }

    pub fn get_store_history(&self) -> Vec<(AccountIdentity, TokenSet)> {
        self.store_history.lock().clone()
    }

    pub fn get_exchange_history(&self) -> Vec<String> {
        self.exchange_history.lock().clone()
    }

    fn check_error(&self) -> Result<(), OidcError> {
        match self.next_error.lock().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl TokenLifecycleManager for MockTokenLifecycleManager {
    async fn get_access_token(
        &self,
        account: &AccountIdentity,
        _options: &ClientOptions,
    ) -> Result<String, OidcError> {
        self.get_token_history.lock().push(account.clone());

        if let Some(result) = self.token_results.lock().pop_front() {
            return result;
        }

        self.current_token
            .lock()
            .clone()
            .ok_or_else(|| OidcError::ReauthRequired {
                account: account.clone(),
            })
    }

    async fn get_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        options: &ClientOptions,
    ) -> Result<String, OidcError> {
        if token_type == TokenType::Refresh {
            return Err(OidcError::TokenNotExposed { token_type });
        }
        self.get_access_token(account, options).await
    }

    async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), OidcError> {
        self.check_error()?;
        self.invalidate_history
            .lock()
            .push((account.clone(), token_type));
        if token_type == TokenType::Access {
            *self.current_token.lock() = None;
        }
        Ok(())
    }

    async fn invalidate_token(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        token: &str,
    ) -> Result<bool, OidcError> {
        self.check_error()?;
        self.invalidate_history
            .lock()
            .push((account.clone(), token_type));
        if token_type != TokenType::Access {
            return Ok(false);
        }
        let mut current = self.current_token.lock();
        if current.as_deref() == Some(token) {
            *current = None;
            return Ok(true);
        }
        Ok(false)
    }

    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), OidcError> {
        self.check_error()?;
        self.store_history
            .lock()
            .push((account.clone(), token_set.clone()));
        *self.current_token.lock() = Some(token_set.access_token.clone());
        Ok(())
    }

    async fn complete_authorization(
        &self,
        account: &AccountIdentity,
        _options: &ClientOptions,
        code: &str,
    ) -> Result<TokenSet, OidcError> {
        self.check_error()?;
        self.exchange_history.lock().push(code.to_string());
        let token_set = TokenSet::new("mock-id-token", "mock-access-token", "mock-refresh-token");
        self.store_history
            .lock()
            .push((account.clone(), token_set.clone()));
        *self.current_token.lock() = Some(token_set.access_token.clone());
        Ok(token_set)
    }

    async fn state(&self, _account: &AccountIdentity) -> Result<TokenState, OidcError> {
        self.check_error()?;
        Ok(match *self.current_token.lock() {
            Some(_) => TokenState::HasFullSet,
            None => TokenState::NoTokens,
        })
    }

    async fn remove_account(&self, _account: &AccountIdentity) -> Result<bool, OidcError> {
        self.check_error()?;
        Ok(self.current_token.lock().take().is_some())
    }
}

/// Create mock lifecycle manager for testing.
pub fn create_mock_lifecycle_manager() -> MockTokenLifecycleManager {
    MockTokenLifecycleManager::new()
}
