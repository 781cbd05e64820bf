//! Token Storage
//!
//! Per-account token records. Every operation on one account is atomic: a
//! reader never observes a half-written token set.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;

use crate::error::StorageError;
use crate::types::{AccountIdentity, StoredTokens, TokenSet, TokenType};

/// Token store interface.
#[async_trait]
pub trait TokenStore: Send + Sync {
    /// Consistent snapshot of one account's record.
    async fn load(&self, account: &AccountIdentity) -> Result<Option<StoredTokens>, StorageError>;

    /// Read a single slot.
    async fn get(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<Option<String>, StorageError> {
        Ok(self
            .load(account)
            .await?
            .and_then(|record| record.get(token_type).map(String::from)))
    }

    /// Write a single slot. `None` clears it.
    async fn set(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        value: Option<String>,
    ) -> Result<(), StorageError>;

    /// Replace every slot the set carries in one write and clear the
    /// re-authorization flag. Slots the set lacks keep their value.
    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), StorageError>;

    /// Clear a single slot.
    async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), StorageError> {
        self.set(account, token_type, None).await
    }

    /// Clear a slot only while it still holds `expected`. Returns whether it was cleared.
    async fn invalidate_if(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        expected: &str,
    ) -> Result<bool, StorageError>;

    /// Drop the refresh and access tokens and flag the account for the login flow.
    async fn mark_reauth_required(&self, account: &AccountIdentity) -> Result<(), StorageError>;

    /// Delete the account's record. Returns whether one existed.
    async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, StorageError>;

    /// Accounts with a record.
    async fn accounts(&self) -> Result<Vec<AccountIdentity>, StorageError>;
}

fn merge_token_set(existing: Option<&StoredTokens>, token_set: &TokenSet) -> StoredTokens {
    let mut record = StoredTokens::from_token_set(token_set);
    if let Some(existing) = existing {
        if record.id_token.is_none() {
            record.id_token = existing.id_token.clone();
        }
        if record.refresh_token.is_none() {
            record.refresh_token = existing.refresh_token.clone();
        }
    }
    record
}

/// In-memory token store.
#[derive(Default)]
pub struct InMemoryTokenStore {
    records: RwLock<HashMap<AccountIdentity, StoredTokens>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TokenStore for InMemoryTokenStore {
    async fn load(&self, account: &AccountIdentity) -> Result<Option<StoredTokens>, StorageError> {
        Ok(self.records.read().get(account).cloned())
    }

    async fn set(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        value: Option<String>,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write();
        if value.is_none() && !records.contains_key(account) {
            return Ok(());
        }
        records
            .entry(account.clone())
            .or_default()
            .set(token_type, value);
        Ok(())
    }

    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), StorageError> {
        let mut records = self.records.write();
        let record = merge_token_set(records.get(account), token_set);
        records.insert(account.clone(), record);
        Ok(())
    }

    async fn invalidate_if(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        expected: &str,
    ) -> Result<bool, StorageError> {
        let mut records = self.records.write();
        match records.get_mut(account) {
            Some(record) if record.get(token_type) == Some(expected) => {
                record.set(token_type, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_reauth_required(&self, account: &AccountIdentity) -> Result<(), StorageError> {
        let mut records = self.records.write();
        let record = records.entry(account.clone()).or_default();
        record.refresh_token = None;
        record.access_token = None;
        record.access_expires_at = None;
        record.reauth_required = true;
        record.updated_at = Some(Utc::now());
        Ok(())
    }

    async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, StorageError> {
        Ok(self.records.write().remove(account).is_some())
    }

    async fn accounts(&self) -> Result<Vec<AccountIdentity>, StorageError> {
        Ok(self.records.read().keys().cloned().collect())
    }
}

/// Mock token store for testing.
///
/// Behaves like [`InMemoryTokenStore`] and records every mutating call.
#[derive(Default)]
pub struct MockTokenStore {
    inner: InMemoryTokenStore,
    load_history: Mutex<Vec<AccountIdentity>>,
    set_history: Mutex<Vec<(AccountIdentity, TokenType, Option<String>)>>,
    store_history: Mutex<Vec<(AccountIdentity, TokenSet)>>,
    invalidate_history: Mutex<Vec<(AccountIdentity, TokenType)>>,
    reauth_history: Mutex<Vec<AccountIdentity>>,
    next_error: Mutex<Option<StorageError>>,
    should_fail: Mutex<bool>,
}

impl MockTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set next error to return.
    pub fn set_next_error(&self, error: StorageError) -> &Self {
        *self.next_error.lock() = Some(error);
        self
    }

    /// Fail every operation.
    pub fn set_should_fail(&self, should_fail: bool) -> &Self {
        *self.should_fail.lock() = should_fail;
        self
    }

    /// Pre-populate an account's record.
    pub fn add_tokens(&self, account: &AccountIdentity, tokens: StoredTokens) -> &Self {
        self.inner.records.write().insert(account.clone(), tokens);
        self
    }

    /// Current record, bypassing history and failure injection.
    pub fn snapshot(&self, account: &AccountIdentity) -> Option<StoredTokens> {
        self.inner.records.read().get(account).cloned()
    }

    pub fn get_load_history(&self) -> Vec<AccountIdentity> {
        self.load_history.lock().clone()
    }

    pub fn get_set_history(&self) -> Vec<(AccountIdentity, TokenType, Option<String>)> {
        self.set_history.lock().clone()
    }

    pub fn get_store_history(&self) -> Vec<(AccountIdentity, TokenSet)> {
        self.store_history.lock().clone()
    }

    pub fn get_invalidate_history(&self) -> Vec<(AccountIdentity, TokenType)> {
        self.invalidate_history.lock().clone()
    }

    pub fn get_reauth_history(&self) -> Vec<AccountIdentity> {
        self.reauth_history.lock().clone()
    }

    fn check_error(&self) -> Result<(), StorageError> {
        if *self.should_fail.lock() {
            return Err(StorageError::WriteFailed {
                message: "Mock storage failure".to_string(),
            });
        }

        if let Some(error) = self.next_error.lock().take() {
            return Err(error);
        }

        Ok(())
    }
}

#[async_trait]
impl TokenStore for MockTokenStore {
    async fn load(&self, account: &AccountIdentity) -> Result<Option<StoredTokens>, StorageError> {
        self.check_error()?;
        self.load_history.lock().push(account.clone());
        self.inner.load(account).await
    }

    async fn set(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        value: Option<String>,
    ) -> Result<(), StorageError> {
        self.check_error()?;
        self.set_history
            .lock()
            .push((account.clone(), token_type, value.clone()));
        self.inner.set(account, token_type, value).await
    }

    async fn store_token_set(
        &self,
        account: &AccountIdentity,
        token_set: &TokenSet,
    ) -> Result<(), StorageError> {
        self.check_error()?;
        self.store_history
            .lock()
            .push((account.clone(), token_set.clone()));
        self.inner.store_token_set(account, token_set).await
    }

    async fn invalidate(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
    ) -> Result<(), StorageError> {
        self.check_error()?;
        self.invalidate_history
            .lock()
            .push((account.clone(), token_type));
        self.inner.invalidate(account, token_type).await
    }

    async fn invalidate_if(
        &self,
        account: &AccountIdentity,
        token_type: TokenType,
        expected: &str,
    ) -> Result<bool, StorageError> {
        self.check_error()?;
        self.invalidate_history
            .lock()
            .push((account.clone(), token_type));
        self.inner.invalidate_if(account, token_type, expected).await
    }

    async fn mark_reauth_required(&self, account: &AccountIdentity) -> Result<(), StorageError> {
        self.check_error()?;
        self.reauth_history.lock().push(account.clone());
        self.inner.mark_reauth_required(account).await
    }

    async fn remove_account(&self, account: &AccountIdentity) -> Result<bool, StorageError> {
        self.check_error()?;
        self.inner.remove_account(account).await
    }

    async fn accounts(&self) -> Result<Vec<AccountIdentity>, StorageError> {
        self.check_error()?;
        self.inner.accounts().await
    }
}

/// Create in-memory token store.
pub fn create_in_memory_token_store() -> InMemoryTokenStore {
    InMemoryTokenStore::new()
}

/// Create mock token store for testing.
pub fn create_mock_token_store() -> MockTokenStore {
    MockTokenStore::new()
}
