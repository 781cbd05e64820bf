//! Token Types
//!
//! Token sets, account identities and the per-account token record.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::ProtocolError;

/// Token slot discriminator used for store lookups.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenType {
    Id,
    Access,
    Refresh,
}

impl TokenType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::Access => "access",
            Self::Refresh => "refresh",
        }
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies whose tokens are stored. Immutable once created.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountIdentity {
    name: String,
    account_type: String,
}

impl AccountIdentity {
    pub fn new(name: impl Into<String>, account_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            account_type: account_type.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_type(&self) -> &str {
        &self.account_type
    }
}

impl fmt::Display for AccountIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.account_type, self.name)
    }
}

/// Token response from the token endpoint, as sent on the wire.
#[derive(Clone, Deserialize)]
pub struct TokenResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_token_type")]
    pub token_type: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
    /// Additional fields.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

fn expires_at_from_now(expires_in: u64) -> Result<DateTime<Utc>, ProtocolError> {
    i64::try_from(expires_in)
        .ok()
        .and_then(Duration::try_seconds)
        .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
        .ok_or_else(|| ProtocolError::malformed(format!("expires_in out of range: {}", expires_in)))
}

fn default_token_type() -> String {
    "Bearer".to_string()
}

/// Hints about the lifetime of a token set. Carried but never required.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpiryHints {
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub scopes: Vec<String>,
}

impl Default for ExpiryHints {
    fn default() -> Self {
        Self {
            token_type: default_token_type(),
            access_expires_at: None,
            scopes: Vec::new(),
        }
    }
}

/// Result of one successful protocol exchange.
///
/// A code exchange always carries all three tokens. A refresh may omit
/// the ID and refresh tokens; [`TokenSet::retain_from`] fills them in.
#[derive(Clone, PartialEq, Eq)]
pub struct TokenSet {
    pub id_token: Option<String>,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expiry: ExpiryHints,
}

impl TokenSet {
    pub fn new(
        id_token: impl Into<String>,
        access_token: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Self {
        Self {
            id_token: Some(id_token.into()),
            access_token: access_token.into(),
            refresh_token: Some(refresh_token.into()),
            expiry: ExpiryHints::default(),
        }
    }

    /// Build from a wire response.
    ///
    /// Fails when the access token is missing or `expires_in` does not fit a timestamp.
    pub fn from_response(response: TokenResponse) -> Result<Self, ProtocolError> {
        let access_token = response
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ProtocolError::malformed("token response missing access_token"))?;
        let access_expires_at = response.expires_in.map(expires_at_from_now).transpose()?;
        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(String::from).collect())
            .unwrap_or_default();

        Ok(Self {
            id_token: response.id_token.filter(|t| !t.is_empty()),
            access_token,
            refresh_token: response.refresh_token.filter(|t| !t.is_empty()),
            expiry: ExpiryHints {
                token_type: response.token_type,
                access_expires_at,
                scopes,
            },
        })
    }

    pub fn with_expires_at(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expiry.access_expires_at = Some(expires_at);
        self
    }

    /// Keep previous ID / refresh tokens where the provider did not send new ones.
    pub fn retain_from(mut self, previous: &StoredTokens) -> Self {
        if self.refresh_token.is_none() {
            self.refresh_token = previous.refresh_token.clone();
        }
        if self.id_token.is_none() {
            self.id_token = previous.id_token.clone();
        }
        self
    }

    pub fn is_complete(&self) -> bool {
        self.id_token.is_some() && self.refresh_token.is_some()
    }
}

impl fmt::Debug for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenSet")
            .field("id_token", &self.id_token.as_ref().map(|_| "[REDACTED]"))
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "[REDACTED]"))
            .field("expiry", &self.expiry)
            .finish()
    }
}

/// Per-account record kept by a token store.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTokens {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_expires_at: Option<DateTime<Utc>>,
    /// Set when the provider rejected the refresh token.
    #[serde(default)]
    pub reauth_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredTokens {
    pub fn from_token_set(set: &TokenSet) -> Self {
        Self {
            id_token: set.id_token.clone(),
            access_token: Some(set.access_token.clone()),
            refresh_token: set.refresh_token.clone(),
            access_expires_at: set.expiry.access_expires_at,
            reauth_required: false,
            updated_at: Some(Utc::now()),
        }
    }

    pub fn get(&self, token_type: TokenType) -> Option<&str> {
        match token_type {
            TokenType::Id => self.id_token.as_deref(),
            TokenType::Access => self.access_token.as_deref(),
            TokenType::Refresh => self.refresh_token.as_deref(),
        }
    }

    pub fn set(&mut self, token_type: TokenType, value: Option<String>) {
        let value = value.filter(|v| !v.is_empty());
        match token_type {
            TokenType::Id => self.id_token = value,
            TokenType::Access => {
                self.access_token = value;
                self.access_expires_at = None;
            }
            TokenType::Refresh => self.refresh_token = value,
        }
        self.updated_at = Some(Utc::now());
    }

    pub fn is_empty(&self) -> bool {
        self.id_token.is_none() && self.access_token.is_none() && self.refresh_token.is_none()
    }

    /// Whether the access token expires within `buffer` from now.
    pub fn is_access_expiring(&self, buffer: std::time::Duration) -> bool {
        let buffer = Duration::from_std(buffer).unwrap_or_else(|_| Duration::zero());
        self.access_expires_at
            .map(|exp| exp <= Utc::now() + buffer)
            .unwrap_or(false)
    }

    pub fn state(&self) -> TokenState {
        if self.access_token.is_some() {
            if self.is_access_expiring(std::time::Duration::ZERO) {
                TokenState::Expired
            } else {
                TokenState::HasFullSet
            }
        } else if self.refresh_token.is_some() {
            TokenState::HasRefreshOnly
        } else if self.reauth_required {
            TokenState::NeedsReauthorization
        } else {
            TokenState::NoTokens
        }
    }
}

impl fmt::Debug for StoredTokens {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "[REDACTED]");
        f.debug_struct("StoredTokens")
            .field("id_token", &redact(&self.id_token))
            .field("access_token", &redact(&self.access_token))
            .field("refresh_token", &redact(&self.refresh_token))
            .field("access_expires_at", &self.access_expires_at)
            .field("reauth_required", &self.reauth_required)
            .field("updated_at", &self.updated_at)
            .finish()
    }
}

/// Lifecycle state of one account.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenState {
    NoTokens,
    HasRefreshOnly,
    HasFullSet,
    /// Access token present but past its known expiry.
    Expired,
    /// Refresh token was rejected; only the login flow can recover.
    NeedsReauthorization,
}
