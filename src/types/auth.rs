//! Authorization Types
//!
//! Types for the authorization-code leg that runs in the external login UI.

use base64::Engine;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Optional parameters for authorization URL generation.
#[derive(Clone, Debug, Default)]
pub struct AuthorizationParams {
    /// State value echoed back on the redirect.
    pub state: Option<String>,
    /// OIDC nonce bound into the ID token.
    pub nonce: Option<String>,
    /// Login hint for pre-filling user identity.
    pub login_hint: Option<String>,
    /// Prompt behavior.
    pub prompt: Option<Prompt>,
    /// Provider-specific parameters, appended in key order.
    pub extra_params: BTreeMap<String, String>,
}

impl AuthorizationParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parameters with freshly generated `state` and `nonce`.
    pub fn with_random_state() -> Self {
        Self {
            state: Some(random_token()),
            nonce: Some(random_token()),
            ..Default::default()
        }
    }

    pub fn state(mut self, state: impl Into<String>) -> Self {
        self.state = Some(state.into());
        self
    }

    pub fn prompt(mut self, prompt: Prompt) -> Self {
        self.prompt = Some(prompt);
        self
    }

    pub fn login_hint(mut self, hint: impl Into<String>) -> Self {
        self.login_hint = Some(hint.into());
        self
    }

    pub fn extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_params.insert(key.into(), value.into());
        self
    }
}

/// 32 random bytes, base64url without padding.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

/// Prompt behavior for authorization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// Do not display any authentication or consent UI.
    None,
    /// Force re-authentication.
    Login,
    /// Force consent screen.
    Consent,
    /// Force account selection.
    SelectAccount,
}

impl Prompt {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        }
    }
}

/// What the login UI hands back.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthorizationOutcome {
    /// Single-use authorization code.
    Code(String),
    /// The user backed out.
    Cancelled,
}

impl std::fmt::Debug for AuthorizationOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Code(_) => f.write_str("Code([REDACTED])"),
            Self::Cancelled => f.write_str("Cancelled"),
        }
    }
}
