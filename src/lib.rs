//! OIDC Integration Module
//!
//! OpenID Connect client core: authorization-code login, per-account token
//! storage, lazy refresh and authenticated requests that recover from a
//! rejected access token.
//!
//! # Features
//!
//! - Authorization Code Flow with OIDC scopes (RFC 6749 Section 4.1)
//! - Token Refresh (RFC 6749 Section 6)
//! - Per-account token storage with refresh-token retention
//! - Serialized refresh per account
//! - Bearer requests with a single retry after a token rejection
//! - OIDC Discovery
//!
//! # Example
//!
//! ```rust,ignore
//! use oidc_integration::{client_options, provider_config, AccountIdentity, OidcClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = provider_config()
//!         .authorization_endpoint("https://op.example.com/authorize")
//!         .token_endpoint("https://op.example.com/token")
//!         .userinfo_endpoint("https://op.example.com/userinfo")
//!         .build()?;
//!
//!     let options = client_options()
//!         .client_id("my-client-id")
//!         .client_secret("my-client-secret")
//!         .redirect_url("https://myapp.com/callback")
//!         .scopes(["openid", "profile", "offline_access"])
//!         .build()?;
//!
//!     let client = OidcClient::new(provider)?;
//!     let account = AccountIdentity::new("alice", "com.example.app");
//!
//!     // `prompt` is the application's login UI.
//!     client.authorize_account(&account, &options, &prompt).await?;
//!
//!     let info = client.user_info(&account, &options).await?;
//!     println!("Hello {}", info["given_name"]);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `types`: token, configuration and authorization data structures
//! - `error`: error hierarchy with response mapping
//! - `core`: HTTP transport and discovery
//! - `flows`: authorization URL, code exchange and refresh against the provider
//! - `token`: token store and lifecycle manager
//! - `executor`: authenticated request executor and auth failure matching
//! - `builders`: fluent builders for configuration
//! - `client`: high-level client combining all of the above

pub mod builders;
pub mod client;
pub mod core;
pub mod error;
pub mod executor;
pub mod flows;
pub mod token;
pub mod types;

// Re-export main client
pub use client::{oidc_client, AuthorizationPrompt, MockAuthorizationPrompt, OidcClient};

// Re-export builders
pub use builders::{client_options, provider_config, ClientOptionsBuilder, ProviderConfigBuilder};

// Re-export errors
pub use error::{
    AuthorizationError, ConfigurationError, ExecutionError, OidcError, OidcResult, ProtocolError,
    StorageError,
};

// Re-export types
pub use types::{
    AccountIdentity, AuthorizationOutcome, AuthorizationParams, CallbackParams, ClientAuthMethod,
    ClientOptions, OIDCDiscoveryDocument, Prompt, ProviderConfig, StoredTokens, TokenSet,
    TokenState, TokenType,
};

// Re-export core components
pub use core::{
    DefaultDiscoveryClient, DiscoveryClient, HttpMethod, HttpRequest, HttpResponse,
    HttpTransport, MockHttpTransport, ReqwestHttpTransport,
};

// Re-export protocol client
pub use flows::{OidcProtocolClient, ProtocolClient};

// Re-export token management
pub use token::{
    DefaultTokenLifecycleManager, InMemoryTokenStore, LifecycleConfig, TokenLifecycleManager,
    TokenStore,
};

// Re-export executor
pub use executor::{AuthFailureMatcher, AuthenticatedRequestExecutor, BadRequestPolicy, StatusMatcher};
