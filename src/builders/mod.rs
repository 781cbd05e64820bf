//! Builders
//!
//! Fluent builder patterns for client options and provider configuration.

pub mod config;

pub use config::{
    client_options, provider_config, ClientOptionsBuilder, ProviderConfigBuilder,
    ENV_AUTHORIZATION_ENDPOINT, ENV_ISSUER, ENV_TOKEN_ENDPOINT, ENV_USERINFO_ENDPOINT,
};
