//! OIDC Flows
//!
//! The authorization code grant and refresh token grant against the provider.

pub mod protocol;

pub use protocol::{
    build_authorization_url, create_mock_protocol_client, MockProtocolClient,
    OidcProtocolClient, ProtocolClient,
};
