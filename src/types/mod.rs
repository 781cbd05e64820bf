//! OIDC Types
//!
//! Core type definitions for the OIDC client.

pub mod auth;
pub mod callback;
#[cfg(feature = "jwt")]
pub mod claims;
pub mod config;
pub mod token;

pub use auth::*;
pub use callback::*;
#[cfg(feature = "jwt")]
pub use claims::*;
pub use config::*;
pub use token::*;
