//! OIDC Core Components
//!
//! HTTP plumbing and provider discovery.

pub mod discovery;
pub mod transport;

pub use discovery::*;
pub use transport::*;
