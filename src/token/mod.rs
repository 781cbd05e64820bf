//! Token Management
//!
//! Per-account token storage and the lifecycle state machine on top of it.

pub mod manager;
pub mod storage;

pub use storage::{
    create_in_memory_token_store, create_mock_token_store, InMemoryTokenStore, MockTokenStore,
    TokenStore,
};

pub use manager::{
    create_mock_lifecycle_manager, DefaultTokenLifecycleManager, LifecycleConfig,
    MockTokenLifecycleManager, TokenLifecycleManager,
};
