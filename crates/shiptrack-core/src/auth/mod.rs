//! Authentication module for managing the API session.
//!
//! This module provides:
//! - `SessionManager`: login, signup, logout and silent token renewal
//! - `TokenStore`: durable storage for the access/refresh token pair, with
//!   file, OS keychain (`KeyringTokenStore`) and in-memory backends
//!
//! Access tokens are renewed every 4 minutes while a refresh token is held.

pub mod credentials;
pub mod error;
pub mod renewal;
pub mod session;
pub mod store;

pub use credentials::KeyringTokenStore;
pub use error::SessionError;
pub use renewal::RenewalOutcome;
pub use session::SessionManager;
pub use store::{open_store, FileTokenStore, MemoryTokenStore, TokenStore};
