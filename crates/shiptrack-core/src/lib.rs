//! Core library for shiptrack.
//!
//! This crate holds the authenticated API session used by the shipment
//! tracking front ends:
//! - `auth`: the `SessionManager`, durable token stores and silent renewal
//! - `api`: the authentication transport and the bearer-token `ApiClient`
//! - `config`: persisted application configuration
//! - `navigation` / `notify`: the seams through which the session drives
//!   whatever surface is showing it

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod navigation;
pub mod notify;
pub mod utils;

#[cfg(test)]
pub(crate) mod testing;

pub use api::{ApiClient, ApiError, ApiResponse, HttpAuthApi};
pub use auth::{SessionError, SessionManager, TokenStore};
pub use config::{Config, SessionConfig, TokenStoreKind};
pub use models::{Credentials, Notice, NoticeLevel, Registration, SessionSnapshot, TokenPair};
pub use navigation::{Navigator, RouteTracker};
pub use notify::{ChannelNotifier, Notifier, TracingNotifier};
