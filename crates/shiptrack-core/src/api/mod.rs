//! REST API module for the shipment-tracking service.
//!
//! This module provides:
//! - `HttpAuthApi`: the token, refresh and signup endpoints behind the
//!   `AuthApi` trait the session manager uses
//! - `ApiClient`: the bearer-token request wrapper used for everything else
//!
//! Tokens are JWTs issued by `/api/v1/user/token/`.

pub mod auth;
pub mod client;
pub mod error;

pub use auth::{AuthApi, HttpAuthApi, LoginReply, RefreshReply, SignupReply};
pub use client::{ApiClient, ApiResponse};
pub use error::ApiError;
pub use reqwest::Method;
