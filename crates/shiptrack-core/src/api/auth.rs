//! Transport for the authentication endpoints.
//!
//! `AuthApi` is the seam the session manager talks through; `HttpAuthApi`
//! implements it against the REST API:
//!
//! | Operation    | Path                          | Body                                        |
//! |--------------|-------------------------------|---------------------------------------------|
//! | Authenticate | `/api/v1/user/token/`         | `{email, password}` -> `{access, refresh}`  |
//! | Refresh      | `/api/v1/user/token/refresh/` | `{refresh}` -> `{access}`                   |
//! | Register     | `/api/v1/user/signup/`        | `{email, password, first_name, last_name}`  |

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::models::{Credentials, Registration, TokenPair};
use crate::utils::format::field_error_message;

use super::ApiError;

pub const TOKEN_PATH: &str = "/api/v1/user/token/";
pub const REFRESH_PATH: &str = "/api/v1/user/token/refresh/";
pub const SIGNUP_PATH: &str = "/api/v1/user/signup/";

/// Field whose server message is surfaced first when registration fails
const SIGNUP_CONFLICT_FIELD: &str = "email";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginReply {
    Issued(TokenPair),
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshReply {
    Renewed(String),
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignupReply {
    Created,
    Rejected { message: Option<String> },
}

/// Authentication operations the session manager depends on.
///
/// `Err` means the exchange itself failed (network, server error, garbage
/// body); a server that answered and said no is an `Ok(..::Rejected)`.
#[async_trait]
pub trait AuthApi: Send + Sync {
    async fn obtain_token(&self, credentials: &Credentials) -> Result<LoginReply, ApiError>;
    async fn refresh_access(&self, refresh_token: &str) -> Result<RefreshReply, ApiError>;
    async fn register(&self, registration: &Registration) -> Result<SignupReply, ApiError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: Option<String>,
    refresh: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SignupResponse {
    #[serde(default)]
    status: bool,
    #[serde(default)]
    error: Option<Value>,
}

/// `AuthApi` over HTTP.
/// Clone is cheap - reqwest::Client uses Arc internally for connection pooling.
#[derive(Clone)]
pub struct HttpAuthApi {
    client: Client,
    base_url: String,
}

impl HttpAuthApi {
    pub fn new(config: &Config) -> Result<Self, ApiError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        Ok(Self::with_client(client, &config.api_base_url))
    }

    /// Share an existing connection pool
    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// POST a JSON body and return the status with the raw body text.
    /// Server errors and rate limiting become `Err`; every other status is
    /// left for the caller to interpret.
    async fn post<B: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<(StatusCode, String), ApiError> {
        let url = self.url(path);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        debug!(url = %url, status = %status, "Auth endpoint responded");

        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Err(ApiError::from_status(status, &text));
        }
        Ok((status, text))
    }
}

fn non_empty(token: Option<String>) -> Option<String> {
    token.filter(|t| !t.trim().is_empty())
}

fn parse_login(status: StatusCode, body: &str) -> Result<LoginReply, ApiError> {
    let parsed: TokenResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(ApiError::InvalidResponse(format!(
                "Failed to parse token response: {}",
                e
            )))
        }
        Err(_) => return Ok(LoginReply::Rejected),
    };

    match (non_empty(parsed.access), non_empty(parsed.refresh)) {
        (Some(access), Some(refresh)) => Ok(LoginReply::Issued(TokenPair { access, refresh })),
        (None, _) => Ok(LoginReply::Rejected),
        (Some(_), None) => Err(ApiError::InvalidResponse(
            "Token response is missing the refresh token".to_string(),
        )),
    }
}

fn parse_refresh(status: StatusCode, body: &str) -> Result<RefreshReply, ApiError> {
    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Ok(RefreshReply::Rejected);
    }

    let parsed: RefreshResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(ApiError::InvalidResponse(format!(
                "Failed to parse refresh response: {}",
                e
            )))
        }
        Err(_) => return Ok(RefreshReply::Rejected),
    };

    Ok(match non_empty(parsed.access) {
        Some(access) => RefreshReply::Renewed(access),
        None => RefreshReply::Rejected,
    })
}

fn parse_signup(status: StatusCode, body: &str) -> Result<SignupReply, ApiError> {
    let parsed: SignupResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) if status.is_success() => {
            return Err(ApiError::InvalidResponse(format!(
                "Failed to parse signup response: {}",
                e
            )))
        }
        Err(_) => return Ok(SignupReply::Rejected { message: None }),
    };

    if parsed.status && status.is_success() {
        return Ok(SignupReply::Created);
    }

    let message = parsed
        .error
        .as_ref()
        .and_then(|error| field_error_message(error, SIGNUP_CONFLICT_FIELD));
    Ok(SignupReply::Rejected { message })
}

#[async_trait]
impl AuthApi for HttpAuthApi {
    async fn obtain_token(&self, credentials: &Credentials) -> Result<LoginReply, ApiError> {
        let (status, body) = self.post(TOKEN_PATH, credentials).await?;
        parse_login(status, &body)
    }

    async fn refresh_access(&self, refresh_token: &str) -> Result<RefreshReply, ApiError> {
        let body = serde_json::json!({ "refresh": refresh_token });
        let (status, body) = self.post(REFRESH_PATH, &body).await?;
        parse_refresh(status, &body)
    }

    async fn register(&self, registration: &Registration) -> Result<SignupReply, ApiError> {
        let (status, body) = self.post(SIGNUP_PATH, registration).await?;
        parse_signup(status, &body)
    }
}
