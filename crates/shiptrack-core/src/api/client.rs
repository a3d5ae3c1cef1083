//! API client for the shipment-tracking REST API.
//!
//! This module provides the `ApiClient` struct, the thin request wrapper
//! every screen uses. It attaches the bearer token, retries rate-limited
//! requests, and sends the user back to the login surface when the server
//! stops accepting the session.

use std::sync::Arc;
use std::time::Duration;

use reqwest::{header, multipart, Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::TokenStore;
use crate::config::Config;
use crate::navigation::Navigator;
use crate::utils::clean_query;

use super::ApiError;

// ============================================================================
// Constants
// ============================================================================

/// Maximum number of retries for rate-limited (429) requests.
/// 3 retries with exponential backoff usually succeeds without excessive delay.
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// Initial backoff delay in milliseconds for rate limiting.
const INITIAL_BACKOFF_MS: u64 = 1000;

const ACCEPT_ANY: &str = "application/json, text/plain, */*";

/// A decoded response. `body` is `None` for 204 and empty bodies; text that
/// is not JSON is kept as a JSON string.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub body: Option<Value>,
}

impl ApiResponse {
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Turn a non-2xx response into the matching `ApiError`
    pub fn error_for_status(self) -> Result<Self, ApiError> {
        if self.ok() {
            Ok(self)
        } else {
            let body = match &self.body {
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
                None => String::new(),
            };
            Err(ApiError::from_status(self.status, &body))
        }
    }

    /// Deserialize the body into `T` (a missing body is read as `null`)
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        let body = self.body.clone().unwrap_or(Value::Null);
        serde_json::from_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to parse response: {}", e)))
    }
}

/// Authenticated API client.
/// Clone is cheap - the connection pool, store and navigator are shared.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: String,
    store: Arc<dyn TokenStore>,
    navigator: Arc<dyn Navigator>,
    login_path: String,
    public_paths: Vec<String>,
}

impl ApiClient {
    pub fn new(
        config: &Config,
        store: Arc<dyn TokenStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Result<Self, ApiError> {
        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(header::ACCEPT, header::HeaderValue::from_static(ACCEPT_ANY));
        default_headers.insert(
            "x-requested-with",
            header::HeaderValue::from_static("XMLHttpRequest"),
        );

        let client = Client::builder()
            .timeout(config.request_timeout())
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            store,
            navigator,
            login_path: config.login_path.clone(),
            public_paths: config.public_paths(),
        })
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Build the Authorization header from the token stored right now.
    /// The renewal loop may have replaced it since the last request.
    fn auth_headers(&self) -> Result<header::HeaderMap, ApiError> {
        let mut headers = header::HeaderMap::new();
        let token = self
            .store
            .access_token()
            .map_err(|e| ApiError::TokenStore(format!("{:#}", e)))?;
        if let Some(token) = token {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| ApiError::TokenStore("Stored access token is not a valid header".to_string()))?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send the user to the login surface unless they are already on a
    /// surface that does not need a session.
    fn intercept_unauthorized(&self, url: &str) {
        let current = self.navigator.current_path();
        if self.public_paths.iter().any(|p| *p == current) {
            debug!(url = url, path = %current, "Unauthorized response on public surface");
            return;
        }
        warn!(url = url, path = %current, "Unauthorized response, redirecting to login");
        self.navigator.navigate(&self.login_path);
    }

    async fn decode(&self, url: &str, response: reqwest::Response) -> Result<ApiResponse, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.intercept_unauthorized(url);
            return Err(ApiError::Unauthorized);
        }
        if status == StatusCode::NO_CONTENT {
            return Ok(ApiResponse { status, body: None });
        }

        let text = response.text().await?;
        let body = if text.trim().is_empty() {
            None
        } else {
            Some(serde_json::from_str(&text).unwrap_or(Value::String(text)))
        };
        Ok(ApiResponse { status, body })
    }

    /// Send a request with an optional query and JSON body.
    ///
    /// Any HTTP status except 401 resolves to `Ok`; use
    /// `ApiResponse::error_for_status` to treat failures as errors.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        let mut retries = 0;
        let mut backoff_ms = INITIAL_BACKOFF_MS;

        loop {
            let mut builder = self
                .client
                .request(method.clone(), &url)
                .headers(self.auth_headers()?);
            if !query.is_empty() {
                builder = builder.query(query);
            }
            if let Some(body) = body {
                builder = builder.json(body);
            }

            let response = builder.send().await?;

            if response.status() == StatusCode::TOO_MANY_REQUESTS {
                retries += 1;
                if retries > MAX_RATE_LIMIT_RETRIES {
                    return Err(ApiError::RateLimited);
                }
                warn!(url = %url, retry = retries, backoff_ms = backoff_ms, "Rate limited, backing off");
                tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
                backoff_ms *= 2; // Exponential backoff
                continue;
            }

            return self.decode(&url, response).await;
        }
    }

    /// GET with filter parameters taken from a JSON object (see `clean_query`)
    pub async fn get(&self, path: &str, params: &Value) -> Result<ApiResponse, ApiError> {
        self.request(Method::GET, path, &clean_query(params), None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.request(Method::POST, path, &[], Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<ApiResponse, ApiError> {
        self.request(Method::PATCH, path, &[], Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse, ApiError> {
        self.request(Method::DELETE, path, &[], None).await
    }

    /// POST a multipart form (document uploads). Not retried on 429 since
    /// the form is consumed by the first attempt.
    pub async fn upload(&self, path: &str, form: multipart::Form) -> Result<ApiResponse, ApiError> {
        let url = self.url(path);
        let response = self
            .client
            .post(&url)
            .headers(self.auth_headers()?)
            .multipart(form)
            .send()
            .await?;
        self.decode(&url, response).await
    }

    /// GET and deserialize a successful response
    pub async fn get_json<T: DeserializeOwned>(&self, path: &str, params: &Value) -> Result<T, ApiError> {
        self.get(path, params).await?.error_for_status()?.json()
    }
}
