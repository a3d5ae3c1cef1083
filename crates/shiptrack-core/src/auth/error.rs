use thiserror::Error;

use crate::api::ApiError;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Registration rejected: {}", .0.as_deref().unwrap_or("no details"))]
    RegistrationRejected(Option<String>),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Token store error: {0:#}")]
    Store(anyhow::Error),
}
