use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::exchange::ExchangeError;
use crate::keys::RegistryError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Only {0} is allowed")]
    MethodNotAllowed(&'static str),
    #[error("Invalid JSON body")]
    InvalidJson,
    #[error("Missing fields: {0:?}")]
    MissingFields(Vec<&'static str>),
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),
    #[error("Field '{0}' must be a string")]
    InvalidField(&'static str),
    #[error("Not Found")]
    NotFound,
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        AppError::Exchange(ExchangeError::Registry(err))
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            AppError::InvalidJson
            | AppError::MissingFields(_)
            | AppError::MissingParameters(_)
            | AppError::InvalidField(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound => StatusCode::NOT_FOUND,
            AppError::Exchange(err) => match err {
                ExchangeError::Unauthorized(_) => StatusCode::FORBIDDEN,
                ExchangeError::InvalidName(_) => StatusCode::BAD_REQUEST,
                ExchangeError::PartnerKeyNotFound(_) | ExchangeError::SecretNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                ExchangeError::NameOwnedByOtherPartner { .. } => StatusCode::CONFLICT,
                ExchangeError::DecryptionFailed(_)
                | ExchangeError::StorageWriteFailed(_)
                | ExchangeError::EncryptionFailed(_)
                | ExchangeError::Registry(_)
                | ExchangeError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    /// Caller-facing text. Server-side failures never carry internal detail.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Exchange(err) => match err {
                ExchangeError::Unauthorized(_) => "Unauthorized partner_id".into(),
                ExchangeError::InvalidName(_) => "Invalid secret format".into(),
                ExchangeError::DecryptionFailed(_) | ExchangeError::StorageWriteFailed(_) => {
                    "Failed to process secret".into()
                }
                ExchangeError::PartnerKeyNotFound(_) => "Partner public key not found".into(),
                ExchangeError::SecretNotFound(_) => "Secret not found".into(),
                ExchangeError::NameOwnedByOtherPartner { .. } => {
                    "Secret name is not available".into()
                }
                ExchangeError::EncryptionFailed(_) => "Failed to encrypt secret".into(),
                ExchangeError::Registry(err) if err.is_key_generation() => {
                    "Failed to generate platform key".into()
                }
                ExchangeError::Registry(_) | ExchangeError::Store(_) => {
                    "Internal server error".into()
                }
            },
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(?self, "request failed");
        } else {
            tracing::warn!(error = %self, status = status.as_u16(), "request rejected");
        }
        (status, Json(json!({ "message": self.public_message() }))).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
