//! API Errors
//!
//! Unified error type for control-plane responses. Every error renders as
//! JSON `{"error": "..."}` with the appropriate status code: 400 for
//! validation, 404 for lookups, 500 for everything downstream.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::application::ports::{ConnectionError, StoreError};
use crate::application::services::RegistryError;
use crate::domain::market::UnknownTimeframe;
use crate::domain::subscription::InvalidKey;

/// Control-plane error.
#[derive(Debug)]
pub enum ApiError {
    /// The request was malformed or conflicts with current state.
    BadRequest(String),
    /// The referenced resource does not exist.
    NotFound(String),
    /// A downstream component failed.
    Internal(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::BadRequest(message) => write!(f, "bad_request: {message}"),
            Self::NotFound(message) => write!(f, "not_found: {message}"),
            Self::Internal(message) => write!(f, "internal_error: {message}"),
        }
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::NotFound(message) => (StatusCode::NOT_FOUND, message),
            Self::Internal(message) => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(error: StoreError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<ConnectionError> for ApiError {
    fn from(error: ConnectionError) -> Self {
        Self::Internal(error.to_string())
    }
}

impl From<InvalidKey> for ApiError {
    fn from(error: InvalidKey) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<UnknownTimeframe> for ApiError {
    fn from(error: UnknownTimeframe) -> Self {
        Self::BadRequest(error.to_string())
    }
}

impl From<RegistryError> for ApiError {
    fn from(error: RegistryError) -> Self {
        match error {
            RegistryError::AlreadySubscribed(_) => {
                Self::BadRequest("subscription already exists".to_string())
            }
            RegistryError::InvalidKey(invalid) => invalid.into(),
            RegistryError::Store(store) => store.into(),
            RegistryError::Connection(connection) => connection.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_duplicate_maps_to_bad_request() {
        let error: ApiError = RegistryError::AlreadySubscribed("cs_x".into()).into();
        assert!(matches!(error, ApiError::BadRequest(_)));
    }

    #[test]
    fn connection_error_maps_to_internal() {
        let error: ApiError = ConnectionError::NotConnected.into();
        assert!(matches!(error, ApiError::Internal(_)));
    }

    #[test]
    fn timeframe_error_maps_to_bad_request() {
        let error: ApiError = UnknownTimeframe("2H".into()).into();
        assert!(matches!(error, ApiError::BadRequest(_)));
    }
}
