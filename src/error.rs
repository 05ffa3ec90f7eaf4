use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::auth::{jwt::TokenError, service::IdentityError};

/// Failure kinds as seen by HTTP clients.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("User not found")]
    UserNotFound,
    #[error("User already exists")]
    UserAlreadyExists,
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Missing or invalid token")]
    TokenInvalid,
    #[error("Token expired")]
    TokenExpired,
    #[error("Token issuer mismatch")]
    IssuerMismatch,
    #[error("Server is misconfigured")]
    ConfigInvalid,
    #[error("{0}")]
    Validation(String),
    #[error("Internal server error")]
    Internal,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::UserNotFound => StatusCode::NOT_FOUND,
            ApiError::UserAlreadyExists => StatusCode::CONFLICT,
            ApiError::InvalidCredentials
            | ApiError::TokenInvalid
            | ApiError::TokenExpired
            | ApiError::IssuerMismatch => StatusCode::UNAUTHORIZED,
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::ConfigInvalid | ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::UserNotFound => "USER_NOT_FOUND",
            ApiError::UserAlreadyExists => "USER_ALREADY_EXISTS",
            ApiError::InvalidCredentials => "INVALID_CREDENTIALS",
            ApiError::TokenInvalid => "TOKEN_INVALID",
            ApiError::TokenExpired => "TOKEN_EXPIRED",
            ApiError::IssuerMismatch => "ISSUER_MISMATCH",
            ApiError::ConfigInvalid => "CONFIG_INVALID",
            ApiError::Validation(_) => "VALIDATION_ERROR",
            ApiError::Internal => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

impl From<IdentityError> for ApiError {
    fn from(e: IdentityError) -> Self {
        match e {
            IdentityError::UserNotFound => ApiError::UserNotFound,
            IdentityError::UserAlreadyExists => ApiError::UserAlreadyExists,
            IdentityError::InvalidCredentials => ApiError::InvalidCredentials,
            other => {
                error!(error = %other, "identity operation failed");
                ApiError::Internal
            }
        }
    }
}

impl From<TokenError> for ApiError {
    fn from(e: TokenError) -> Self {
        match e {
            TokenError::Invalid => ApiError::TokenInvalid,
            TokenError::Expired => ApiError::TokenExpired,
            TokenError::IssuerMismatch => ApiError::IssuerMismatch,
            TokenError::ConfigInvalid(msg) => {
                error!(error = %msg, "token keys misconfigured");
                ApiError::ConfigInvalid
            }
            TokenError::Signing(msg) => {
                error!(error = %msg, "jwt signing failed");
                ApiError::Internal
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn each_kind_maps_to_one_status() {
        let cases = [
            (ApiError::UserNotFound, 404),
            (ApiError::UserAlreadyExists, 409),
            (ApiError::InvalidCredentials, 401),
            (ApiError::TokenInvalid, 401),
            (ApiError::TokenExpired, 401),
            (ApiError::IssuerMismatch, 401),
            (ApiError::ConfigInvalid, 500),
            (ApiError::Validation("bad".into()), 400),
            (ApiError::Internal, 500),
        ];
        for (err, status) in cases {
            assert_eq!(err.status().as_u16(), status, "{err:?}");
        }
    }

    #[test]
    fn token_errors_stay_distinct() {
        assert!(matches!(ApiError::from(TokenError::Invalid), ApiError::TokenInvalid));
        assert!(matches!(ApiError::from(TokenError::Expired), ApiError::TokenExpired));
        assert!(matches!(
            ApiError::from(TokenError::IssuerMismatch),
            ApiError::IssuerMismatch
        ));
    }

    #[test]
    fn internal_failures_do_not_leak_details() {
        let err = ApiError::from(IdentityError::Database(sqlx::Error::PoolTimedOut));
        assert!(matches!(err, ApiError::Internal));
        assert_eq!(err.to_string(), "Internal server error");
    }
}
