use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::ai::core::providers::ProviderError;

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ApiError {
    pub error: String,
    pub error_code: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub enum ErrorCode {
    // Validation errors (VALID_xxx)
    ValidMissingRequiredField,
    ValidInvalidInput,

    // Upstream provider errors (UPSTREAM_xxx)
    UpstreamAuthFailed,
    UpstreamRateLimited,
    UpstreamContentPolicy,
    UpstreamModelUnavailable,
    UpstreamSearchUnavailable,
    UpstreamProviderError,
    UpstreamTimeout,

    // Payments errors (PAYMENT_xxx)
    PaymentSignatureInvalid,
    PaymentNotConfigured,

    // System errors (SYSTEM_xxx)
    SystemDatabaseError,
    SystemInternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidMissingRequiredField => "VALID_MISSING_REQUIRED_FIELD",
            ErrorCode::ValidInvalidInput => "VALID_INVALID_INPUT",

            ErrorCode::UpstreamAuthFailed => "UPSTREAM_AUTH_FAILED",
            ErrorCode::UpstreamRateLimited => "UPSTREAM_RATE_LIMITED",
            ErrorCode::UpstreamContentPolicy => "UPSTREAM_CONTENT_POLICY",
            ErrorCode::UpstreamModelUnavailable => "UPSTREAM_MODEL_UNAVAILABLE",
            ErrorCode::UpstreamSearchUnavailable => "UPSTREAM_SEARCH_UNAVAILABLE",
            ErrorCode::UpstreamProviderError => "UPSTREAM_PROVIDER_ERROR",
            ErrorCode::UpstreamTimeout => "UPSTREAM_TIMEOUT",

            ErrorCode::PaymentSignatureInvalid => "PAYMENT_SIGNATURE_INVALID",
            ErrorCode::PaymentNotConfigured => "PAYMENT_NOT_CONFIGURED",

            ErrorCode::SystemDatabaseError => "SYSTEM_DATABASE_ERROR",
            ErrorCode::SystemInternalError => "SYSTEM_INTERNAL_ERROR",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            ErrorCode::ValidMissingRequiredField
            | ErrorCode::ValidInvalidInput
            | ErrorCode::UpstreamContentPolicy
            | ErrorCode::UpstreamModelUnavailable
            | ErrorCode::PaymentSignatureInvalid => StatusCode::BAD_REQUEST,

            // 401 Unauthorized
            ErrorCode::UpstreamAuthFailed => StatusCode::UNAUTHORIZED,

            // 429 Too Many Requests
            ErrorCode::UpstreamRateLimited => StatusCode::TOO_MANY_REQUESTS,

            // 503 Service Unavailable
            ErrorCode::UpstreamSearchUnavailable => StatusCode::SERVICE_UNAVAILABLE,

            // 500 Internal Server Error
            ErrorCode::UpstreamProviderError
            | ErrorCode::UpstreamTimeout
            | ErrorCode::PaymentNotConfigured
            | ErrorCode::SystemDatabaseError
            | ErrorCode::SystemInternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct AppError {
    code: ErrorCode,
    message: String,
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    // Convenience constructors for common errors
    pub fn missing_field(field: &str) -> Self {
        Self::new(
            ErrorCode::ValidMissingRequiredField,
            format!("{} is required", field),
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidInvalidInput, message)
    }

    pub fn invalid_signature() -> Self {
        Self::new(ErrorCode::PaymentSignatureInvalid, "Invalid webhook signature")
    }

    pub fn payments_not_configured() -> Self {
        Self::new(ErrorCode::PaymentNotConfigured, "Payments are not configured")
    }

    pub fn database_error(err: impl std::error::Error) -> Self {
        Self::new(
            ErrorCode::SystemDatabaseError,
            format!("Database error: {}", err),
        )
    }

    pub fn internal_error(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SystemInternalError, msg)
    }

    /// Map an upstream provider failure onto the gateway error taxonomy by
    /// inspecting the upstream message for known substrings. Checked in
    /// order; unrecognized failures fall back to a 500.
    pub fn from_provider(err: &ProviderError) -> Self {
        if let ProviderError::Timeout { provider, attempts } = err {
            return Self::new(
                ErrorCode::UpstreamTimeout,
                format!("{} job did not complete after {} polls", provider, attempts),
            );
        }

        let provider = err.provider();
        let message = err.to_string();
        let lowered = message.to_lowercase();

        let code = if lowered.contains("rate limit") || lowered.contains("rate_limit") {
            ErrorCode::UpstreamRateLimited
        } else if lowered.contains("api key")
            || lowered.contains("api_key")
            || lowered.contains("unauthorized")
            || lowered.contains("authentication")
        {
            ErrorCode::UpstreamAuthFailed
        } else if lowered.contains("content policy")
            || lowered.contains("content_policy")
            || lowered.contains("moderation")
        {
            ErrorCode::UpstreamContentPolicy
        } else if lowered.contains("model") {
            ErrorCode::UpstreamModelUnavailable
        } else if lowered.contains("search") {
            ErrorCode::UpstreamSearchUnavailable
        } else {
            ErrorCode::UpstreamProviderError
        };

        Self::new(code, format!("{} error: {}", provider, message))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(ApiError {
            error: self.message,
            error_code: self.code.as_str().to_string(),
        });

        (self.code.status_code(), body).into_response()
    }
}

impl From<ProviderError> for AppError {
    fn from(err: ProviderError) -> Self {
        AppError::from_provider(&err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::database_error(err)
    }
}

pub type ApiResult<T> = Result<(StatusCode, T), AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(message: &str) -> ProviderError {
        ProviderError::Upstream {
            provider: "openai",
            message: message.to_string(),
        }
    }

    #[test]
    fn test_rate_limit_maps_to_429() {
        let err = AppError::from_provider(&upstream("Rate limit exceeded, slow down"));
        assert_eq!(err.code().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_api_key_maps_to_401() {
        let err = AppError::from_provider(&upstream("Incorrect API key provided"));
        assert_eq!(err.code().status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_content_policy_maps_to_400() {
        let err = AppError::from_provider(&upstream("rejected by content policy"));
        assert_eq!(err.code().status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_moderation_maps_to_400() {
        let err = AppError::from_provider(&upstream("flagged by moderation"));
        assert_eq!(err.code().status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_model_maps_to_400() {
        let err = AppError::from_provider(&upstream("The model `gpt-9` does not exist"));
        assert_eq!(err.code().status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_search_maps_to_503() {
        let err = AppError::from_provider(&upstream("search tool temporarily disabled"));
        assert_eq!(err.code().status_code(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[test]
    fn test_unclassified_maps_to_500() {
        let err = AppError::from_provider(&upstream("something odd happened"));
        assert_eq!(err.code().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_rate_limit_wins_over_model() {
        // "rate limit" is checked before the broad "model" substring
        let err = AppError::from_provider(&upstream("rate limit reached for model gpt-4o"));
        assert_eq!(err.code().status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_poll_timeout_maps_to_500() {
        let err = AppError::from_provider(&ProviderError::Timeout {
            provider: "replicate",
            attempts: 30,
        });
        assert_eq!(err.code().status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code(), ErrorCode::UpstreamTimeout);
    }
}
