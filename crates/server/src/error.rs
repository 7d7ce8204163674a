use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// User-visible error codes with their HTTP status mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Malformed input or missing required fields.
    ValidationError,
    /// Body parse failure.
    InvalidJson,
    /// No or invalid credential where one is required.
    AuthenticationError,
    /// Authenticated but missing permission.
    Forbidden,
    /// Unknown route, run, session, or tool.
    NotFound,
    /// Admission cap exceeded.
    ConnectionLimit,
    /// Too many run subscriptions on one WebSocket.
    SubscriptionLimit,
    /// A required collaborator is unconfigured.
    ServiceUnavailable,
    /// A collaborator lacks an optional operation.
    NotImplemented,
    /// Uncaught failure.
    InternalError,
    /// The model collaborator refused to begin a run.
    RunStartFailed,
    /// WebSocket routing: unknown channel.
    UnknownChannel,
    /// WebSocket routing: unknown action on a known channel.
    UnknownAction,
}

impl ErrorCode {
    /// The wire representation.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ValidationError => "VALIDATION_ERROR",
            Self::InvalidJson => "INVALID_JSON",
            Self::AuthenticationError => "AUTHENTICATION_ERROR",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFound => "NOT_FOUND",
            Self::ConnectionLimit => "CONNECTION_LIMIT",
            Self::SubscriptionLimit => "SUBSCRIPTION_LIMIT",
            Self::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            Self::NotImplemented => "NOT_IMPLEMENTED",
            Self::InternalError => "INTERNAL_ERROR",
            Self::RunStartFailed => "RUN_START_FAILED",
            Self::UnknownChannel => "UNKNOWN_CHANNEL",
            Self::UnknownAction => "UNKNOWN_ACTION",
        }
    }

    /// The HTTP status this code maps to.
    pub fn status(self) -> StatusCode {
        match self {
            Self::ValidationError | Self::InvalidJson => StatusCode::BAD_REQUEST,
            Self::AuthenticationError => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::ConnectionLimit | Self::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::SubscriptionLimit => StatusCode::TOO_MANY_REQUESTS,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::RunStartFailed => StatusCode::BAD_GATEWAY,
            Self::UnknownChannel | Self::UnknownAction => StatusCode::BAD_REQUEST,
        }
    }
}

/// The normalized error envelope every route returns on failure.
///
/// Collaborator exception text never passes through here; callers log the
/// detail and hand a stable message to the client.
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    message: String,
    details: Option<Value>,
}

impl ApiError {
    /// Creates an error with the given code and client-safe message.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Attaches structured, client-safe details.
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// The error code.
    pub fn code(&self) -> ErrorCode {
        self.code
    }

    /// The client-safe message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Malformed input.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationError, message)
    }

    /// Body parse failure.
    pub fn invalid_json() -> Self {
        Self::new(ErrorCode::InvalidJson, "Request body is not valid JSON")
    }

    /// Unknown resource.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Missing or invalid credential.
    pub fn unauthenticated() -> Self {
        Self::new(ErrorCode::AuthenticationError, "Authentication required")
    }

    /// Missing permission.
    pub fn forbidden() -> Self {
        Self::new(ErrorCode::Forbidden, "Insufficient permissions")
    }

    /// Unconfigured collaborator.
    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }

    /// Generic internal failure. The underlying cause stays in the logs.
    pub fn internal() -> Self {
        Self::new(ErrorCode::InternalError, "Internal server error")
    }
}

#[derive(Serialize)]
struct ErrorEnvelope<'a> {
    error: ErrorBody<'a>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    code: &'static str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.code.status();

        let envelope = ErrorEnvelope {
            error: ErrorBody {
                code: self.code.as_str(),
                message: &self.message,
                details: self.details.as_ref(),
            },
        };

        (status, Json(&envelope)).into_response()
    }
}
