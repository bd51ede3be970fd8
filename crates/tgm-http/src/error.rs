use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::error;

use tgm_core::Error;

/// JSON error response: `{"error": <kind>, "message": <text>}`.
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    MethodNotAllowed(String),
    Core(Error),
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError::Core(e)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ApiError::Core(e) => match e {
                Error::ChannelUnavailable { .. } | Error::NotFound(_) => StatusCode::NOT_FOUND,
                Error::FloodWait { .. } | Error::FloodWaitTooLong { .. } => {
                    StatusCode::TOO_MANY_REQUESTS
                }
                Error::Auth(_) => StatusCode::SERVICE_UNAVAILABLE,
                Error::Rpc(_) | Error::External(_) => StatusCode::BAD_GATEWAY,
                Error::Config(_) | Error::Storage(_) | Error::Io(_) | Error::Json(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "bad_request",
            ApiError::MethodNotAllowed(_) => "method_not_allowed",
            ApiError::Core(e) => e.kind(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::BadRequest(m) | ApiError::MethodNotAllowed(m) => m.clone(),
            ApiError::Core(e) => e.to_string(),
        };
        if status.is_server_error() {
            error!(status = status.as_u16(), error = %message, "Request failed");
        }

        let mut body = json!({ "error": self.kind(), "message": message });
        if let ApiError::Core(Error::FloodWait { seconds } | Error::FloodWaitTooLong { seconds }) =
            &self
        {
            body["retry_after"] = json!(seconds);
        }
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
