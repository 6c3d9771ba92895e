use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::recommendations::RecommendationError;

use super::models::Envelope;

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const MISSING_IDENTITY: &str = "missing_identity";
    pub const VALIDATION: &str = "validation_error";
    pub const STORE: &str = "store_error";
    pub const QUEUE_UNAVAILABLE: &str = "queue_unavailable";
    pub const NOT_FOUND: &str = "not_found";
}

/// Error response rendered as the standard `{message, data: null}` envelope.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    report: ErrorReport,
}

const SOURCE: &str = "infra::http";

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            status,
            code,
            report: ErrorReport::from_message(SOURCE, status, format!("{code}: {message}")),
            message,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message)
    }

    pub fn missing_identity() -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            codes::MISSING_IDENTITY,
            "x-user-id header is required",
        )
    }

    pub fn invalid_payload(rejection: JsonRejection) -> Self {
        let mut error =
            Self::bad_request(format!("Invalid request payload: {}", rejection.body_text()));
        error.report = ErrorReport::from_error(SOURCE, StatusCode::BAD_REQUEST, &rejection);
        error
    }

    pub fn queue_unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            codes::QUEUE_UNAVAILABLE,
            message,
        )
    }

    /// Validation failures become 400 with the validation detail; store
    /// failures become 500 under `context`.
    pub fn from_recommendation(context: &'static str, err: RecommendationError) -> Self {
        let (status, code, message) = match &err {
            RecommendationError::Domain(inner) => (
                StatusCode::BAD_REQUEST,
                codes::VALIDATION,
                format!("Validation failed: {inner}"),
            ),
            RecommendationError::Repo(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                codes::STORE,
                context.to_string(),
            ),
        };
        Self {
            status,
            code,
            message,
            report: ErrorReport::from_error(SOURCE, status, &err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Envelope::<()>::failure(self.message, self.code);
        let mut response = (self.status, Json(body)).into_response();
        // Attach a structured report so shared logging middleware can emit rich diagnostics.
        self.report.attach(&mut response);
        response
    }
}
