use crate::error::StagerError;
use actix_web::{error::JsonPayloadError, http::StatusCode, HttpRequest, HttpResponse, ResponseError};
use serde::Serialize;

/// Error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope {
    pub code: u32,
    pub description: String,
    pub error_code: String,
}

impl From<&StagerError> for ErrorEnvelope {
    fn from(error: &StagerError) -> Self {
        let description = match error {
            StagerError::Authentication => "Authentication error".to_string(),
            e if !e.is_api_error() => "An unknown error occurred.".to_string(),
            e => e.to_string(),
        };
        Self {
            code: error.code(),
            description,
            error_code: format!("CF-{}", error.name()),
        }
    }
}

impl ResponseError for StagerError {
    fn status_code(&self) -> StatusCode {
        match self {
            StagerError::Authentication => StatusCode::UNAUTHORIZED,
            StagerError::Unauthorized(_) => StatusCode::FORBIDDEN,
            StagerError::NotFound(_) => StatusCode::NOT_FOUND,
            StagerError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            StagerError::Conflict(_)
            | StagerError::BitsAlreadyUploaded(_)
            | StagerError::BackendMismatch(_)
            | StagerError::StagingFailed(_)
            | StagerError::Parse(_) => StatusCode::BAD_REQUEST,
            StagerError::Capacity(_) => StatusCode::SERVICE_UNAVAILABLE,
            StagerError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorEnvelope::from(self))
    }
}

/// Render JSON extractor failures in the same envelope as every other error.
pub fn json_error_handler(err: JsonPayloadError, req: &HttpRequest) -> actix_web::Error {
    let detail = err.to_string();
    log::error!(
        "JSON payload error: \"{}\" for {} request to {}",
        detail,
        req.method(),
        req.path()
    );
    let response = StagerError::Parse(detail).error_response();
    actix_web::error::InternalError::from_response(err, response).into()
}
