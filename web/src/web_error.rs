use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use common::err::DatalayerError;
use serde::Serialize;

/// Wraps [`DatalayerError`] at the HTTP boundary. The mapping to status
/// codes follows the error taxonomy directly: unknown dataset and bad
/// request are client errors, everything else is a backend failure.
#[derive(Debug, Clone)]
pub struct WebError(pub DatalayerError);

impl From<DatalayerError> for WebError {
    fn from(err: DatalayerError) -> Self {
        WebError(err)
    }
}

impl std::fmt::Display for WebError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl ResponseError for WebError {
    fn status_code(&self) -> StatusCode {
        match &self.0 {
            DatalayerError::UnknownDataset(_) => StatusCode::NOT_FOUND,
            DatalayerError::BadRequest(_) | DatalayerError::BadCustomQuery => StatusCode::BAD_REQUEST,
            DatalayerError::ConnectionFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::QueryFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::LsnPastEndOfLog => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::RowIterError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::SqlServerError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::EmptyId => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::WriteFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
            DatalayerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Unknown dataset mirrors a plain `http.NotFound`: an empty body,
        // not a JSON error envelope, so a GET for a dataset that was never
        // configured is indistinguishable from hitting an unrouted path.
        if matches!(self.0, DatalayerError::UnknownDataset(_)) {
            return HttpResponse::build(self.status_code()).finish();
        }
        HttpResponse::build(self.status_code()).json(ErrorBody { message: self.0.to_string() })
    }
}
