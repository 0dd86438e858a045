use media_fetch_client::{Error, ErrorKind};
use rocket::http::Status;
use rocket::response::{self, Responder};
use rocket::serde::json::Json;
use rocket::Request;
use serde::Serialize;

/// Route-level wrapper mapping fetch errors to HTTP responses
#[derive(Debug)]
pub struct ApiError(pub Error);

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        ApiError(error)
    }
}

impl ApiError {
    pub fn status(&self) -> Status {
        match self.0.kind() {
            ErrorKind::Rejected => Status::BadRequest,
            ErrorKind::RetryLater => Status::TooManyRequests,
            ErrorKind::Upstream => Status::InternalServerError,
        }
    }

    pub fn retry_after(&self) -> Option<u64> {
        match self.0 {
            Error::TooManyRequests { retry_after_secs } => Some(retry_after_secs),
            _ => None,
        }
    }
}

impl<'r> Responder<'r, 'static> for ApiError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        if status.code >= 500 {
            log::error!("{} {} failed: {}", request.method(), request.uri(), self.0);
        } else {
            log::info!("{} {} rejected: {}", request.method(), request.uri(), self.0);
        }

        let mut response = Json(ErrorBody {
            detail: self.0.to_string(),
        })
        .respond_to(request)?;
        response.set_status(status);
        if let Some(retry_after) = self.retry_after() {
            response.set_raw_header("Retry-After", retry_after.to_string());
        }
        Ok(response)
    }
}
