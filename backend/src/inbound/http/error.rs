//! Domain errors as HTTP responses.
//!
//! `not_ready` maps to 409 so pollers can tell "keep waiting" apart from
//! "never requested" (404). While the job is still queued or rendering the
//! response carries a `Retry-After` hint; a failed job gets none because only
//! a resubmission will change it. Internal errors lose their message and
//! details before leaving the process.

use actix_web::http::header::RETRY_AFTER;
use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::Value;

use crate::domain::{Error, ErrorCode, TRACE_ID_HEADER};

/// Convenient result alias for HTTP handlers.
pub type ApiResult<T> = Result<T, Error>;

/// Seconds a poller should wait before asking about an in-flight job.
pub const POLL_RETRY_AFTER_SECS: u32 = 2;

/// Seconds a client should wait after the artifact store was unreachable.
pub const UNAVAILABLE_RETRY_AFTER_SECS: u32 = 5;

const REDACTED_MESSAGE: &str = "Internal server error";

const fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::InvalidRequest => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::NotReady => StatusCode::CONFLICT,
        ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn job_in_flight(details: Option<&Value>) -> bool {
    details
        .and_then(|value| value.get("state"))
        .and_then(Value::as_str)
        .is_some_and(|state| matches!(state, "pending" | "processing"))
}

fn retry_after(error: &Error) -> Option<u32> {
    match error.code() {
        ErrorCode::NotReady if job_in_flight(error.details()) => Some(POLL_RETRY_AFTER_SECS),
        ErrorCode::ServiceUnavailable => Some(UNAVAILABLE_RETRY_AFTER_SECS),
        _ => None,
    }
}

fn public_body(error: &Error) -> Error {
    if error.code() != ErrorCode::InternalError {
        return error.clone();
    }
    let redacted = Error::internal(REDACTED_MESSAGE);
    match error.trace_id() {
        Some(id) => redacted.with_trace_id(id.to_owned()),
        None => redacted,
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        status_for(self.code())
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        if let Some(id) = self.trace_id() {
            builder.insert_header((TRACE_ID_HEADER, id.to_owned()));
        }
        if let Some(seconds) = retry_after(self) {
            builder.insert_header((RETRY_AFTER, seconds.to_string()));
        }
        builder.json(public_body(self))
    }
}

#[cfg(test)]
mod tests;
