use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder};
use thiserror::Error;
use tracing::{error, warn};

use std::error::Error as StdError;
use std::fmt;
use std::io;
use std::sync::PoisonError;

use crate::data::Envelope;

#[derive(Debug)]
pub struct InternalError {
    what: String,
}

impl StdError for InternalError {}
impl fmt::Display for InternalError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Generic internal error: {}", self.what)
    }
}

impl<T> From<PoisonError<T>> for InternalError {
    fn from(e: PoisonError<T>) -> InternalError {
        InternalError {
            what: e.to_string(),
        }
    }
}

macro_rules! internal_error_from {
    ($($source:ty),* $(,)?) => {
        $(
            impl From<$source> for InternalError {
                fn from(e: $source) -> InternalError {
                    InternalError {
                        what: e.to_string(),
                    }
                }
            }
        )*
    };
}

internal_error_from!(rusqlite::Error, serde_json::Error, io::Error, &str, String);

pub type InternalResult<T> = Result<T, InternalError>;

pub const UNAUTHORIZED: &str = "Unauthorized.";

/// Failure of a reconciliation or of one of the record endpoints.
///
/// Variants are grouped by tier: input rejections are reported verbatim, authorization
/// rejections carry an opaque message, and operational failures are logged server-side
/// and answered with a generic message.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("invalid identifier: {0}")]
    InvalidIdentifier(&'static str),

    #[error("{list} holds {len} entries, the limit is {max}")]
    BatchLimit {
        list: &'static str,
        len: usize,
        max: usize,
    },

    #[error("malformed request: {0}")]
    Malformed(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("{0} not found")]
    NotFound(&'static str),

    /// The reason is for server logs only; callers always see the same message.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error(transparent)]
    Internal(#[from] InternalError),
}

impl SyncError {
    pub fn status(&self) -> Status {
        match self {
            SyncError::InvalidIdentifier(_)
            | SyncError::BatchLimit { .. }
            | SyncError::Malformed(_) => Status::BadRequest,
            SyncError::PayloadTooLarge => Status::PayloadTooLarge,
            SyncError::NotFound(_) => Status::NotFound,
            SyncError::Unauthorized(_) => Status::Unauthorized,
            SyncError::ServiceUnavailable(_) => Status::ServiceUnavailable,
            SyncError::Internal(_) => Status::InternalServerError,
        }
    }

    /// Message safe to hand back to the caller.
    pub fn public_message(&self) -> String {
        match self {
            SyncError::Unauthorized(_) => UNAUTHORIZED.to_string(),
            SyncError::Internal(_) => "There was an untreated error on the server.".to_string(),
            other => other.to_string(),
        }
    }
}

impl<'r> Responder<'r, 'static> for SyncError {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        let status = self.status();
        match &self {
            SyncError::Internal(e) => error!(uri = %request.uri(), "request failed: {}", e),
            other => warn!(uri = %request.uri(), status = status.code, "request rejected: {}", other),
        }

        Envelope::<()>::failure(status, self.public_message()).respond_to(request)
    }
}
