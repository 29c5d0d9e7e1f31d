use rocket::http::Status;
use rocket::request::Request;
use rocket::response::{self, Responder, Response};
use rocket::serde::json::Json;
use rusqlite::Connection;
use serde::Serialize;

use std::sync::{Arc, Mutex};

pub type DBConnection = Arc<Mutex<Connection>>;

#[derive(Serialize, Debug)]
pub struct EnvelopeBody<T> {
    pub data: Option<T>,
    pub message: String,
    pub error: bool,
}

/// Every response leaves the server as `{ data, message, error }` under an HTTP status.
#[derive(Debug)]
pub struct Envelope<T> {
    pub status: Status,
    pub body: EnvelopeBody<T>,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Envelope<T> {
        Envelope::with_status(Status::Ok, Some(data), String::new())
    }

    pub fn created(data: T) -> Envelope<T> {
        Envelope::with_status(Status::Created, Some(data), String::new())
    }

    pub fn message(status: Status, message: impl Into<String>) -> Envelope<T> {
        Envelope::with_status(status, None, message.into())
    }

    pub fn failure(status: Status, message: impl Into<String>) -> Envelope<T> {
        Envelope {
            status,
            body: EnvelopeBody {
                data: None,
                message: message.into(),
                error: true,
            },
        }
    }

    fn with_status(status: Status, data: Option<T>, message: String) -> Envelope<T> {
        Envelope {
            status,
            body: EnvelopeBody {
                data,
                message,
                error: false,
            },
        }
    }
}

impl<'r, T: Serialize> Responder<'r, 'static> for Envelope<T> {
    fn respond_to(self, request: &'r Request<'_>) -> response::Result<'static> {
        Response::build_from(Json(self.body).respond_to(request)?)
            .status(self.status)
            .ok()
    }
}
