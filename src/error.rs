use mongodb::error::Error as DbError;
use rocket::{
    http::{Status, StatusClass},
    response::Responder,
    serde::json::serde_json::Error as JsonError,
};
use std::io::Error as IoError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Db(#[from] DbError),
    #[error("Malformed fixtures: {0}")]
    Json(#[from] JsonError),
    #[error(transparent)]
    Io(#[from] IoError),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    Duplicate(String),
    #[error("{1}")]
    Status(Status, String),
}

impl Error {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// The HTTP status this error is reported as.
    pub fn status(&self) -> Status {
        match self {
            Self::NotFound(_) => Status::NotFound,
            Self::Duplicate(_) => Status::Conflict,
            Self::Status(status, _) => *status,
            Self::Db(_) | Self::Json(_) | Self::Io(_) => Status::InternalServerError,
        }
    }
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, _: &'r rocket::Request<'_>) -> rocket::response::Result<'o> {
        let status = self.status();
        if matches!(status.class(), StatusClass::ServerError) {
            error!("{self}");
        } else {
            debug!("{self}");
        }
        Err(status)
    }
}
