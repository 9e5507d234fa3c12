use log::{error, warn};
use mongodb::bson::oid::Error as OidError;
use rocket::{
    http::{Status, StatusClass},
    response::{self, Responder},
    serde::json::Json,
    Request,
};
use serde::Serialize;
use thiserror::Error;

use crate::vote::{error::CastError, store::StoreError};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Cast(#[from] CastError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    OidParse(#[from] OidError),
    #[error("Bad request: {0}")]
    BadRequest(String),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl Error {
    pub fn status(&self) -> Status {
        match self {
            Self::Cast(err) => match err {
                CastError::InvalidVoter(_)
                | CastError::InvalidCandidate { .. }
                | CastError::ElectionNotOpen(_) => Status::BadRequest,
                CastError::AlreadyVoted { .. } => Status::Conflict,
                CastError::LedgerUnavailable { .. } | CastError::Store(_) => {
                    Status::ServiceUnavailable
                }
                CastError::LedgerRejected(_) => Status::BadGateway,
                CastError::ReconciliationRequired { .. } => Status::InternalServerError,
            },
            Self::Store(_) => Status::ServiceUnavailable,
            Self::OidParse(_) | Self::BadRequest(_) => Status::BadRequest,
            Self::NotFound(_) => Status::NotFound,
        }
    }

    pub fn reason(&self) -> &'static str {
        match self {
            Self::Cast(err) => err.reason(),
            Self::Store(_) => "store_unavailable",
            Self::OidParse(_) | Self::BadRequest(_) => "bad_request",
            Self::NotFound(_) => "not_found",
        }
    }
}

/// The JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub reason: &'static str,
    pub message: String,
}

impl<'r, 'o: 'r> Responder<'r, 'o> for Error {
    fn respond_to(self, req: &'r Request<'_>) -> response::Result<'o> {
        let status = self.status();
        match status.class() {
            StatusClass::ServerError => error!("{self}"),
            _ => warn!("{self}"),
        }
        let body = ErrorBody {
            reason: self.reason(),
            message: self.to_string(),
        };
        (status, Json(body)).respond_to(req)
    }
}
