//! `RequestHandler`'s own error type: the five-way status spec.md §6.5
//! collapses every downstream rejection into (`Succeeded` and `Deactivated`
//! aren't errors — they're `Ok` variants of the handler's return types).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("{0}")]
    BadRequest(String),

    #[error("resource not found")]
    NotFound,

    #[error("{0}")]
    ServerError(String),
}

impl From<anchorid_parser::ParseError> for HandlerError {
    fn from(e: anchorid_parser::ParseError) -> Self {
        HandlerError::BadRequest(e.to_string())
    }
}

impl From<anchorid_core::error::CoreError> for HandlerError {
    fn from(e: anchorid_core::error::CoreError) -> Self {
        HandlerError::BadRequest(e.to_string())
    }
}

impl From<anchorid_resolver::ResolveError> for HandlerError {
    fn from(e: anchorid_resolver::ResolveError) -> Self {
        match e {
            anchorid_resolver::ResolveError::MalformedInitialState(msg) => {
                HandlerError::BadRequest(msg)
            }
            other => HandlerError::ServerError(other.to_string()),
        }
    }
}

impl From<anchorid_state::StateError> for HandlerError {
    fn from(e: anchorid_state::StateError) -> Self {
        HandlerError::ServerError(e.to_string())
    }
}

impl From<anchorid_protocol::ProtocolError> for HandlerError {
    fn from(e: anchorid_protocol::ProtocolError) -> Self {
        HandlerError::ServerError(e.to_string())
    }
}

impl From<anchorid_batchwriter::BatchWriterError> for HandlerError {
    fn from(e: anchorid_batchwriter::BatchWriterError) -> Self {
        match &e {
            anchorid_batchwriter::BatchWriterError::QueueingMultipleOperationsPerDidNotAllowed(_) => {
                HandlerError::BadRequest(e.to_string())
            }
            _ => HandlerError::ServerError(e.to_string()),
        }
    }
}
