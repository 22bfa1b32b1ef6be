//! Error types for the directory and notification service.
//!
//! This module defines the central `Error` enum shared by every component of
//! the server. It implements `From<Error>` for `tonic::Status` so that handlers
//! can propagate failures with `?` and clients receive a stable status code.
//!
//! ## Error Cases
//! - `InvalidRequest`: Missing or malformed input (empty id, empty name or
//!   email, unrecognized upload fragment, upload policy violation).
//! - `NotFound`: Lookup of a user id that was never created.
//! - `RequestCancelled`: The client aborted the call or its deadline expired.
//! - `ChannelError`: The outbound stream could not accept a message.
//! - `Transport`: The inbound stream failed before the client finished.
//! - `ServiceShutdown`: A call arrived while the service was shutting down.

use tonic::Status;

pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for the userhub service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The client request was invalid.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    /// No user exists with the requested id.
    #[error("User with id {user_id} not found")]
    NotFound { user_id: String },

    /// The client aborted the request or its deadline elapsed.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// Outbound send failure (e.g., the response stream was closed).
    #[error("Channel error: {context}")]
    ChannelError { context: String },

    /// Inbound receive failure on a client stream.
    #[error("Transport error: {context}")]
    Transport { context: String },

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        match err {
            Error::InvalidRequest { reason } => Status::invalid_argument(reason),
            Error::NotFound { user_id } => {
                Status::not_found(format!("user with id {user_id} not found"))
            }
            Error::RequestCancelled => Status::cancelled("Request was cancelled"),
            Error::ChannelError { context } => {
                Status::internal(format!("failed to send notification: {context}"))
            }
            Error::Transport { context } => {
                Status::internal(format!("failed to receive data: {context}"))
            }
            Error::ServiceShutdown => Status::unavailable("Service is shutting down"),
        }
    }
}
