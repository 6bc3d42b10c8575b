//! Error type for service operations.

use std::fmt;

use thiserror::Error;

use crate::bus::BusError;

/// Failure category of a service operation.
///
/// Each kind maps to its own status at the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Missing or ambiguous caller identity.
    Unauthenticated,
    /// The access policy denies the method for this caller.
    PermissionDenied,
    /// The request itself is unusable (e.g. a zero statistics interval).
    InvalidArgument,
    /// The service could not set up the call (e.g. subscriber id collision).
    Internal,
    /// The service is shutting down.
    Unavailable,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::PermissionDenied => "permission denied",
            ErrorKind::InvalidArgument => "invalid argument",
            ErrorKind::Internal => "internal error",
            ErrorKind::Unavailable => "unavailable",
        };
        f.write_str(name)
    }
}

/// A failed service operation: what kind of failure, and a message for the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind}: {message}")]
pub struct ServiceError {
    kind: ErrorKind,
    message: String,
}

impl ServiceError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthenticated, message)
    }

    pub fn permission_denied(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PermissionDenied, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<BusError> for ServiceError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::DuplicateSubscriber(_) => {
                ServiceError::internal("can not add consumer channel to pool")
            }
            BusError::Closed => ServiceError::unavailable("service is shutting down"),
        }
    }
}

#[cfg(feature = "grpc")]
impl From<ServiceError> for tonic::Status {
    fn from(err: ServiceError) -> Self {
        let code = match err.kind {
            ErrorKind::Unauthenticated => tonic::Code::Unauthenticated,
            ErrorKind::PermissionDenied => tonic::Code::PermissionDenied,
            ErrorKind::InvalidArgument => tonic::Code::InvalidArgument,
            ErrorKind::Internal => tonic::Code::Internal,
            ErrorKind::Unavailable => tonic::Code::Unavailable,
        };
        tonic::Status::new(code, err.message)
    }
}
