//! Caller identity resolved from request metadata.

use super::error::ServiceError;

/// Metadata key carrying the caller identity.
pub const CONSUMER_KEY: &str = "consumer";

/// Who is calling, and from where.
///
/// Built by the transport from the request metadata (`consumer`) and the
/// peer address of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    consumer: String,
    host: Option<String>,
}

impl Session {
    /// Create a session for a known consumer and peer address.
    pub fn new(consumer: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            consumer: consumer.into(),
            host: Some(host.into()),
        }
    }

    /// Resolve a session from every `consumer` metadata value on the request.
    ///
    /// Exactly one value is required; none or several is an authentication
    /// failure.
    pub fn resolve<I, S>(consumer_values: I, host: Option<String>) -> Result<Self, ServiceError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut values = consumer_values.into_iter();
        let consumer = match (values.next(), values.next()) {
            (Some(consumer), None) => consumer.into(),
            (None, _) => {
                return Err(ServiceError::unauthenticated(
                    "can not find consumer metadata",
                ))
            }
            (Some(_), Some(_)) => {
                return Err(ServiceError::unauthenticated("incorrect consumer metadata"))
            }
        };
        Ok(Self { consumer, host })
    }

    /// The caller identity.
    pub fn consumer(&self) -> &str {
        &self.consumer
    }

    /// The caller network address, if the transport reported one.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    /// The caller network address, or an internal error when unknown.
    pub fn require_host(&self) -> Result<&str, ServiceError> {
        self.host()
            .ok_or_else(|| ServiceError::internal("can not read host"))
    }
}
