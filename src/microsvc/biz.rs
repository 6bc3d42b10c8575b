//! Business operations: `Check`, `Add`, `Test`, or any other named call.

use tracing::{debug, warn};

use super::context::Context;
use super::error::ServiceError;
use super::session::Session;
use super::biz_method;
use crate::bus::Event;

/// Unary business calls. Each authorized call is turned into an event and
/// handed to the drain task; the call does not wait for broadcast or
/// accounting.
#[derive(Clone)]
pub struct BizService {
    context: Context,
}

impl BizService {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Invoke the business method `name` (e.g. `"Add"`).
    pub async fn invoke(&self, session: &Session, name: &str) -> Result<(), ServiceError> {
        let method = biz_method(name);
        self.context.authorize(&method, session)?;

        let Some(host) = session.host() else {
            warn!(consumer = %session.consumer(), %method, "no peer address, call not logged");
            return Ok(());
        };

        debug!(consumer = %session.consumer(), %method, "biz call");
        self.context
            .emit(Event::new(method, session.consumer(), host))
            .await
    }

    pub async fn check(&self, session: &Session) -> Result<(), ServiceError> {
        self.invoke(session, "Check").await
    }

    pub async fn add(&self, session: &Session) -> Result<(), ServiceError> {
        self.invoke(session, "Add").await
    }

    pub async fn test(&self, session: &Session) -> Result<(), ServiceError> {
        self.invoke(session, "Test").await
    }
}
