//! Collaborators provided by the protocol stack integration

use async_trait::async_trait;

use crate::errors::TransportError;
use crate::message::InboundRequest;

/// Sends requests without creating transaction state
#[async_trait]
pub trait StatelessSender: Send + Sync {
    /// Forward `request` unmodified to its request-URI
    async fn send_request(&self, request: &InboundRequest) -> Result<(), TransportError>;
}

/// Answers requests that failed after dispatch started
#[async_trait]
pub trait ErrorResponder: Send + Sync {
    async fn send_error_response(
        &self,
        request: &InboundRequest,
        status_code: u16,
        reason: &str,
    ) -> anyhow::Result<()>;
}
