//! Builder for [`InboundRequest`]
//!
//! Used by stack integrations that already hold parsed header values, and by
//! tests.

use thiserror::Error;

use super::{
    DialogRole, EventHeader, InboundRequest, InvalidUri, Method, NameAddr, PoppedRoute, SipUri,
    SubscriptionState, TransactionId, Transport,
};

/// Error building a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error(transparent)]
    Uri(#[from] InvalidUri),

    #[error("Missing mandatory header: {0}")]
    MissingHeader(&'static str),
}

/// Fluent builder for inbound requests
#[derive(Debug, Clone)]
pub struct RequestBuilder {
    method: Method,
    request_uri: String,
    from: Option<(String, Option<String>)>,
    to: Option<(String, Option<String>)>,
    call_id: Option<String>,
    cseq: u32,
    transport: Transport,
    popped_route: Option<String>,
    dialog_role: Option<DialogRole>,
    subscription_state: Option<SubscriptionState>,
    event: Option<EventHeader>,
    transaction_id: Option<TransactionId>,
}

impl RequestBuilder {
    pub fn new(method: Method, request_uri: &str) -> Self {
        Self {
            method,
            request_uri: request_uri.to_string(),
            from: None,
            to: None,
            call_id: None,
            cseq: 1,
            transport: Transport::Udp,
            popped_route: None,
            dialog_role: None,
            subscription_state: None,
            event: None,
            transaction_id: None,
        }
    }

    pub fn from(mut self, uri: &str, tag: Option<&str>) -> Self {
        self.from = Some((uri.to_string(), tag.map(str::to_string)));
        self
    }

    pub fn to(mut self, uri: &str, tag: Option<&str>) -> Self {
        self.to = Some((uri.to_string(), tag.map(str::to_string)));
        self
    }

    pub fn call_id(mut self, call_id: &str) -> Self {
        self.call_id = Some(call_id.to_string());
        self
    }

    pub fn cseq(mut self, cseq: u32) -> Self {
        self.cseq = cseq;
        self
    }

    pub fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    pub fn popped_route(mut self, uri: &str) -> Self {
        self.popped_route = Some(uri.to_string());
        self
    }

    pub fn dialog_role(mut self, role: DialogRole) -> Self {
        self.dialog_role = Some(role);
        self
    }

    pub fn subscription_state(mut self, state: &str) -> Self {
        self.subscription_state = state.parse().ok();
        self
    }

    pub fn event(mut self, event: &str) -> Self {
        self.event = event.parse().ok();
        self
    }

    pub fn transaction_id(mut self, id: TransactionId) -> Self {
        self.transaction_id = Some(id);
        self
    }

    pub fn build(self) -> Result<InboundRequest, BuildError> {
        let (from_uri, from_tag) = self.from.ok_or(BuildError::MissingHeader("From"))?;
        let (to_uri, to_tag) = self.to.ok_or(BuildError::MissingHeader("To"))?;
        let call_id = self.call_id.ok_or(BuildError::MissingHeader("Call-ID"))?;

        let popped_route = match self.popped_route {
            Some(uri) => Some(PoppedRoute { uri: uri.parse::<SipUri>()? }),
            None => None,
        };

        Ok(InboundRequest {
            method: self.method,
            request_uri: self.request_uri.parse()?,
            from: NameAddr::new(from_uri.parse()?, from_tag),
            to: NameAddr::new(to_uri.parse()?, to_tag),
            call_id,
            cseq: self.cseq,
            transport: self.transport,
            popped_route,
            dialog_role: self.dialog_role,
            subscription_state: self.subscription_state,
            event: self.event,
            transaction_id: self.transaction_id.unwrap_or_else(TransactionId::new),
        })
    }
}
