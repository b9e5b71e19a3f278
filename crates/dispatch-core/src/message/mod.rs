//! Typed view of inbound in-dialog requests
//!
//! The protocol stack resolves a raw SIP request into an [`InboundRequest`]
//! once, at the boundary. Everything the routing core needs (From/To with
//! tags, Call-ID, CSeq, Subscription-State, the popped route and the dialog
//! side) is carried as a strongly typed field so it is never re-derived.

pub mod builder;
pub mod parser;
pub mod uri;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{ApplicationSession, DialogSession, SessionKey};

pub use builder::{BuildError, RequestBuilder};
pub use uri::{InvalidUri, SipUri};

/// Failure to parse a header value
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid {header} value '{input}': unexpected input at offset {offset}")]
pub struct InvalidHeaderValue {
    pub header: &'static str,
    pub input: String,
    pub offset: usize,
}

impl InvalidHeaderValue {
    fn parse<'a, O>(
        header: &'static str,
        input: &'a str,
        value: impl FnMut(&'a [u8]) -> parser::ParseResult<'a, O>,
    ) -> Result<O, Self> {
        parser::parse_all(input, value).map_err(|offset| Self {
            header,
            input: input.to_string(),
            offset,
        })
    }
}

/// SIP request method
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Invite,
    Ack,
    Bye,
    Cancel,
    Prack,
    Notify,
    Subscribe,
    Info,
    Update,
    Refer,
    Message,
    Options,
    Publish,
    Register,
    Extension(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Method::Invite => "INVITE",
            Method::Ack => "ACK",
            Method::Bye => "BYE",
            Method::Cancel => "CANCEL",
            Method::Prack => "PRACK",
            Method::Notify => "NOTIFY",
            Method::Subscribe => "SUBSCRIBE",
            Method::Info => "INFO",
            Method::Update => "UPDATE",
            Method::Refer => "REFER",
            Method::Message => "MESSAGE",
            Method::Options => "OPTIONS",
            Method::Publish => "PUBLISH",
            Method::Register => "REGISTER",
            Method::Extension(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = InvalidHeaderValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvalidHeaderValue::parse("method", s, parser::method)
    }
}

/// Transport protocol a request arrived on or a listener is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Udp,
    Tcp,
    Tls,
    Sctp,
    Ws,
    Wss,
}

impl Transport {
    /// Parse a transport token such as a `transport=` URI parameter or Via transport
    pub fn from_token(token: &str) -> Option<Self> {
        match token.to_ascii_lowercase().as_str() {
            "udp" => Some(Transport::Udp),
            "tcp" => Some(Transport::Tcp),
            "tls" => Some(Transport::Tls),
            "sctp" => Some(Transport::Sctp),
            "ws" => Some(Transport::Ws),
            "wss" => Some(Transport::Wss),
            _ => None,
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Transport::Tls | Transport::Wss => 5061,
            _ => 5060,
        }
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Transport::Udp => "UDP",
            Transport::Tcp => "TCP",
            Transport::Tls => "TLS",
            Transport::Sctp => "SCTP",
            Transport::Ws => "WS",
            Transport::Wss => "WSS",
        };
        f.write_str(name)
    }
}

/// From or To header value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameAddr {
    pub uri: SipUri,
    pub tag: Option<String>,
}

impl NameAddr {
    pub fn new(uri: SipUri, tag: Option<String>) -> Self {
        Self { uri, tag }
    }
}

/// Subscription-State header value (RFC 6665)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubscriptionState {
    Active,
    Pending,
    Terminated,
    Extension(String),
}

impl SubscriptionState {
    /// Whether a NOTIFY carrying this state creates a subscription
    pub fn is_active_or_pending(&self) -> bool {
        matches!(self, SubscriptionState::Active | SubscriptionState::Pending)
    }
}

impl FromStr for SubscriptionState {
    type Err = InvalidHeaderValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvalidHeaderValue::parse("Subscription-State", s, parser::subscription_state)
    }
}

/// Event header value: package name plus optional `id` parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventHeader {
    pub package: String,
    pub id: Option<String>,
}

impl FromStr for EventHeader {
    type Err = InvalidHeaderValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InvalidHeaderValue::parse("Event", s, parser::event)
    }
}

/// The route entry naming this container, removed before routing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoppedRoute {
    pub uri: SipUri,
}

impl fmt::Display for PoppedRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.uri)
    }
}

/// Side of the dialog the stack holds for this request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogRole {
    /// The container sent the dialog-creating request
    Client,
    /// The container received the dialog-creating request
    Server,
}

/// Identity of the server transaction carrying a request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TransactionId(pub String);

impl TransactionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An inbound in-dialog request, resolved once at the stack boundary
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub method: Method,
    pub request_uri: SipUri,
    pub from: NameAddr,
    pub to: NameAddr,
    pub call_id: String,
    pub cseq: u32,
    /// Transport from the top Via
    pub transport: Transport,
    pub popped_route: Option<PoppedRoute>,
    pub dialog_role: Option<DialogRole>,
    pub subscription_state: Option<SubscriptionState>,
    pub event: Option<EventHeader>,
    pub transaction_id: TransactionId,
}

impl InboundRequest {
    pub fn is_ack(&self) -> bool {
        self.method == Method::Ack
    }

    pub fn is_notify(&self) -> bool {
        self.method == Method::Notify
    }
}

impl fmt::Display for InboundRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (Call-ID: {}, CSeq: {} {})",
            self.method, self.request_uri, self.call_id, self.cseq, self.method
        )
    }
}

/// A request together with the sessions it was routed to
///
/// This is what application code and proxy branches receive: the resolved
/// sessions and the key the dialog session was found under travel with the
/// request.
#[derive(Debug)]
pub struct RoutedRequest {
    request: InboundRequest,
    application_session: Arc<ApplicationSession>,
    session: Arc<DialogSession>,
    session_key: SessionKey,
}

impl RoutedRequest {
    pub fn new(
        request: InboundRequest,
        application_session: Arc<ApplicationSession>,
        session: Arc<DialogSession>,
        session_key: SessionKey,
    ) -> Self {
        Self { request, application_session, session, session_key }
    }

    pub fn request(&self) -> &InboundRequest {
        &self.request
    }

    pub fn method(&self) -> &Method {
        &self.request.method
    }

    pub fn application_session(&self) -> &Arc<ApplicationSession> {
        &self.application_session
    }

    pub fn session(&self) -> &Arc<DialogSession> {
        &self.session
    }

    pub fn session_key(&self) -> &SessionKey {
        &self.session_key
    }
}
