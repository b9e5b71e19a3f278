//! Routing identity recovery
//!
//! Works out which deployed application owns a subsequent request. The popped
//! route token is the primary source, the To-tag the fallback. A request that
//! yields neither is relayed when it targets somebody else, dropped when it is
//! an orphan ACK and rejected otherwise.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use super::hashes::{ApplicationNameHashes, ApplicationRoutingTag};
use super::listeners::ListenerSet;
use crate::application::ApplicationRegistry;
use crate::errors::{DispatchError, DispatchResult};
use crate::message::{InboundRequest, SipUri};

/// Route parameter carrying the hashed application name
pub const ROUTE_PARAM_APPLICATION_NAME: &str = "appname";
/// Route parameter carrying the application id
pub const ROUTE_PARAM_APPLICATION_ID: &str = "app_id";

/// Application that owns a request, and its application session id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteIdentity {
    pub application_name: String,
    pub application_id: String,
}

impl RouteIdentity {
    pub fn new(application_name: impl Into<String>, application_id: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            application_id: application_id.into(),
        }
    }

    /// Address to record-route through so that subsequent requests carry this identity
    pub fn encode_route(&self, uri: SipUri) -> SipUri {
        uri.with_param(
            ROUTE_PARAM_APPLICATION_NAME,
            Some(&ApplicationNameHashes::hash(&self.application_name)),
        )
        .with_param(ROUTE_PARAM_APPLICATION_ID, Some(&self.application_id))
    }
}

impl fmt::Display for RouteIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.application_name, self.application_id)
    }
}

/// What to do with a request after identity recovery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteDecision {
    /// Dispatch to this application and application session
    Resolved(RouteIdentity),
    /// Foreign traffic, forward it unmodified
    RelayStateless,
    /// Orphan ACK to an error response, discard it
    Drop,
}

pub struct RouteIdentityResolver {
    registry: Arc<ApplicationRegistry>,
    listeners: ListenerSet,
}

impl RouteIdentityResolver {
    pub fn new(registry: Arc<ApplicationRegistry>, listeners: ListenerSet) -> Self {
        Self { registry, listeners }
    }

    pub fn resolve(&self, request: &InboundRequest) -> DispatchResult<RouteDecision> {
        let mut application_name: Option<String> = None;
        let mut application_id: Option<String> = None;

        if let Some(route) = &request.popped_route {
            if let Some(hash) = route.uri.param(ROUTE_PARAM_APPLICATION_NAME) {
                if !hash.is_empty() {
                    application_name = self.registry.application_name_from_hash(hash);
                    application_id = route
                        .uri
                        .param(ROUTE_PARAM_APPLICATION_ID)
                        .filter(|id| !id.is_empty())
                        .map(str::to_string);
                    debug!(
                        "Popped route {} carries application {:?} id {:?}",
                        route, application_name, application_id
                    );
                }
            }
        }

        if application_id.is_none() {
            let decoded =
                ApplicationRoutingTag::decode(request.to.tag.as_deref(), self.registry.hashes())?;
            application_name = decoded.as_ref().map(|identity| identity.application_name.clone());
            application_id = decoded.map(|identity| identity.application_id);
            if let (Some(name), Some(id)) = (&application_name, &application_id) {
                debug!("To tag of {} carries application {} id {}", request.call_id, name, id);
            }
        }

        match (application_name, application_id) {
            (Some(application_name), Some(application_id)) => {
                return Ok(RouteDecision::Resolved(RouteIdentity {
                    application_name,
                    application_id,
                }));
            }
            // A route token naming an application we no longer know is never foreign traffic
            (None, Some(_)) => return Err(Self::not_found(request)),
            _ => {}
        }

        let transport = request.request_uri.transport().unwrap_or(request.transport);
        let port = request.request_uri.effective_port(transport);
        if self
            .listeners
            .is_external(&request.request_uri.host, port, transport)
        {
            debug!(
                "{} targets {}:{}/{} which is not ours, relaying statelessly",
                request, request.request_uri.host, port, transport
            );
            return Ok(RouteDecision::RelayStateless);
        }

        if request.is_ack() {
            debug!("Dropping ACK to an error response: {}", request);
            return Ok(RouteDecision::Drop);
        }

        Err(Self::not_found(request))
    }

    fn not_found(request: &InboundRequest) -> DispatchError {
        DispatchError::application_not_found(match &request.popped_route {
            Some(route) => format!(
                "cannot find the application to handle {} with popped route header {}",
                request, route
            ),
            None => format!("cannot find the application to handle {}", request),
        })
    }
}
