//! Session resolution for subsequent requests
//!
//! Turns a recovered [`RouteIdentity`] into the concrete application session
//! and dialog session a request belongs to. Nothing is created here: a miss
//! after every fallback means the session expired or was invalidated.

use std::sync::Arc;

use tracing::debug;

use super::identity::RouteIdentity;
use crate::application::{ApplicationContext, CorrelationKind};
use crate::errors::{DispatchError, DispatchResult};
use crate::message::InboundRequest;
use crate::session::{
    dialog_session_key, ApplicationSession, ApplicationSessionKey, DialogSession, Polarity,
    SessionKey, SessionStore,
};

/// Correlations consulted, in order, when the primary application session key misses
const CORRELATION_FALLBACKS: [CorrelationKind; 2] = [CorrelationKind::Join, CorrelationKind::Replaces];

/// Sessions a request was resolved to
#[derive(Debug, Clone)]
pub struct ResolvedSession {
    pub application_session: Arc<ApplicationSession>,
    pub session: Arc<DialogSession>,
    pub key: SessionKey,
    /// Polarity the dialog session was found under
    pub polarity: Polarity,
}

pub struct SessionResolver {
    store: Arc<SessionStore>,
}

impl SessionResolver {
    pub fn new(store: Arc<SessionStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Resolve both sessions of `request`
    pub fn resolve(
        &self,
        identity: &RouteIdentity,
        application: &ApplicationContext,
        request: &InboundRequest,
    ) -> DispatchResult<ResolvedSession> {
        let application_session = self.resolve_application_session(identity, application)?;
        let (session, key, polarity) =
            self.resolve_dialog_session(&application_session, identity, request)?;
        Ok(ResolvedSession { application_session, session, key, polarity })
    }

    /// Primary key lookup, then the application's JOIN and REPLACES correlations
    pub fn resolve_application_session(
        &self,
        identity: &RouteIdentity,
        application: &ApplicationContext,
    ) -> DispatchResult<Arc<ApplicationSession>> {
        let key =
            ApplicationSessionKey::new(&identity.application_name, &identity.application_id)?;
        debug!("Trying to find the application session with key {}", key);

        if let Some(session) = self.store.find_application_session(&key) {
            return Ok(session);
        }
        self.store.dump_application_sessions();

        for kind in CORRELATION_FALLBACKS {
            let Some(correlated) = application.correlate(&key, kind) else {
                continue;
            };
            debug!("{} correlation maps {} to {}", kind, key, correlated);
            if let Some(session) = self.store.find_application_session(&correlated) {
                return Ok(session);
            }
        }

        Err(DispatchError::session_not_found(format!(
            "cannot find the corresponding application session to this subsequent request {}, \
             it may already have expired or been invalidated",
            key
        )))
    }

    /// Look the dialog session up under the determined polarity, then the opposite one
    pub fn resolve_dialog_session(
        &self,
        application_session: &ApplicationSession,
        identity: &RouteIdentity,
        request: &InboundRequest,
    ) -> DispatchResult<(Arc<DialogSession>, SessionKey, Polarity)> {
        let mut last_key = None;
        for polarity in Polarity::from_dialog_role(request.dialog_role).attempts() {
            let key = dialog_session_key(
                application_session.id(),
                &identity.application_name,
                request,
                polarity,
            )?;
            debug!("Trying to find the dialog session with key {} ({:?})", key, polarity);
            if let Some(session) = self.store.find_dialog_session(&key) {
                return Ok((session, key, polarity));
            }
            last_key = Some(key);
        }

        self.store.dump_dialog_sessions();
        Err(DispatchError::session_not_found(format!(
            "dialog session {} not found for subsequent request {}, \
             it may already have expired or been invalidated",
            last_key.map(|key| key.to_string()).unwrap_or_default(),
            request
        )))
    }
}
