//! Dialog session
//!
//! Per-dialog state the routing core reads and advances: protocol state,
//! in-flight transactions, event subscriptions, the optional owning proxy and
//! the last remote CSeq. Mutation of the transaction record, subscriptions and
//! protocol state happens only while the dispatching task holds the gate.

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use super::key::{ApplicationSessionKey, SessionKey};
use crate::dispatch::ConcurrencyGate;
use crate::message::{InboundRequest, Method, TransactionId};
use crate::proxy::Proxy;

/// Protocol state of a dialog session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogSessionState {
    Initial,
    Early,
    Confirmed,
    Terminated,
}

/// An event subscription carried by a dialog (RFC 6665)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub event: String,
    pub id: Option<String>,
}

impl Subscription {
    pub fn new(event: impl Into<String>, id: Option<&str>) -> Self {
        Self { event: event.into(), id: id.map(str::to_string) }
    }

    /// Subscription identified by the Event header of a request
    pub fn from_request(request: &InboundRequest) -> Option<Self> {
        request
            .event
            .as_ref()
            .map(|event| Self::new(event.package.clone(), event.id.as_deref()))
    }
}

#[derive(Debug)]
struct DialogSessionInner {
    state: DialogSessionState,
    ongoing_transactions: Vec<TransactionId>,
    subscriptions: HashSet<Subscription>,
    remote_cseq: Option<u32>,
}

#[derive(Debug)]
pub struct DialogSession {
    key: SessionKey,
    application_session_key: ApplicationSessionKey,
    inner: Mutex<DialogSessionInner>,
    proxy: RwLock<Option<Arc<Proxy>>>,
    gate: ConcurrencyGate,
}

impl DialogSession {
    pub fn new(key: SessionKey, application_session_key: ApplicationSessionKey) -> Self {
        let gate = ConcurrencyGate::new(key.to_string());
        Self {
            key,
            application_session_key,
            inner: Mutex::new(DialogSessionInner {
                state: DialogSessionState::Initial,
                ongoing_transactions: Vec::new(),
                subscriptions: HashSet::new(),
                remote_cseq: None,
            }),
            proxy: RwLock::new(None),
            gate,
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn application_session_key(&self) -> &ApplicationSessionKey {
        &self.application_session_key
    }

    pub fn state(&self) -> DialogSessionState {
        self.inner.lock().state
    }

    pub fn set_state(&self, state: DialogSessionState) {
        self.inner.lock().state = state;
    }

    /// Advance protocol state on receipt of an in-dialog request
    ///
    /// Must complete before application code observes the request.
    pub fn update_state_on_subsequent_request(&self, request: &InboundRequest) {
        let mut inner = self.inner.lock();
        let next = match (&request.method, inner.state) {
            (_, DialogSessionState::Terminated) => return,
            (Method::Bye, _) => DialogSessionState::Terminated,
            (Method::Cancel, DialogSessionState::Initial | DialogSessionState::Early) => {
                DialogSessionState::Terminated
            }
            _ => return,
        };
        debug!(
            "Session {} moving from {:?} to {:?} on {}",
            self.key, inner.state, next, request.method
        );
        inner.state = next;
    }

    /// Record the CSeq of the request that established the dialog
    pub fn record_remote_cseq(&self, cseq: u32) {
        self.inner.lock().remote_cseq = Some(cseq);
    }

    pub fn remote_cseq(&self) -> Option<u32> {
        self.inner.lock().remote_cseq
    }

    /// Check an in-dialog request against the last remote CSeq
    ///
    /// ACK and CANCEL reuse the CSeq of the request they refer to, so they are
    /// valid as long as they do not run ahead and never advance the counter.
    /// Every other method must be strictly greater and advances it.
    pub fn validate_cseq(&self, request: &InboundRequest) -> bool {
        let mut inner = self.inner.lock();
        let incoming = request.cseq;
        let reuses_cseq = matches!(request.method, Method::Ack | Method::Cancel);

        let valid = match inner.remote_cseq {
            None => {
                if !reuses_cseq {
                    inner.remote_cseq = Some(incoming);
                }
                true
            }
            Some(last) if reuses_cseq => incoming <= last,
            Some(last) if incoming > last => {
                inner.remote_cseq = Some(incoming);
                true
            }
            Some(_) => false,
        };

        if !valid {
            warn!(
                "Out of sequence {} with CSeq {} on session {} (last seen {:?}), absorbing it",
                request.method, incoming, self.key, inner.remote_cseq
            );
        }
        valid
    }

    /// Append a transaction to the ordered in-flight record, once
    pub fn add_ongoing_transaction(&self, transaction: TransactionId) -> bool {
        let mut inner = self.inner.lock();
        if inner.ongoing_transactions.contains(&transaction) {
            return false;
        }
        inner.ongoing_transactions.push(transaction);
        true
    }

    /// Called by the stack when a transaction terminates
    pub fn remove_ongoing_transaction(&self, transaction: &TransactionId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.ongoing_transactions.len();
        inner.ongoing_transactions.retain(|t| t != transaction);
        inner.ongoing_transactions.len() != before
    }

    pub fn ongoing_transactions(&self) -> Vec<TransactionId> {
        self.inner.lock().ongoing_transactions.clone()
    }

    /// Register the subscription named by the request's Event header
    ///
    /// Returns false when an equivalent subscription already exists or the
    /// request carries no Event header.
    pub fn add_subscription(&self, request: &InboundRequest) -> bool {
        match Subscription::from_request(request) {
            Some(subscription) => {
                debug!("Adding subscription {:?} to session {}", subscription, self.key);
                self.inner.lock().subscriptions.insert(subscription)
            }
            None => {
                debug!("{} without Event header, no subscription recorded", request.method);
                false
            }
        }
    }

    /// Remove the subscription named by the request's Event header
    pub fn remove_subscription(&self, request: &InboundRequest) -> bool {
        match Subscription::from_request(request) {
            Some(subscription) => {
                debug!("Removing subscription {:?} from session {}", subscription, self.key);
                self.inner.lock().subscriptions.remove(&subscription)
            }
            None => false,
        }
    }

    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.inner.lock().subscriptions.iter().cloned().collect()
    }

    pub fn has_subscription(&self, subscription: &Subscription) -> bool {
        self.inner.lock().subscriptions.contains(subscription)
    }

    pub fn proxy(&self) -> Option<Arc<Proxy>> {
        self.proxy.read().clone()
    }

    pub fn set_proxy(&self, proxy: Option<Arc<Proxy>>) {
        *self.proxy.write() = proxy;
    }

    pub fn is_proxied(&self) -> bool {
        self.proxy.read().is_some()
    }

    /// Gate used by session scoped concurrency control
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::RequestBuilder;

    fn session() -> DialogSession {
        let key = SessionKey {
            local_address: "sip:alice@example.com".to_string(),
            local_tag: Some("a".to_string()),
            remote_address: "sip:bob@example.com".to_string(),
            call_id: "call-1".to_string(),
            application_name: "app".to_string(),
            application_session_id: "call-1".to_string(),
        };
        DialogSession::new(key, ApplicationSessionKey::new("app", "call-1").unwrap())
    }

    fn request(method: Method, cseq: u32) -> InboundRequest {
        RequestBuilder::new(method, "sip:bob@example.com")
            .from("sip:alice@example.com", Some("a"))
            .to("sip:bob@example.com", Some("b"))
            .call_id("call-1")
            .cseq(cseq)
            .event("presence;id=7")
            .build()
            .unwrap()
    }

    #[test]
    fn test_cseq_must_increase() {
        let session = session();
        session.record_remote_cseq(1);
        assert!(session.validate_cseq(&request(Method::Info, 2)));
        assert!(!session.validate_cseq(&request(Method::Info, 2)));
        assert!(!session.validate_cseq(&request(Method::Update, 1)));
        assert_eq!(session.remote_cseq(), Some(2));
    }

    #[test]
    fn test_ack_and_cancel_reuse_cseq() {
        let session = session();
        session.record_remote_cseq(5);
        assert!(session.validate_cseq(&request(Method::Ack, 5)));
        assert!(session.validate_cseq(&request(Method::Cancel, 5)));
        assert!(!session.validate_cseq(&request(Method::Ack, 6)));
        assert_eq!(session.remote_cseq(), Some(5));
    }

    #[test]
    fn test_first_request_is_accepted() {
        let session = session();
        assert!(session.validate_cseq(&request(Method::Info, 42)));
        assert_eq!(session.remote_cseq(), Some(42));
    }

    #[test]
    fn test_state_advances_on_bye() {
        let session = session();
        session.set_state(DialogSessionState::Confirmed);
        session.update_state_on_subsequent_request(&request(Method::Info, 2));
        assert_eq!(session.state(), DialogSessionState::Confirmed);
        session.update_state_on_subsequent_request(&request(Method::Bye, 3));
        assert_eq!(session.state(), DialogSessionState::Terminated);
    }

    #[test]
    fn test_cancel_only_terminates_early_sessions() {
        let early = session();
        early.set_state(DialogSessionState::Early);
        early.update_state_on_subsequent_request(&request(Method::Cancel, 1));
        assert_eq!(early.state(), DialogSessionState::Terminated);

        let confirmed = session();
        confirmed.set_state(DialogSessionState::Confirmed);
        confirmed.update_state_on_subsequent_request(&request(Method::Cancel, 1));
        assert_eq!(confirmed.state(), DialogSessionState::Confirmed);
    }

    #[test]
    fn test_ongoing_transactions_are_ordered_and_unique() {
        let session = session();
        let first = TransactionId::new();
        let second = TransactionId::new();
        assert!(session.add_ongoing_transaction(first.clone()));
        assert!(session.add_ongoing_transaction(second.clone()));
        assert!(!session.add_ongoing_transaction(first.clone()));
        assert_eq!(session.ongoing_transactions(), vec![first.clone(), second.clone()]);

        assert!(session.remove_ongoing_transaction(&first));
        assert_eq!(session.ongoing_transactions(), vec![second]);
    }

    #[test]
    fn test_subscriptions_are_deduplicated() {
        let session = session();
        let notify = request(Method::Notify, 2);
        assert!(session.add_subscription(&notify));
        assert!(!session.add_subscription(&notify));
        assert_eq!(session.subscriptions().len(), 1);
        assert!(session.has_subscription(&Subscription::new("presence", Some("7"))));

        assert!(session.remove_subscription(&notify));
        assert!(!session.remove_subscription(&notify));
    }
}
