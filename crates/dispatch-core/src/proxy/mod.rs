//! Proxy state consulted when routing subsequent requests
//!
//! A dialog session owned by a proxy does not go to application code alone:
//! after the application has seen the request it is forwarded to the proxy's
//! final branch (or, for PRACK during forking, to every branch still waiting
//! for one). How a branch actually forwards is the [`BranchForwarder`]'s
//! business.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};

use crate::application::panic_message;
use crate::message::{InboundRequest, RoutedRequest, SipUri};

/// Forwarding contract of a proxy branch
///
/// Implemented by the protocol stack. Both calls run while the dialog
/// session's gate is held, so an implementation must not wait on another
/// request of the same dialog.
#[async_trait]
pub trait BranchForwarder: Send + Sync {
    /// Forward an in-dialog request on the branch selected for subsequent requests
    async fn proxy_subsequent_request(
        &self,
        branch: &ProxyBranch,
        request: &RoutedRequest,
    ) -> anyhow::Result<()>;

    /// Forward a request statelessly within the branch's dialog
    async fn proxy_dialog_stateless(
        &self,
        branch: &ProxyBranch,
        request: &RoutedRequest,
    ) -> anyhow::Result<()>;
}

/// One outbound leg of a proxied request
pub struct ProxyBranch {
    id: String,
    target: SipUri,
    waiting_for_prack: AtomicBool,
    forwarder: Arc<dyn BranchForwarder>,
}

impl ProxyBranch {
    /// Create a branch towards `target`, forwarding through `forwarder`
    pub fn new(target: SipUri, forwarder: Arc<dyn BranchForwarder>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            target,
            waiting_for_prack: AtomicBool::new(false),
            forwarder,
        }
    }

    /// Unique id of the branch
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Address the branch was forked to
    pub fn target(&self) -> &SipUri {
        &self.target
    }

    /// Whether a reliable provisional response went out on this branch and
    /// its PRACK has not been relayed yet
    pub fn is_waiting_for_prack(&self) -> bool {
        self.waiting_for_prack.load(Ordering::SeqCst)
    }

    pub fn set_waiting_for_prack(&self, waiting: bool) {
        self.waiting_for_prack.store(waiting, Ordering::SeqCst);
    }

    /// Forward a subsequent request on this branch
    ///
    /// A panicking forwarder is reported as an error.
    pub async fn proxy_subsequent_request(&self, request: &RoutedRequest) -> anyhow::Result<()> {
        let forwarding = self.forwarder.proxy_subsequent_request(self, request);
        self.contain(AssertUnwindSafe(forwarding).catch_unwind().await)
    }

    /// Forward a request statelessly within this branch's dialog
    ///
    /// A panicking forwarder is reported as an error.
    pub async fn proxy_dialog_stateless(&self, request: &RoutedRequest) -> anyhow::Result<()> {
        let forwarding = self.forwarder.proxy_dialog_stateless(self, request);
        self.contain(AssertUnwindSafe(forwarding).catch_unwind().await)
    }

    fn contain(&self, outcome: std::thread::Result<anyhow::Result<()>>) -> anyhow::Result<()> {
        outcome.unwrap_or_else(|panic| {
            Err(anyhow::anyhow!(
                "forwarder of branch {} panicked: {}",
                self.target,
                panic_message(panic.as_ref())
            ))
        })
    }
}

impl fmt::Debug for ProxyBranch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyBranch")
            .field("id", &self.id)
            .field("target", &self.target.to_string())
            .field("waiting_for_prack", &self.is_waiting_for_prack())
            .finish()
    }
}

/// Proxy owning a dialog session
///
/// Holds the branches of a forked request and, once a final response has
/// been chosen, the branch that carries the rest of the dialog.
#[derive(Debug, Default)]
pub struct Proxy {
    branches: RwLock<Vec<Arc<ProxyBranch>>>,
    final_branch: RwLock<Option<Arc<ProxyBranch>>>,
    ack_received: AtomicBool,
    original_request: Mutex<Option<InboundRequest>>,
}

impl Proxy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_branch(&self, branch: Arc<ProxyBranch>) {
        self.branches.write().push(branch);
    }

    /// Every branch in the order it was added
    pub fn branches(&self) -> Vec<Arc<ProxyBranch>> {
        self.branches.read().clone()
    }

    /// Branch selected by the best final response, if forking has settled
    pub fn final_branch_for_subsequent_requests(&self) -> Option<Arc<ProxyBranch>> {
        self.final_branch.read().clone()
    }

    pub fn set_final_branch(&self, branch: Option<Arc<ProxyBranch>>) {
        *self.final_branch.write() = branch;
    }

    /// Whether the last request forwarded on the final branch was an ACK
    pub fn ack_received(&self) -> bool {
        self.ack_received.load(Ordering::SeqCst)
    }

    pub fn set_ack_received(&self, received: bool) {
        self.ack_received.store(received, Ordering::SeqCst);
    }

    /// The request currently being proxied
    pub fn original_request(&self) -> Option<InboundRequest> {
        self.original_request.lock().clone()
    }

    pub fn set_original_request(&self, request: InboundRequest) {
        *self.original_request.lock() = Some(request);
    }
}
