//! Subsequent request dispatcher
//!
//! Entry point the protocol stack calls for every in-dialog request:
//! identity recovery, application and session resolution, CSeq validation,
//! then a [`DispatchTask`] that runs inline or on the application's pool.
//! The task has entered its gate by the time `dispatch` returns, whichever
//! way it runs.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{debug, error};

use super::scheduler::{DispatchScheduler, ExecutionMode};
use super::task::DispatchTask;
use crate::application::{
    ApplicationContext, ApplicationRegistry, ConcurrencyControlMode, SipApplication,
};
use crate::config::DispatcherConfig;
use crate::errors::{DispatchError, DispatchResult};
use crate::message::{InboundRequest, RoutedRequest};
use crate::routing::{
    ListenerSet, RouteDecision, RouteIdentity, RouteIdentityResolver, SessionResolver,
};
use crate::session::SessionStore;
use crate::transport::{ErrorResponder, StatelessSender};

/// How a request left the dispatcher
#[derive(Debug)]
pub enum DispatchOutcome {
    /// Routed on the caller's task; application code has already run
    DispatchedInline,
    /// Submitted to the application's worker pool
    DispatchedPooled(JoinHandle<()>),
    /// Foreign traffic forwarded unmodified
    Relayed,
    /// Orphan ACK discarded
    Dropped,
    /// Out of sequence request absorbed
    SequenceRejected,
}

impl DispatchOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(
            self,
            DispatchOutcome::DispatchedInline | DispatchOutcome::DispatchedPooled(_)
        )
    }

    /// Wait for pooled work to finish; a no-op for every other outcome
    ///
    /// A pooled task that died instead of finishing is logged and reported
    /// as `false`.
    pub async fn completed(self) -> bool {
        match self {
            DispatchOutcome::DispatchedPooled(handle) => match handle.await {
                Ok(()) => true,
                Err(join_error) => {
                    error!("Pooled dispatch task did not finish: {}", join_error);
                    false
                }
            },
            _ => true,
        }
    }
}

pub struct SubsequentRequestDispatcher {
    config: DispatcherConfig,
    registry: Arc<ApplicationRegistry>,
    store: Arc<SessionStore>,
    identities: RouteIdentityResolver,
    sessions: SessionResolver,
    scheduler: DispatchScheduler,
    sender: Arc<dyn StatelessSender>,
    responder: Arc<dyn ErrorResponder>,
}

impl SubsequentRequestDispatcher {
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<ApplicationRegistry>,
        store: Arc<SessionStore>,
        sender: Arc<dyn StatelessSender>,
        responder: Arc<dyn ErrorResponder>,
    ) -> DispatchResult<Self> {
        config.validate().map_err(DispatchError::configuration)?;

        let identities = RouteIdentityResolver::new(
            registry.clone(),
            ListenerSet::new(config.listeners.clone()),
        );
        let sessions = SessionResolver::new(store.clone());
        let scheduler = DispatchScheduler::new(config.bypass_request_executor);

        Ok(Self {
            config,
            registry,
            store,
            identities,
            sessions,
            scheduler,
            sender,
            responder,
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ApplicationRegistry> {
        &self.registry
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Deploy an application with the configured default pool size
    pub fn deploy(
        &self,
        name: impl Into<String>,
        handler: Arc<dyn SipApplication>,
        mode: ConcurrencyControlMode,
    ) -> Arc<ApplicationContext> {
        self.registry.deploy(ApplicationContext::new(
            name,
            handler,
            mode,
            self.config.default_pool_size,
        ))
    }

    /// Route and dispatch an in-dialog request
    ///
    /// Failures returned here happened before any gate was entered. Failures
    /// inside the gate are answered through the [`ErrorResponder`] instead.
    pub async fn dispatch(&self, request: InboundRequest) -> DispatchResult<DispatchOutcome> {
        debug!("Dispatching subsequent request {}", request);

        let identity = match self.identities.resolve(&request)? {
            RouteDecision::Resolved(identity) => identity,
            RouteDecision::RelayStateless => {
                self.sender.send_request(&request).await.map_err(|cause| {
                    DispatchError::transport(
                        format!("cannot relay {} statelessly", request),
                        cause,
                    )
                })?;
                return Ok(DispatchOutcome::Relayed);
            }
            RouteDecision::Drop => return Ok(DispatchOutcome::Dropped),
        };

        let application = self.registry.find(&identity.application_name).ok_or_else(|| {
            DispatchError::application_not_found(not_deployed_message(&identity, &request))
        })?;

        let resolved = self.sessions.resolve(&identity, &application, &request)?;
        debug!(
            "{} resolved to dialog session {} ({:?})",
            request, resolved.key, resolved.polarity
        );

        // Proxies validate sequencing downstream
        if !resolved.session.is_proxied() && !resolved.session.validate_cseq(&request) {
            return Ok(DispatchOutcome::SequenceRejected);
        }

        let task_name = format!("{} {}", request.method, request.call_id);
        let routed = Arc::new(RoutedRequest::new(
            request,
            resolved.application_session,
            resolved.session,
            resolved.key,
        ));
        let mut task = DispatchTask::new(
            routed.clone(),
            application.clone(),
            self.responder.clone(),
            self.config.gate_timeout(),
        );
        task.enter().await?;

        match self.scheduler.execution_mode(&application) {
            ExecutionMode::Inline => {
                task.run_and_handle_errors().await;
                Ok(DispatchOutcome::DispatchedInline)
            }
            ExecutionMode::Pooled => {
                let handle = application
                    .executor_for(routed.request())
                    .spawn(task_name, task.run_and_handle_errors());
                Ok(DispatchOutcome::DispatchedPooled(handle))
            }
        }
    }
}

fn not_deployed_message(identity: &RouteIdentity, request: &InboundRequest) -> String {
    match &request.popped_route {
        Some(route) => format!(
            "no application {} deployed to handle {} with popped route header {}",
            identity.application_name, request, route
        ),
        None => format!(
            "no application {} deployed to handle {}",
            identity.application_name, request
        ),
    }
}
