//! Dispatch task
//!
//! One task carries one routed request through the concurrency gate:
//!
//! ```text
//! Created --enter--> GateEntered --route--> Routed --exit--> GateExited
//! ```
//!
//! The exit step always runs, whatever routing did, so the gate is released
//! and terminated subscriptions are removed even when the application fails.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, warn};

use super::gate::GateGuard;
use crate::application::ApplicationContext;
use crate::errors::{DispatchError, DispatchResult};
use crate::message::{Method, RoutedRequest, SubscriptionState};
use crate::proxy::Proxy;
use crate::transport::ErrorResponder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Created,
    GateEntered,
    Routed,
    GateExited,
}

pub struct DispatchTask {
    request: Arc<RoutedRequest>,
    application: Arc<ApplicationContext>,
    responder: Arc<dyn ErrorResponder>,
    gate_timeout: Option<Duration>,
    state: TaskState,
    guard: Option<GateGuard>,
}

impl DispatchTask {
    pub fn new(
        request: Arc<RoutedRequest>,
        application: Arc<ApplicationContext>,
        responder: Arc<dyn ErrorResponder>,
        gate_timeout: Option<Duration>,
    ) -> Self {
        Self {
            request,
            application,
            responder,
            gate_timeout,
            state: TaskState::Created,
            guard: None,
        }
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn request(&self) -> &Arc<RoutedRequest> {
        &self.request
    }

    /// Enter the application's gate for the session and advance session state
    pub async fn enter(&mut self) -> DispatchResult<()> {
        if self.state != TaskState::Created {
            return Ok(());
        }

        if let Some(gate) = self.application.gate_for(&self.request) {
            let guard = gate.enter(self.gate_timeout).await.map_err(|_| {
                DispatchError::GateTimeout {
                    session: gate.label().to_string(),
                    timeout: self.gate_timeout.unwrap_or_default(),
                }
            })?;
            debug!("Entered gate {} for {}", guard.label(), self.request.request());
            self.guard = Some(guard);
        }

        let request = self.request.request();
        let session = self.request.session();
        session.add_ongoing_transaction(request.transaction_id.clone());
        session.update_state_on_subsequent_request(request);

        self.state = TaskState::GateEntered;
        Ok(())
    }

    /// Route the request and leave the gate
    pub async fn run(mut self) -> DispatchResult<()> {
        self.enter().await?;
        let routed = self.route().await;
        self.state = TaskState::Routed;
        self.exit();
        routed
    }

    /// Run the task and answer the peer with an error response on failure
    pub async fn run_and_handle_errors(self) {
        let request = self.request.clone();
        let responder = self.responder.clone();

        if let Err(error) = self.run().await {
            error!("Failed to dispatch {}: {}", request.request(), error);
            let reason = error.to_string();
            if let Err(response_error) = responder
                .send_error_response(request.request(), error.status_code(), &reason)
                .await
            {
                error!(
                    "Could not send the {} error response for {}: {:#}",
                    error.status_code(),
                    request.request(),
                    response_error
                );
            }
        }
    }

    async fn route(&self) -> DispatchResult<()> {
        let request = self.request.request();
        let session = self.request.session();

        if request.is_notify()
            && request
                .subscription_state
                .as_ref()
                .is_some_and(SubscriptionState::is_active_or_pending)
        {
            session.add_subscription(request);
        }

        match session.proxy() {
            Some(proxy) => self.route_to_proxy(&proxy).await,
            None => {
                debug!("Dispatching {} to application {}", request, self.application.name());
                self.invoke_application().await
            }
        }
    }

    async fn route_to_proxy(&self, proxy: &Proxy) -> DispatchResult<()> {
        let request = self.request.request();

        if let Some(final_branch) = proxy.final_branch_for_subsequent_requests() {
            proxy.set_ack_received(request.is_ack());
            proxy.set_original_request(request.clone());
            self.invoke_application().await?;
            final_branch
                .proxy_subsequent_request(&self.request)
                .await
                .map_err(|cause| {
                    DispatchError::application_failure(
                        format!(
                            "branch {} failed to proxy the subsequent request {}",
                            final_branch.target(),
                            request
                        ),
                        cause,
                    )
                })?;
        } else if request.method == Method::Prack {
            self.invoke_application().await?;
            for branch in proxy.branches() {
                if !branch.is_waiting_for_prack() {
                    continue;
                }
                branch.proxy_dialog_stateless(&self.request).await.map_err(|cause| {
                    DispatchError::application_failure(
                        format!("branch {} failed to proxy {} statelessly", branch.target(), request),
                        cause,
                    )
                })?;
                branch.set_waiting_for_prack(false);
            }
        } else {
            warn!(
                "Final branch is null, this will probably result in a lost call or request. Here is the request:\n{}",
                request
            );
            debug!("Proxy state for the lost request: {:?}", proxy);
        }
        Ok(())
    }

    async fn invoke_application(&self) -> DispatchResult<()> {
        self.application.invoke(&self.request).await.map_err(|cause| {
            DispatchError::application_failure(
                format!(
                    "unexpected failure in application {} while routing {}",
                    self.application.name(),
                    self.request.request()
                ),
                cause,
            )
        })
    }

    fn exit(&mut self) {
        let request = self.request.request();
        if request.is_notify()
            && request.subscription_state == Some(SubscriptionState::Terminated)
        {
            self.request.session().remove_subscription(request);
        }

        if let Some(guard) = self.guard.take() {
            debug!("Leaving gate {} for {}", guard.label(), request);
        }
        self.state = TaskState::GateExited;
    }
}
