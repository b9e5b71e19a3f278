//! Shared fixtures for the dispatcher integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Barrier;
use tracing::Level;

use rvoip_dispatch_core::logging::{setup_logging, LoggingConfig};
use rvoip_dispatch_core::prelude::*;
use rvoip_dispatch_core::routing::ApplicationNameHashes;
use rvoip_dispatch_core::session::dialog_session_key;

pub const LOCAL_HOST: &str = "10.0.0.1";
pub const LOCAL_PORT: u16 = 5060;

/// Install a debug subscriber once per test binary
pub fn init_tracing() {
    let _ = setup_logging(&LoggingConfig::new(Level::DEBUG));
}

/// Stateless sender that records what it relays
#[derive(Default)]
pub struct RecordingSender {
    pub sent: Mutex<Vec<InboundRequest>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl StatelessSender for RecordingSender {
    async fn send_request(&self, request: &InboundRequest) -> Result<(), TransportError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(TransportError::send_failed("network unreachable"));
        }
        self.sent.lock().push(request.clone());
        Ok(())
    }
}

/// Error responder that records the responses it was asked to send
#[derive(Default)]
pub struct RecordingResponder {
    pub responses: Mutex<Vec<(u16, String)>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl ErrorResponder for RecordingResponder {
    async fn send_error_response(
        &self,
        _request: &InboundRequest,
        status_code: u16,
        reason: &str,
    ) -> anyhow::Result<()> {
        self.responses.lock().push((status_code, reason.to_string()));
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("transaction already terminated");
        }
        Ok(())
    }
}

impl RecordingResponder {
    pub fn status_codes(&self) -> Vec<u16> {
        self.responses.lock().iter().map(|(code, _)| *code).collect()
    }
}

/// Branch forwarder that records which branch forwarded what
#[derive(Default)]
pub struct RecordingForwarder {
    pub subsequent: Mutex<Vec<(String, Method)>>,
    pub stateless: Mutex<Vec<(String, Method)>>,
}

#[async_trait]
impl BranchForwarder for RecordingForwarder {
    async fn proxy_subsequent_request(
        &self,
        branch: &ProxyBranch,
        request: &RoutedRequest,
    ) -> anyhow::Result<()> {
        self.subsequent
            .lock()
            .push((branch.id().to_string(), request.method().clone()));
        Ok(())
    }

    async fn proxy_dialog_stateless(
        &self,
        branch: &ProxyBranch,
        request: &RoutedRequest,
    ) -> anyhow::Result<()> {
        self.stateless
            .lock()
            .push((branch.id().to_string(), request.method().clone()));
        Ok(())
    }
}

/// What the application saw
#[derive(Debug, Clone)]
pub struct Invocation {
    pub method: Method,
    pub cseq: u32,
    pub application_session: Arc<ApplicationSession>,
    pub session: Arc<DialogSession>,
}

/// Configurable application handler
#[derive(Default)]
pub struct RecordingApp {
    pub invocations: Mutex<Vec<Invocation>>,
    pub fail: bool,
    pub panic: bool,
    pub delay: Option<Duration>,
    /// Every invocation waits here, bounded, before returning
    pub barrier: Option<Arc<Barrier>>,
    pub in_flight: AtomicUsize,
    pub max_in_flight: AtomicUsize,
    pub join: Option<ApplicationSessionKey>,
    pub replaces: Option<ApplicationSessionKey>,
    pub correlations: Mutex<Vec<CorrelationKind>>,
}

#[async_trait]
impl SipApplication for RecordingApp {
    async fn service(&self, request: &RoutedRequest) -> anyhow::Result<()> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        self.invocations.lock().push(Invocation {
            method: request.method().clone(),
            cseq: request.request().cseq,
            application_session: request.application_session().clone(),
            session: request.session().clone(),
        });

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let met = match &self.barrier {
            Some(barrier) => tokio::time::timeout(Duration::from_secs(5), barrier.wait())
                .await
                .is_ok(),
            None => true,
        };

        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.panic {
            panic!("handler bug");
        }
        if self.fail {
            anyhow::bail!("application refused {}", request.method());
        }
        if !met {
            anyhow::bail!("no concurrent invocation showed up");
        }
        Ok(())
    }

    fn correlate(
        &self,
        _key: &ApplicationSessionKey,
        kind: CorrelationKind,
    ) -> Option<ApplicationSessionKey> {
        self.correlations.lock().push(kind);
        match kind {
            CorrelationKind::Join => self.join.clone(),
            CorrelationKind::Replaces => self.replaces.clone(),
        }
    }
}

impl RecordingApp {
    pub fn methods(&self) -> Vec<Method> {
        self.invocations.lock().iter().map(|i| i.method.clone()).collect()
    }

    pub fn cseqs(&self) -> Vec<u32> {
        self.invocations.lock().iter().map(|i| i.cseq).collect()
    }
}

pub struct Harness {
    pub dispatcher: SubsequentRequestDispatcher,
    pub store: Arc<SessionStore>,
    pub sender: Arc<RecordingSender>,
    pub responder: Arc<RecordingResponder>,
}

/// Configuration owning the local listener used by every fixture request
pub fn local_config() -> DispatcherConfig {
    DispatcherConfig::new().with_listener(ListenerConfig::new(LOCAL_HOST, LOCAL_PORT, Transport::Udp))
}

pub fn harness(config: DispatcherConfig) -> Harness {
    init_tracing();
    let store = Arc::new(SessionStore::new());
    let sender = Arc::new(RecordingSender::default());
    let responder = Arc::new(RecordingResponder::default());
    let dispatcher = SubsequentRequestDispatcher::new(
        config,
        Arc::new(ApplicationRegistry::new()),
        store.clone(),
        sender.clone(),
        responder.clone(),
    )
    .expect("valid dispatcher configuration");

    Harness { dispatcher, store, sender, responder }
}

/// Record-routed address carrying `identity`, as this container would have pushed it
pub fn record_route(identity: &RouteIdentity) -> String {
    identity
        .encode_route(SipUri::new(LOCAL_HOST).with_port(LOCAL_PORT).with_param("lr", None))
        .to_string()
}

/// In-dialog request from Alice to Bob, routed through this container
pub fn in_dialog(method: Method, identity: &RouteIdentity, call_id: &str) -> RequestBuilder {
    RequestBuilder::new(method, &format!("sip:bob@{}:{}", LOCAL_HOST, LOCAL_PORT))
        .from("sip:alice@example.com", Some("alice-tag"))
        .to("sip:bob@example.com", Some("bob-tag"))
        .call_id(call_id)
        .popped_route(&record_route(identity))
}

/// Create the sessions the initial request of the dialog would have created
pub fn establish(
    store: &SessionStore,
    identity: &RouteIdentity,
    request: &InboundRequest,
    polarity: Polarity,
) -> (Arc<ApplicationSession>, Arc<DialogSession>) {
    let application_key =
        ApplicationSessionKey::new(&identity.application_name, &identity.application_id)
            .expect("valid application session key");
    let application_session = store.get_or_create_application_session(application_key);
    let key = dialog_session_key(
        application_session.id(),
        &identity.application_name,
        request,
        polarity,
    )
    .expect("valid dialog session key");
    let session = store.get_or_create_dialog_session(key, &application_session);
    (application_session, session)
}

pub fn name_hash(application_name: &str) -> String {
    ApplicationNameHashes::hash(application_name)
}
