//! Dispatch of requests on proxied dialogs, and subscription bookkeeping

mod common;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;

use common::*;
use rvoip_dispatch_core::prelude::*;
use rvoip_dispatch_core::session::Subscription;

struct ProxiedDialog {
    harness: Harness,
    app: Arc<RecordingApp>,
    forwarder: Arc<RecordingForwarder>,
    proxy: Arc<Proxy>,
    session: Arc<DialogSession>,
    identity: RouteIdentity,
}

fn proxied_dialog(app: RecordingApp) -> ProxiedDialog {
    proxied_dialog_in(app, ConcurrencyControlMode::Transaction)
}

fn proxied_dialog_in(app: RecordingApp, mode: ConcurrencyControlMode) -> ProxiedDialog {
    let harness = harness(local_config());
    let app = Arc::new(app);
    harness.dispatcher.deploy("proxy", app.clone(), mode);

    let identity = RouteIdentity::new("proxy", "as-1");
    let initial = in_dialog(Method::Info, &identity, "proxied-1").build().unwrap();
    let (_, session) = establish(&harness.store, &identity, &initial, Polarity::Normal);

    let proxy = Arc::new(Proxy::new());
    session.set_proxy(Some(proxy.clone()));

    ProxiedDialog {
        harness,
        app,
        forwarder: Arc::new(RecordingForwarder::default()),
        proxy,
        session,
        identity,
    }
}

impl ProxiedDialog {
    fn branch(&self, host: &str) -> Arc<ProxyBranch> {
        let branch = Arc::new(ProxyBranch::new(SipUri::new(host), self.forwarder.clone()));
        self.proxy.add_branch(branch.clone());
        branch
    }

    fn request(&self, method: Method) -> RequestBuilder {
        in_dialog(method, &self.identity, "proxied-1")
    }
}

#[tokio::test]
async fn test_prack_goes_to_branches_waiting_for_it() {
    let dialog = proxied_dialog(RecordingApp::default());
    let waiting = dialog.branch("192.0.2.1");
    let idle = dialog.branch("192.0.2.2");
    waiting.set_waiting_for_prack(true);

    let request = dialog.request(Method::Prack).cseq(2).build().unwrap();
    dialog.harness.dispatcher.dispatch(request).await.unwrap();

    assert_eq!(dialog.app.methods(), vec![Method::Prack]);
    assert_eq!(
        *dialog.forwarder.stateless.lock(),
        vec![(waiting.id().to_string(), Method::Prack)]
    );
    assert!(dialog.forwarder.subsequent.lock().is_empty());
    assert!(!waiting.is_waiting_for_prack());
    assert!(!idle.is_waiting_for_prack());
}

#[tokio::test]
async fn test_final_branch_receives_subsequent_requests() {
    let dialog = proxied_dialog(RecordingApp::default());
    let winner = dialog.branch("192.0.2.1");
    dialog.branch("192.0.2.2");
    dialog.proxy.set_final_branch(Some(winner.clone()));

    let info = dialog.request(Method::Info).cseq(2).build().unwrap();
    dialog.harness.dispatcher.dispatch(info).await.unwrap();
    assert!(!dialog.proxy.ack_received());
    assert_eq!(
        dialog.proxy.original_request().map(|r| r.method),
        Some(Method::Info)
    );

    let ack = dialog.request(Method::Ack).cseq(2).build().unwrap();
    dialog.harness.dispatcher.dispatch(ack).await.unwrap();
    assert!(dialog.proxy.ack_received());

    assert_eq!(dialog.app.methods(), vec![Method::Info, Method::Ack]);
    assert_eq!(
        *dialog.forwarder.subsequent.lock(),
        vec![
            (winner.id().to_string(), Method::Info),
            (winner.id().to_string(), Method::Ack),
        ]
    );
    assert!(dialog.forwarder.stateless.lock().is_empty());
}

struct PanickingForwarder;

#[async_trait]
impl BranchForwarder for PanickingForwarder {
    async fn proxy_subsequent_request(
        &self,
        _branch: &ProxyBranch,
        _request: &RoutedRequest,
    ) -> anyhow::Result<()> {
        panic!("forwarder lost its socket");
    }

    async fn proxy_dialog_stateless(
        &self,
        _branch: &ProxyBranch,
        _request: &RoutedRequest,
    ) -> anyhow::Result<()> {
        panic!("forwarder lost its socket");
    }
}

#[tokio::test]
async fn test_panicking_forwarder_answers_500() {
    for mode in [ConcurrencyControlMode::Transaction, ConcurrencyControlMode::Session] {
        let dialog = proxied_dialog_in(RecordingApp::default(), mode);
        let broken = Arc::new(ProxyBranch::new(SipUri::new("192.0.2.1"), Arc::new(PanickingForwarder)));
        dialog.proxy.add_branch(broken.clone());
        dialog.proxy.set_final_branch(Some(broken));

        let request = dialog.request(Method::Bye).cseq(2).build().unwrap();
        let outcome = dialog.harness.dispatcher.dispatch(request).await.unwrap();
        assert!(outcome.completed().await);

        assert_eq!(dialog.app.methods(), vec![Method::Bye]);
        let responses = dialog.harness.responder.responses.lock().clone();
        assert_eq!(responses.len(), 1);
        assert_eq!(responses[0].0, 500);
        assert!(responses[0].1.contains("192.0.2.1"));
        assert!(!dialog.session.gate().is_held());
    }
}

#[tokio::test]
async fn test_panicking_forwarder_during_prack_answers_500() {
    let dialog = proxied_dialog(RecordingApp::default());
    let broken = Arc::new(ProxyBranch::new(SipUri::new("192.0.2.9"), Arc::new(PanickingForwarder)));
    broken.set_waiting_for_prack(true);
    dialog.proxy.add_branch(broken.clone());

    let request = dialog.request(Method::Prack).cseq(2).build().unwrap();
    dialog.harness.dispatcher.dispatch(request).await.unwrap();

    assert_eq!(dialog.harness.responder.status_codes(), vec![500]);
    assert!(broken.is_waiting_for_prack());
    assert!(!dialog.session.gate().is_held());
}

#[tokio::test]
async fn test_missing_final_branch_is_not_fatal() {
    let dialog = proxied_dialog(RecordingApp::default());
    dialog.branch("192.0.2.1");

    let request = dialog.request(Method::Info).cseq(2).build().unwrap();
    let outcome = dialog.harness.dispatcher.dispatch(request).await.unwrap();

    assert!(outcome.is_dispatched());
    assert!(dialog.app.invocations.lock().is_empty());
    assert!(dialog.forwarder.subsequent.lock().is_empty());
    assert!(dialog.forwarder.stateless.lock().is_empty());
    assert!(dialog.harness.responder.responses.lock().is_empty());
}

#[tokio::test]
async fn test_application_failure_stops_forwarding_and_answers_500() {
    let dialog = proxied_dialog(RecordingApp { fail: true, ..Default::default() });
    let winner = dialog.branch("192.0.2.1");
    dialog.proxy.set_final_branch(Some(winner));

    let request = dialog.request(Method::Info).cseq(2).build().unwrap();
    dialog.harness.dispatcher.dispatch(request).await.unwrap();

    assert!(dialog.forwarder.subsequent.lock().is_empty());
    assert_eq!(dialog.harness.responder.status_codes(), vec![500]);
    assert!(!dialog.session.gate().is_held());
}

#[tokio::test]
async fn test_notify_terminated_removes_subscription_even_on_failure() {
    let harness = harness(local_config());
    let app = Arc::new(RecordingApp { fail: true, ..Default::default() });
    harness
        .dispatcher
        .deploy("presence", app.clone(), ConcurrencyControlMode::Session);

    let identity = RouteIdentity::new("presence", "as-2");
    let active = in_dialog(Method::Notify, &identity, "notify-1")
        .cseq(1)
        .event("presence;id=42")
        .subscription_state("active;expires=3600")
        .build()
        .unwrap();
    let (_, session) = establish(&harness.store, &identity, &active, Polarity::Normal);
    assert!(session.add_subscription(&active));

    let terminated = in_dialog(Method::Notify, &identity, "notify-1")
        .cseq(2)
        .event("presence;id=42")
        .subscription_state("terminated;reason=noresource")
        .build()
        .unwrap();
    harness
        .dispatcher
        .dispatch(terminated)
        .await
        .unwrap()
        .completed()
        .await;

    assert!(!session.has_subscription(&Subscription::new("presence", Some("42"))));
    assert!(session.subscriptions().is_empty());
    assert_eq!(harness.responder.status_codes(), vec![500]);
    assert!(!session.gate().is_held());
}

#[tokio::test]
async fn test_notify_active_registers_subscription_once() {
    let harness = harness(local_config().with_bypass_request_executor(true));
    let app = Arc::new(RecordingApp::default());
    harness
        .dispatcher
        .deploy("presence", app.clone(), ConcurrencyControlMode::Session);

    let identity = RouteIdentity::new("presence", "as-3");
    let notify = |cseq| {
        in_dialog(Method::Notify, &identity, "notify-2")
            .cseq(cseq)
            .event("dialog")
            .subscription_state("pending")
            .build()
            .unwrap()
    };
    let (_, session) = establish(&harness.store, &identity, &notify(1), Polarity::Normal);

    harness.dispatcher.dispatch(notify(1)).await.unwrap();
    harness.dispatcher.dispatch(notify(2)).await.unwrap();

    assert_eq!(session.subscriptions(), vec![Subscription::new("dialog", None)]);
    assert_eq!(app.methods(), vec![Method::Notify, Method::Notify]);
}

#[tokio::test]
async fn test_error_responder_failure_does_not_mask_dispatch() {
    let dialog = proxied_dialog(RecordingApp { panic: true, ..Default::default() });
    dialog.harness.responder.fail.store(true, Ordering::SeqCst);
    let winner = dialog.branch("192.0.2.1");
    dialog.proxy.set_final_branch(Some(winner));

    let request = dialog.request(Method::Info).cseq(2).build().unwrap();
    let outcome = dialog.harness.dispatcher.dispatch(request).await.unwrap();

    assert!(outcome.is_dispatched());
    assert_eq!(dialog.harness.responder.status_codes(), vec![500]);
    assert!(!dialog.session.gate().is_held());
}
