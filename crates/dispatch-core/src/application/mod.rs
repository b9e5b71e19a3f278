//! Deployed applications
//!
//! The registry maps application names to their [`ApplicationContext`]: the
//! handler implementing the application, its declared concurrency-control mode
//! and its worker pool. Deploying an application also registers the hash
//! token the container uses for it in record-routed addresses and To-tags.

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::dispatch::{ConcurrencyGate, WorkerPool};
use crate::message::{InboundRequest, RoutedRequest};
use crate::routing::ApplicationNameHashes;
use crate::session::ApplicationSessionKey;

/// How an application wants concurrent requests serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConcurrencyControlMode {
    /// No serialization by the container
    None,
    /// One request at a time per dialog session
    Session,
    /// One request at a time per application session
    ApplicationSession,
    /// The application serializes per transaction itself; dispatch runs inline
    Transaction,
}

impl Default for ConcurrencyControlMode {
    fn default() -> Self {
        ConcurrencyControlMode::Session
    }
}

/// Dialog-correlation kind used to find a pre-existing application session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CorrelationKind {
    /// Join header (RFC 3911)
    Join,
    /// Replaces header (RFC 3891)
    Replaces,
}

impl fmt::Display for CorrelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrelationKind::Join => f.write_str("Join"),
            CorrelationKind::Replaces => f.write_str("Replaces"),
        }
    }
}

/// Application code the container dispatches to
#[async_trait]
pub trait SipApplication: Send + Sync {
    /// Handle an in-dialog request
    async fn service(&self, request: &RoutedRequest) -> anyhow::Result<()>;

    /// Application session that a dialog joined to or replacing `key` really belongs to
    fn correlate(
        &self,
        _key: &ApplicationSessionKey,
        _kind: CorrelationKind,
    ) -> Option<ApplicationSessionKey> {
        None
    }
}

/// Runtime context of a deployed application
pub struct ApplicationContext {
    name: String,
    handler: Arc<dyn SipApplication>,
    mode: ConcurrencyControlMode,
    pool: WorkerPool,
}

impl ApplicationContext {
    pub fn new(
        name: impl Into<String>,
        handler: Arc<dyn SipApplication>,
        mode: ConcurrencyControlMode,
        pool_size: usize,
    ) -> Self {
        let name = name.into();
        let pool = WorkerPool::new(format!("{}-executor", name), pool_size);
        Self { name, handler, mode, pool }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn concurrency_control_mode(&self) -> ConcurrencyControlMode {
        self.mode
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Pool that runs offloaded dispatch for this request
    pub fn executor_for(&self, _request: &InboundRequest) -> &WorkerPool {
        &self.pool
    }

    /// Gate guarding dispatch of `request` under this application's mode
    pub fn gate_for(&self, request: &RoutedRequest) -> Option<ConcurrencyGate> {
        match self.mode {
            ConcurrencyControlMode::Session => Some(request.session().gate().clone()),
            ConcurrencyControlMode::ApplicationSession => {
                Some(request.application_session().gate().clone())
            }
            ConcurrencyControlMode::None | ConcurrencyControlMode::Transaction => None,
        }
    }

    pub fn correlate(
        &self,
        key: &ApplicationSessionKey,
        kind: CorrelationKind,
    ) -> Option<ApplicationSessionKey> {
        self.handler.correlate(key, kind)
    }

    /// Invoke application code; a panic is reported as an error
    pub async fn invoke(&self, request: &RoutedRequest) -> anyhow::Result<()> {
        match AssertUnwindSafe(self.handler.service(request)).catch_unwind().await {
            Ok(result) => result,
            Err(panic) => Err(anyhow::anyhow!(
                "application {} panicked: {}",
                self.name,
                panic_message(panic.as_ref())
            )),
        }
    }
}

impl fmt::Debug for ApplicationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApplicationContext")
            .field("name", &self.name)
            .field("mode", &self.mode)
            .field("pool", &self.pool)
            .finish()
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Deployed applications by name
#[derive(Debug, Default)]
pub struct ApplicationRegistry {
    applications: DashMap<String, Arc<ApplicationContext>>,
    hashes: ApplicationNameHashes,
}

impl ApplicationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deploy an application, replacing any previous deployment of the same name
    pub fn deploy(&self, context: ApplicationContext) -> Arc<ApplicationContext> {
        let hash = self.hashes.register(context.name());
        info!(
            "Deployed application {} (routing hash {}, {:?} concurrency control)",
            context.name(),
            hash,
            context.concurrency_control_mode()
        );
        let context = Arc::new(context);
        self.applications
            .insert(context.name().to_string(), context.clone());
        context
    }

    pub fn undeploy(&self, name: &str) -> Option<Arc<ApplicationContext>> {
        self.hashes.unregister(name);
        let removed = self.applications.remove(name).map(|(_, context)| context);
        if removed.is_some() {
            debug!("Undeployed application {}", name);
        }
        removed
    }

    pub fn find(&self, name: &str) -> Option<Arc<ApplicationContext>> {
        self.applications.get(name).map(|entry| entry.value().clone())
    }

    /// Application name behind a routing hash token
    pub fn application_name_from_hash(&self, hash: &str) -> Option<String> {
        self.hashes.application_name(hash)
    }

    pub fn hashes(&self) -> &ApplicationNameHashes {
        &self.hashes
    }

    pub fn application_names(&self) -> Vec<String> {
        self.applications.iter().map(|entry| entry.key().clone()).collect()
    }
}
