//! Dispatcher configuration
//!
//! ## Example
//!
//! ```rust
//! use rvoip_dispatch_core::config::{DispatcherConfig, ListenerConfig};
//! use rvoip_dispatch_core::message::Transport;
//!
//! let config = DispatcherConfig::from_toml_str(r#"
//!     bypass_request_executor = false
//!     gate_timeout_ms = 32000
//!
//!     [[listeners]]
//!     host = "192.168.1.10"
//!     port = 5060
//!     transport = "udp"
//! "#).unwrap();
//!
//! assert_eq!(config.listeners, vec![ListenerConfig::new("192.168.1.10", 5060, Transport::Udp)]);
//! assert_eq!(config.default_pool_size, 64);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::errors::{DispatchError, DispatchResult};
use crate::logging::LoggingConfig;
use crate::message::Transport;

/// Default maximum of concurrently running pooled tasks per application
pub const DEFAULT_POOL_SIZE: usize = 64;

/// A locally bound SIP listener
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub host: String,
    pub port: u16,
    pub transport: Transport,
}

impl ListenerConfig {
    pub fn new(host: impl Into<String>, port: u16, transport: Transport) -> Self {
        Self { host: host.into(), port, transport }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.host.trim().is_empty() {
            return Err("listener host cannot be empty".to_string());
        }
        if self.port == 0 {
            return Err(format!("listener {} must have a non-zero port", self.host));
        }
        Ok(())
    }
}

/// Configuration of the subsequent request dispatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Run every dispatch inline on the caller's task
    pub bypass_request_executor: bool,

    /// Bound on waiting for a session's concurrency gate, in milliseconds
    ///
    /// `None` waits indefinitely: a stalled handler then holds back every
    /// later request of its session.
    pub gate_timeout_ms: Option<u64>,

    /// Listeners owned by this container
    pub listeners: Vec<ListenerConfig>,

    /// Worker pool size for applications deployed without an explicit one
    pub default_pool_size: usize,

    /// `[logging]` section, handed to [`setup_logging`](crate::logging::setup_logging) by the host
    pub logging: LoggingConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            bypass_request_executor: false,
            gate_timeout_ms: None,
            listeners: Vec::new(),
            default_pool_size: DEFAULT_POOL_SIZE,
            logging: LoggingConfig::default(),
        }
    }
}

impl DispatcherConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_toml_str(text: &str) -> DispatchResult<Self> {
        let config: Self = toml::from_str(text).map_err(|e| {
            DispatchError::configuration(format!("invalid dispatcher configuration: {}", e))
        })?;
        config.validate().map_err(DispatchError::configuration)?;
        Ok(config)
    }

    pub fn with_bypass_request_executor(mut self, bypass: bool) -> Self {
        self.bypass_request_executor = bypass;
        self
    }

    pub fn with_gate_timeout(mut self, timeout: Duration) -> Self {
        self.gate_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_listener(mut self, listener: ListenerConfig) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_default_pool_size(mut self, size: usize) -> Self {
        self.default_pool_size = size;
        self
    }

    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = logging;
        self
    }

    pub fn gate_timeout(&self) -> Option<Duration> {
        self.gate_timeout_ms.map(Duration::from_millis)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.default_pool_size == 0 {
            return Err("default_pool_size must be at least 1".to_string());
        }
        if self.gate_timeout_ms == Some(0) {
            return Err("gate_timeout_ms must be positive when set".to_string());
        }
        for listener in &self.listeners {
            listener.validate()?;
        }
        self.logging.validate()
    }
}
