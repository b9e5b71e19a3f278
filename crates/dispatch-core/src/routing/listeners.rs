//! Locally bound listeners
//!
//! Decides whether a request target is this container or somebody else.

use crate::config::ListenerConfig;
use crate::message::Transport;

#[derive(Debug, Clone, Default)]
pub struct ListenerSet {
    listeners: Vec<ListenerConfig>,
}

impl ListenerSet {
    pub fn new(listeners: Vec<ListenerConfig>) -> Self {
        Self { listeners }
    }

    pub fn listeners(&self) -> &[ListenerConfig] {
        &self.listeners
    }

    /// Whether some listener is bound to exactly this host, port and transport
    pub fn is_local(&self, host: &str, port: u16, transport: Transport) -> bool {
        let host = host.trim_start_matches('[').trim_end_matches(']');
        self.listeners.iter().any(|listener| {
            listener.port == port
                && listener.transport == transport
                && listener
                    .host
                    .trim_start_matches('[')
                    .trim_end_matches(']')
                    .eq_ignore_ascii_case(host)
        })
    }

    pub fn is_external(&self, host: &str, port: u16, transport: Transport) -> bool {
        !self.is_local(host, port, transport)
    }
}
