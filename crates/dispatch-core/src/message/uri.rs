//! Minimal SIP URI representation
//!
//! Only what the routing core needs: host, port, user and the parameter list
//! (the container hides its routing identity in URI parameters of the
//! record-routed address).

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::parser::{parse_all, route_uri};
use super::Transport;

/// Failure to parse a SIP URI
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid SIP URI '{input}': {reason}")]
pub struct InvalidUri {
    pub input: String,
    pub reason: String,
}

/// A `sip:` or `sips:` URI
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SipUri {
    pub scheme: String,
    pub user: Option<String>,
    pub host: String,
    pub port: Option<u16>,
    pub params: Vec<(String, Option<String>)>,
}

impl SipUri {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            scheme: "sip".to_string(),
            user: None,
            host: host.into(),
            port: None,
            params: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_param(mut self, name: impl Into<String>, value: Option<&str>) -> Self {
        self.params.push((name.into(), value.map(str::to_string)));
        self
    }

    pub fn is_secure(&self) -> bool {
        self.scheme.eq_ignore_ascii_case("sips")
    }

    /// Value of a URI parameter, matched case-insensitively on the name
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .and_then(|(_, v)| v.as_deref())
    }

    /// Transport named by the `transport` parameter, if any
    pub fn transport(&self) -> Option<Transport> {
        self.param("transport").and_then(Transport::from_token)
    }

    /// Explicit port, or the default port of the given transport
    pub fn effective_port(&self, transport: Transport) -> u16 {
        match self.port {
            Some(port) => port,
            None if self.is_secure() => Transport::Tls.default_port(),
            None => transport.default_port(),
        }
    }
}

impl fmt::Display for SipUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:", self.scheme)?;
        if let Some(user) = &self.user {
            write!(f, "{}@", user)?;
        }
        if self.host.contains(':') && !self.host.starts_with('[') {
            write!(f, "[{}]", self.host)?;
        } else {
            write!(f, "{}", self.host)?;
        }
        if let Some(port) = self.port {
            write!(f, ":{}", port)?;
        }
        for (name, value) in &self.params {
            match value {
                Some(value) => write!(f, ";{}={}", name, value)?,
                None => write!(f, ";{}", name)?,
            }
        }
        Ok(())
    }
}

impl FromStr for SipUri {
    type Err = InvalidUri;

    /// Parse a URI, optionally enclosed in angle brackets
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        parse_all(input, route_uri).map_err(|offset| InvalidUri {
            input: input.to_string(),
            reason: format!("unexpected input at offset {}", offset),
        })
    }
}
