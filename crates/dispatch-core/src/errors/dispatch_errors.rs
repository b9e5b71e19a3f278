//! Dispatch error definitions
//!
//! Every failure that aborts the routing of a subsequent request ends up as a
//! [`DispatchError`]. All of them map to a `500 Server Internal Error` towards
//! the originating peer; the variants only exist to keep diagnostics precise.

use std::time::Duration;
use thiserror::Error;

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

/// Boxed cause carried by wrapping variants
pub type BoxedCause = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors produced by the key codec
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyError {
    /// A mandatory key component was empty
    #[error("Invalid argument: {message}")]
    InvalidArgument { message: String },

    /// The canonical textual form could not be parsed
    #[error("Cannot parse application session key '{input}': {message}")]
    Parse { input: String, message: String },
}

impl KeyError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument { message: message.into() }
    }

    pub fn parse(input: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse { input: input.into(), message: message.into() }
    }
}

/// Failure reported by the stateless sender
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("I/O error while sending: {0}")]
    Io(#[from] std::io::Error),

    #[error("Send failed: {message}")]
    SendFailed { message: String },
}

impl TransportError {
    pub fn send_failed(message: impl Into<String>) -> Self {
        Self::SendFailed { message: message.into() }
    }
}

/// Errors that abort the dispatch of a subsequent request
#[derive(Error, Debug)]
pub enum DispatchError {
    /// No deployed application could be identified for the request
    #[error("Application not found: {message}")]
    ApplicationNotFound { message: String },

    /// Session lookup missed after every fallback strategy
    #[error("Session not found: {message}")]
    SessionNotFound { message: String },

    /// A routing identity was present but could not be decoded
    #[error("Malformed routing identity: {message}")]
    MalformedIdentity { message: String },

    /// The application raised an error while handling the request
    #[error("Application failure: {message}")]
    ApplicationFailure {
        message: String,
        #[source]
        source: BoxedCause,
    },

    /// The concurrency gate could not be entered in time
    #[error("Timed out after {timeout:?} waiting for the concurrency gate of {session}")]
    GateTimeout { session: String, timeout: Duration },

    /// The request could not be relayed statelessly
    #[error("Transport error: {message}")]
    Transport {
        message: String,
        #[source]
        source: TransportError,
    },

    /// Key construction or parsing failed
    #[error(transparent)]
    Key(#[from] KeyError),

    /// Invalid dispatcher configuration
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl DispatchError {
    pub fn application_not_found(message: impl Into<String>) -> Self {
        Self::ApplicationNotFound { message: message.into() }
    }

    pub fn session_not_found(message: impl Into<String>) -> Self {
        Self::SessionNotFound { message: message.into() }
    }

    pub fn malformed_identity(message: impl Into<String>) -> Self {
        Self::MalformedIdentity { message: message.into() }
    }

    pub fn application_failure(message: impl Into<String>, source: impl Into<BoxedCause>) -> Self {
        Self::ApplicationFailure { message: message.into(), source: source.into() }
    }

    pub fn transport(message: impl Into<String>, source: TransportError) -> Self {
        Self::Transport { message: message.into(), source }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into() }
    }

    /// SIP status code the stack integration should answer with
    pub fn status_code(&self) -> u16 {
        500
    }

    /// Whether this is a session lookup miss rather than a hard failure
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::SessionNotFound { .. })
    }
}
