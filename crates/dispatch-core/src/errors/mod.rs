//! Error types for dispatch-core
//!
//! This module defines all error types used throughout the dispatch-core crate:
//! key codec errors, transport errors and the dispatch error surfaced to the
//! protocol-stack integration.

pub mod dispatch_errors;

// Re-export main error types
pub use dispatch_errors::{DispatchError, DispatchResult, KeyError, TransportError};
