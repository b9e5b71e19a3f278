//! # RVoIP Dispatch Core
//!
//! Routing and dispatch of subsequent (in-dialog) SIP requests inside a
//! multi-tenant SIP application container.
//!
//! For every in-dialog request the stack hands over, the dispatcher works out
//! which deployed application owns it, finds the application session and
//! dialog session it belongs to, and runs application code (or forwards to an
//! active proxy's branches) under the application's concurrency control.
//!
//! ## Pipeline
//!
//! ```text
//! InboundRequest
//!   -> RouteIdentityResolver   (popped route token, then To-tag)
//!   -> SessionResolver         (application session, JOIN/REPLACES, polarity retry)
//!   -> DispatchScheduler       (inline or worker pool)
//!   -> DispatchTask            (gate, state, subscriptions, app / proxy)
//! ```
//!
//! Requests that carry no identity are relayed statelessly when they target
//! somebody else, dropped when they are ACKs to our own error responses, and
//! rejected otherwise.
//!
//! ## Modules
//!
//! - `message`: strongly typed view of an inbound request
//! - `session`: keys, application and dialog sessions, the session store
//! - `application`: deployed applications and their concurrency-control modes
//! - `routing`: identity recovery and session resolution
//! - `proxy`: proxy state consulted for proxied dialogs
//! - `dispatch`: gate, worker pool, scheduler, task and dispatcher
//! - `transport`: collaborators provided by the stack integration
//! - `config`, `logging`: dispatcher configuration and its `[logging]` section

pub mod application;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod logging;
pub mod message;
pub mod proxy;
pub mod routing;
pub mod session;
pub mod transport;

// Re-export key types
pub use application::{
    ApplicationContext, ApplicationRegistry, ConcurrencyControlMode, CorrelationKind,
    SipApplication,
};
pub use config::{DispatcherConfig, ListenerConfig};
pub use dispatch::{DispatchOutcome, SubsequentRequestDispatcher};
pub use errors::{DispatchError, DispatchResult};
pub use message::{InboundRequest, Method, RequestBuilder, RoutedRequest};
pub use session::{ApplicationSessionKey, SessionKey, SessionStore};
pub use transport::{ErrorResponder, StatelessSender};

/// Commonly used types
pub mod prelude {
    pub use crate::application::{
        ApplicationContext, ApplicationRegistry, ConcurrencyControlMode, CorrelationKind,
        SipApplication,
    };
    pub use crate::config::{DispatcherConfig, ListenerConfig};
    pub use crate::dispatch::{DispatchOutcome, SubsequentRequestDispatcher};
    pub use crate::errors::{DispatchError, DispatchResult, TransportError};
    pub use crate::message::{
        DialogRole, InboundRequest, Method, RequestBuilder, RoutedRequest, SipUri, Transport,
    };
    pub use crate::proxy::{BranchForwarder, Proxy, ProxyBranch};
    pub use crate::routing::{ApplicationRoutingTag, RouteIdentity};
    pub use crate::session::{
        ApplicationSession, ApplicationSessionKey, DialogSession, Polarity, SessionKey,
        SessionStore,
    };
    pub use crate::transport::{ErrorResponder, StatelessSender};
}
