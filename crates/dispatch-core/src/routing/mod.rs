//! Routing of subsequent requests to their application and sessions

pub mod hashes;
pub mod identity;
pub mod listeners;
pub mod session_resolver;

pub use hashes::{ApplicationNameHashes, ApplicationRoutingTag, TAG_SEPARATOR};
pub use identity::{
    RouteDecision, RouteIdentity, RouteIdentityResolver, ROUTE_PARAM_APPLICATION_ID,
    ROUTE_PARAM_APPLICATION_NAME,
};
pub use listeners::ListenerSet;
pub use session_resolver::{ResolvedSession, SessionResolver};
