//! Session keys, sessions and the concurrent session store

pub mod application_session;
pub mod dialog_session;
pub mod key;
pub mod store;

pub use application_session::{ApplicationSession, ApplicationSessionState};
pub use dialog_session::{DialogSession, DialogSessionState, Subscription};
pub use key::{
    application_session_key, dialog_session_key, parse_application_session_key,
    ApplicationSessionKey, Polarity, SessionKey,
};
pub use store::SessionStore;
