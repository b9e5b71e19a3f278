//! Application session
//!
//! One application's view of the dialogs sharing a call. It owns the keys of
//! its dialog sessions (the sessions themselves live in the store) and its own
//! concurrency gate for applications that serialize at application-session
//! granularity.

use std::collections::HashSet;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};

use super::key::{ApplicationSessionKey, SessionKey};
use crate::dispatch::ConcurrencyGate;

/// Lifecycle of an application session
///
/// Transitions are driven by the container's housekeeping, not by routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationSessionState {
    Valid,
    Invalidated,
    Expired,
}

#[derive(Debug)]
pub struct ApplicationSession {
    key: ApplicationSessionKey,
    state: RwLock<ApplicationSessionState>,
    dialog_sessions: Mutex<HashSet<SessionKey>>,
    gate: ConcurrencyGate,
    created_at: Instant,
}

impl ApplicationSession {
    pub fn new(key: ApplicationSessionKey) -> Self {
        let gate = ConcurrencyGate::new(key.to_string());
        Self {
            key,
            state: RwLock::new(ApplicationSessionState::Valid),
            dialog_sessions: Mutex::new(HashSet::new()),
            gate,
            created_at: Instant::now(),
        }
    }

    pub fn key(&self) -> &ApplicationSessionKey {
        &self.key
    }

    pub fn id(&self) -> &str {
        self.key.id()
    }

    pub fn application_name(&self) -> &str {
        self.key.application_name()
    }

    pub fn state(&self) -> ApplicationSessionState {
        *self.state.read()
    }

    pub fn set_state(&self, state: ApplicationSessionState) {
        *self.state.write() = state;
    }

    pub fn is_valid(&self) -> bool {
        self.state() == ApplicationSessionState::Valid
    }

    pub fn invalidate(&self) {
        self.set_state(ApplicationSessionState::Invalidated);
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    /// Keys of the dialog sessions owned by this application session
    pub fn dialog_session_keys(&self) -> Vec<SessionKey> {
        self.dialog_sessions.lock().iter().cloned().collect()
    }

    pub fn dialog_session_count(&self) -> usize {
        self.dialog_sessions.lock().len()
    }

    pub(crate) fn add_dialog_session_key(&self, key: SessionKey) {
        self.dialog_sessions.lock().insert(key);
    }

    pub(crate) fn remove_dialog_session_key(&self, key: &SessionKey) -> bool {
        self.dialog_sessions.lock().remove(key)
    }

    /// Gate used by application-session scoped concurrency control
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }
}
