//! Session store
//!
//! Central place to get a session, be it an application session or a dialog
//! session. The two kinds live in two independent concurrent maps so that
//! application-session churn never contends with dialog-session churn. One
//! store is instantiated per container and shared by reference.
//!
//! A lookup miss is a normal outcome: sessions are removed by the container
//! (dialog termination, invalidation) concurrently with routing.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use super::application_session::ApplicationSession;
use super::dialog_session::DialogSession;
use super::key::{ApplicationSessionKey, SessionKey};

#[derive(Debug, Default)]
pub struct SessionStore {
    application_sessions: DashMap<ApplicationSessionKey, Arc<ApplicationSession>>,
    dialog_sessions: DashMap<SessionKey, Arc<DialogSession>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up an application session without creating it
    pub fn find_application_session(
        &self,
        key: &ApplicationSessionKey,
    ) -> Option<Arc<ApplicationSession>> {
        self.application_sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Fetch an application session, creating it if absent
    pub fn get_or_create_application_session(
        &self,
        key: ApplicationSessionKey,
    ) -> Arc<ApplicationSession> {
        match self.application_sessions.entry(key) {
            Entry::Occupied(entry) => entry.get().clone(),
            Entry::Vacant(entry) => {
                debug!("Adding an application session with the key : {}", entry.key());
                let session = Arc::new(ApplicationSession::new(entry.key().clone()));
                entry.insert(session.clone());
                session
            }
        }
    }

    /// Remove an application session, returning it if it was present
    pub fn remove_application_session(
        &self,
        key: &ApplicationSessionKey,
    ) -> Option<Arc<ApplicationSession>> {
        debug!("Removing an application session with the key : {}", key);
        self.application_sessions.remove(key).map(|(_, session)| session)
    }

    /// Look up a dialog session without creating it
    pub fn find_dialog_session(&self, key: &SessionKey) -> Option<Arc<DialogSession>> {
        self.dialog_sessions.get(key).map(|entry| entry.value().clone())
    }

    /// Fetch a dialog session, creating it under `application_session` if absent
    pub fn get_or_create_dialog_session(
        &self,
        key: SessionKey,
        application_session: &Arc<ApplicationSession>,
    ) -> Arc<DialogSession> {
        let (session, created) = match self.dialog_sessions.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                debug!("Adding a dialog session with the key : {}", entry.key());
                let session = Arc::new(DialogSession::new(
                    entry.key().clone(),
                    application_session.key().clone(),
                ));
                entry.insert(session.clone());
                (session, true)
            }
        };
        // The map guard is released before touching the application session
        if created {
            application_session.add_dialog_session_key(session.key().clone());
        }
        session
    }

    /// Remove a dialog session, returning it if it was present
    pub fn remove_dialog_session(&self, key: &SessionKey) -> Option<Arc<DialogSession>> {
        debug!("Removing a dialog session with the key : {}", key);
        let (_, session) = self.dialog_sessions.remove(key)?;
        if let Some(application_session) =
            self.find_application_session(session.application_session_key())
        {
            application_session.remove_dialog_session_key(key);
        }
        Some(session)
    }

    /// Dialog sessions currently stored for an application session
    pub fn dialog_sessions_of(&self, application_session: &ApplicationSession) -> Vec<Arc<DialogSession>> {
        application_session
            .dialog_session_keys()
            .iter()
            .filter_map(|key| self.find_dialog_session(key))
            .collect()
    }

    pub fn application_session_count(&self) -> usize {
        self.application_sessions.len()
    }

    pub fn dialog_session_count(&self) -> usize {
        self.dialog_sessions.len()
    }

    pub fn application_session_keys(&self) -> Vec<ApplicationSessionKey> {
        self.application_sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    pub fn dialog_session_keys(&self) -> Vec<SessionKey> {
        self.dialog_sessions.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Log every application session key at debug level
    pub fn dump_application_sessions(&self) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("application sessions present in the session store");
            for entry in self.application_sessions.iter() {
                debug!("{}", entry.key());
            }
        }
    }

    /// Log every dialog session key at debug level
    pub fn dump_dialog_sessions(&self) {
        if tracing::enabled!(tracing::Level::DEBUG) {
            debug!("dialog sessions present in the session store");
            for entry in self.dialog_sessions.iter() {
                debug!("{}", entry.key());
            }
        }
    }
}
