//! Session keys
//!
//! Two key types identify the entries of the [`SessionStore`](super::SessionStore):
//!
//! - application session key = `(CALL-ID, APPNAME)`
//! - dialog session key = `(LOCAL-ADDR, LOCAL-TAG, REMOTE-ADDR, CALL-ID, APPNAME)`,
//!   scoped to the owning application session
//!
//! Which of From/To is "local" depends on the [`Polarity`] the key is computed
//! under. All functions here are pure.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::errors::KeyError;
use crate::message::{DialogRole, InboundRequest};

/// Identifies one application's view of the dialogs sharing a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ApplicationSessionKey {
    call_id: String,
    application_name: String,
}

impl ApplicationSessionKey {
    /// Build a key, rejecting empty components
    pub fn new(application_name: &str, call_id: &str) -> Result<Self, KeyError> {
        if application_name.is_empty() {
            return Err(KeyError::invalid_argument(
                "the application name cannot be empty for application session key creation",
            ));
        }
        if call_id.is_empty() {
            return Err(KeyError::invalid_argument(
                "the call id cannot be empty for application session key creation",
            ));
        }
        Ok(Self {
            call_id: call_id.to_string(),
            application_name: application_name.to_string(),
        })
    }

    /// Identifier of the application session (the call-id component)
    pub fn id(&self) -> &str {
        &self.call_id
    }

    pub fn call_id(&self) -> &str {
        &self.call_id
    }

    pub fn application_name(&self) -> &str {
        &self.application_name
    }
}

/// Canonical text form `(<callId>,<applicationName>)`
impl fmt::Display for ApplicationSessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{})", self.call_id, self.application_name)
    }
}

impl FromStr for ApplicationSessionKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_application_session_key(s)
    }
}

/// Build an application session key from its components
pub fn application_session_key(
    application_name: &str,
    call_id: &str,
) -> Result<ApplicationSessionKey, KeyError> {
    ApplicationSessionKey::new(application_name, call_id)
}

/// Parse a key previously externalized in its canonical text form
///
/// The delimiters must appear in the order `(`, `,`, `)`. Call-IDs never
/// contain a comma, so the first comma after the opening parenthesis ends the
/// call-id and the last closing parenthesis ends the application name.
pub fn parse_application_session_key(text: &str) -> Result<ApplicationSessionKey, KeyError> {
    let left = text
        .find('(')
        .ok_or_else(|| KeyError::parse(text, "the left parenthesis could not be found"))?;
    let comma = text[left + 1..]
        .find(',')
        .map(|i| i + left + 1)
        .ok_or_else(|| KeyError::parse(text, "the comma could not be found"))?;
    let right = text
        .rfind(')')
        .filter(|&i| i > comma)
        .ok_or_else(|| KeyError::parse(text, "the right parenthesis could not be found"))?;

    let call_id = &text[left + 1..comma];
    let application_name = &text[comma + 1..right];
    ApplicationSessionKey::new(application_name, call_id)
}

/// Which side of the dialog the container is on, for key derivation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Polarity {
    /// From is local, To is remote
    Normal,
    /// To is local, From is remote
    Inverted,
}

impl Polarity {
    /// Polarity implied by the stack's dialog side
    ///
    /// When the container sent the dialog-creating request its session key was
    /// computed from that outgoing request, so requests arriving from the peer
    /// carry From/To swapped relative to the stored key.
    pub fn from_dialog_role(role: Option<DialogRole>) -> Self {
        match role {
            Some(DialogRole::Client) => Polarity::Inverted,
            Some(DialogRole::Server) | None => Polarity::Normal,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Polarity::Normal => Polarity::Inverted,
            Polarity::Inverted => Polarity::Normal,
        }
    }

    /// Ordered lookup attempts: the determined polarity, then its opposite
    pub fn attempts(self) -> [Polarity; 2] {
        [self, self.opposite()]
    }

    pub fn is_inverted(self) -> bool {
        self == Polarity::Inverted
    }
}

/// Identifies one dialog session of an application session
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionKey {
    pub local_address: String,
    pub local_tag: Option<String>,
    pub remote_address: String,
    pub call_id: String,
    pub application_name: String,
    pub application_session_id: String,
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({},{},{},{},{})",
            self.local_address,
            self.local_tag.as_deref().unwrap_or(""),
            self.remote_address,
            self.call_id,
            self.application_name
        )
    }
}

/// Compute the dialog session key of a request under the given polarity
pub fn dialog_session_key(
    application_session_id: &str,
    application_name: &str,
    request: &InboundRequest,
    polarity: Polarity,
) -> Result<SessionKey, KeyError> {
    if application_name.is_empty() {
        return Err(KeyError::invalid_argument(
            "the application name cannot be empty for session key creation",
        ));
    }

    let (local, remote) = match polarity {
        Polarity::Normal => (&request.from, &request.to),
        Polarity::Inverted => (&request.to, &request.from),
    };

    Ok(SessionKey {
        local_address: local.uri.to_string(),
        local_tag: local.tag.clone(),
        remote_address: remote.uri.to_string(),
        call_id: request.call_id.clone(),
        application_name: application_name.to_string(),
        application_session_id: application_session_id.to_string(),
    })
}
