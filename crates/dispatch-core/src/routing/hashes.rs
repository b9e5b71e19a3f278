//! Application routing tokens
//!
//! The container never puts an application name on the wire. It puts a short
//! hash token instead, in the record-routed address it pushes (proxy
//! applications) or inside the To-tag it generates (UAS and B2BUA
//! applications), and keeps a table to map the token back.

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use super::identity::RouteIdentity;
use crate::errors::{DispatchError, DispatchResult};

/// Separator between the parts of an application routing To-tag
pub const TAG_SEPARATOR: char = '_';

/// Hash token → application name table
#[derive(Debug, Default)]
pub struct ApplicationNameHashes {
    by_hash: DashMap<String, String>,
}

impl ApplicationNameHashes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic token for an application name
    pub fn hash(application_name: &str) -> String {
        let digest = Sha256::digest(application_name.as_bytes());
        digest.iter().take(8).map(|b| format!("{:02x}", b)).collect()
    }

    /// Register a name and return its token
    pub fn register(&self, application_name: &str) -> String {
        let hash = Self::hash(application_name);
        self.by_hash.insert(hash.clone(), application_name.to_string());
        hash
    }

    pub fn unregister(&self, application_name: &str) {
        self.by_hash.remove(&Self::hash(application_name));
    }

    pub fn application_name(&self, hash: &str) -> Option<String> {
        self.by_hash.get(hash).map(|entry| entry.value().clone())
    }
}

/// To-tag carrying a routing identity: `<random>_<nameHash>_<applicationId>`
pub struct ApplicationRoutingTag;

impl ApplicationRoutingTag {
    /// Generate a fresh To-tag encoding `identity`
    pub fn compose(identity: &RouteIdentity) -> String {
        let random: u32 = rand::random();
        format!(
            "{:08x}{sep}{}{sep}{}",
            random,
            ApplicationNameHashes::hash(&identity.application_name),
            identity.application_id,
            sep = TAG_SEPARATOR
        )
    }

    /// Recover the identity encoded in a To-tag
    ///
    /// A missing tag, or one without the separator, carries no identity. A tag
    /// with the separator that does not decode is malformed.
    pub fn decode(
        tag: Option<&str>,
        hashes: &ApplicationNameHashes,
    ) -> DispatchResult<Option<RouteIdentity>> {
        let Some(tag) = tag else {
            return Ok(None);
        };
        if !tag.contains(TAG_SEPARATOR) {
            return Ok(None);
        }

        let parts: Vec<&str> = tag.splitn(3, TAG_SEPARATOR).collect();
        if parts.len() != 3 || parts.iter().any(|part| part.is_empty()) {
            return Err(DispatchError::malformed_identity(format!(
                "the To tag {} is not a valid application routing tag",
                tag
            )));
        }

        let application_name = hashes.application_name(parts[1]).ok_or_else(|| {
            DispatchError::malformed_identity(format!(
                "the To tag {} references an unknown application hash {}",
                tag, parts[1]
            ))
        })?;

        Ok(Some(RouteIdentity::new(application_name, parts[2])))
    }
}
