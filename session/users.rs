use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use sha2::{Digest, Sha256};

use super::SessionError;

/// Credential storage seen by the application shell.
pub trait UserStore: Send + Sync {
    fn verify_credentials(&self, username: &str, password: &str) -> bool;

    fn register(&self, username: &str, password: &str) -> Result<(), SessionError>;
}

/// Process-local user store. Passwords are kept only as salted digests.
#[derive(Debug, Default)]
pub struct InMemoryUserStore {
    digests: DashMap<String, String>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.digests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.digests.is_empty()
    }

    pub fn contains(&self, username: &str) -> bool {
        self.digests.contains_key(username.trim())
    }
}

// The username salts the digest, so equal passwords never share a digest.
fn password_digest(username: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(username.as_bytes());
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

impl UserStore for InMemoryUserStore {
    fn verify_credentials(&self, username: &str, password: &str) -> bool {
        let username = username.trim();
        self.digests
            .get(username)
            .is_some_and(|stored| *stored == password_digest(username, password))
    }

    fn register(&self, username: &str, password: &str) -> Result<(), SessionError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(SessionError::EmptyUsername);
        }
        if password.is_empty() {
            return Err(SessionError::EmptyPassword);
        }
        match self.digests.entry(username.to_string()) {
            Entry::Occupied(_) => Err(SessionError::AlreadyRegistered(username.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(password_digest(username, password));
                log::info!("Registered user '{username}'");
                Ok(())
            }
        }
    }
}
