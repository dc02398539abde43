// Bearer-token persistence.
//
// The transport never talks to a storage backend directly; it goes through
// `TokenStore`. The in-memory store lives here, the OS keyring store lives
// in `pipewatch-config`.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use secrecy::SecretString;

use crate::models::UserProfile;

/// Token plus the last-known profile. Always saved and cleared together.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub token: SecretString,
    pub user: Option<UserProfile>,
}

impl StoredSession {
    pub fn new(token: SecretString, user: Option<UserProfile>) -> Self {
        Self { token, user }
    }
}

/// Client-side key-value store for the authenticated session.
///
/// Implementations swallow (and log) backend failures: a broken keyring
/// must not take the request layer down with it.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<StoredSession>;
    fn save(&self, session: &StoredSession);
    fn clear(&self);
}

/// Process-local store. Used by tests and by consumers that log in per run.
#[derive(Default)]
pub struct MemoryTokenStore {
    session: ArcSwapOption<StoredSession>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store that starts out holding `session`.
    pub fn with_session(session: StoredSession) -> Self {
        Self {
            session: ArcSwapOption::from_pointee(session),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<StoredSession> {
        self.session.load_full().map(|s| (*s).clone())
    }

    fn save(&self, session: &StoredSession) {
        self.session.store(Some(Arc::new(session.clone())));
    }

    fn clear(&self) {
        self.session.store(None);
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn memory_store_round_trip_and_clear() {
        let store = MemoryTokenStore::new();
        assert!(store.load().is_none());

        store.save(&StoredSession::new(SecretString::from("abc".to_owned()), None));
        let loaded = store.load().map(|s| s.token.expose_secret().to_owned());
        assert_eq!(loaded.as_deref(), Some("abc"));

        store.clear();
        assert!(store.load().is_none());
    }
}
