// ── Keyring session store ──
//
// Persists the bearer token and last-known profile in the OS keyring,
// one entry per profile under the `pipewatch` service. Keyring failures
// are logged and treated as "no session".

use pipewatch_api::{StoredSession, TokenStore, UserProfile};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SERVICE: &str = "pipewatch";

/// Wire shape of a persisted session.
#[derive(Serialize, Deserialize)]
struct PersistedSession {
    token: String,
    #[serde(default)]
    user: Option<UserProfile>,
}

/// [`TokenStore`] backed by the platform keyring.
pub struct KeyringTokenStore {
    profile: String,
    entry: Option<keyring::Entry>,
}

impl KeyringTokenStore {
    pub fn new(profile: &str) -> Self {
        let entry = match keyring::Entry::new(SERVICE, &format!("{profile}/session")) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!(profile, error = %e, "keyring unavailable, session will not persist");
                None
            }
        };
        Self {
            profile: profile.to_owned(),
            entry,
        }
    }

    pub fn profile(&self) -> &str {
        &self.profile
    }
}

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<StoredSession> {
        let entry = self.entry.as_ref()?;
        let raw = match entry.get_password() {
            Ok(raw) => raw,
            Err(keyring::Error::NoEntry) => return None,
            Err(e) => {
                warn!(profile = %self.profile, error = %e, "failed to read session from keyring");
                return None;
            }
        };
        decode(&raw)
    }

    fn save(&self, session: &StoredSession) {
        let Some(entry) = self.entry.as_ref() else {
            return;
        };
        let raw = match encode(session) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(error = %e, "failed to encode session");
                return;
            }
        };
        if let Err(e) = entry.set_password(&raw) {
            warn!(profile = %self.profile, error = %e, "failed to store session in keyring");
        }
    }

    fn clear(&self) {
        let Some(entry) = self.entry.as_ref() else {
            return;
        };
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => {}
            Err(e) => {
                warn!(profile = %self.profile, error = %e, "failed to clear session in keyring");
            }
        }
    }
}

fn encode(session: &StoredSession) -> Result<String, serde_json::Error> {
    serde_json::to_string(&PersistedSession {
        token: session.token.expose_secret().to_owned(),
        user: session.user.clone(),
    })
}

fn decode(raw: &str) -> Option<StoredSession> {
    match serde_json::from_str::<PersistedSession>(raw) {
        Ok(p) => Some(StoredSession::new(SecretString::from(p.token), p.user)),
        Err(e) => {
            debug!(error = %e, "ignoring unreadable keyring session");
            None
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn profile(name: &str) -> UserProfile {
        UserProfile {
            id: Some("7".into()),
            username: name.into(),
            email: None,
            role: Some("admin".into()),
            extra: serde_json::Map::new(),
        }
    }

    #[test]
    fn session_survives_encoding() {
        let token = SecretString::from("tok".to_owned());
        let session = StoredSession::new(token, Some(profile("ada")));
        let decoded = decode(&encode(&session).unwrap()).unwrap();
        assert_eq!(decoded.token.expose_secret(), "tok");
        assert_eq!(decoded.user, Some(profile("ada")));
    }

    #[test]
    fn garbage_is_no_session() {
        assert!(decode("not json").is_none());
    }

    #[test]
    fn mock_keyring_round_trip() {
        keyring::set_default_credential_builder(keyring::mock::default_credential_builder());
        let store = KeyringTokenStore::new("test");
        assert!(store.load().is_none());

        store.save(&StoredSession::new(SecretString::from("tok".to_owned()), None));
        assert_eq!(store.load().unwrap().token.expose_secret(), "tok");

        store.clear();
        assert!(store.load().is_none());
        store.clear();
    }
}
