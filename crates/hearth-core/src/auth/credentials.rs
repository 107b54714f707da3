//! The single source of truth for "who is logged in".
//!
//! `CredentialStore` holds the current `Credential` (or nothing) together
//! with a `SessionEpoch` in a `tokio::sync::watch` cell. Readers always see
//! a whole credential or none. Every mutation goes through the cell's write
//! lock and is persisted while that lock is held, so memory and disk never
//! disagree about which session is current.

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::models::{Credential, Role};

use super::backend::{
    CredentialBackend, MemoryBackend, CREDENTIAL_KEYS, ROLE_KEY, TOKEN_KEY, USERNAME_KEY,
};

/// Identifies one logical session.
///
/// Bumped by every `set` and every `clear` that actually removed a
/// credential. Requests and verifications remember the epoch they started
/// under so a late failure can only end the session it belongs to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionEpoch(u64);

impl SessionEpoch {
    fn next(self) -> Self {
        SessionEpoch(self.0 + 1)
    }
}

/// Consistent view of the store: the credential and the epoch it belongs to.
#[derive(Debug, Clone, Default)]
pub struct SessionSlot {
    pub epoch: SessionEpoch,
    pub credential: Option<Credential>,
}

impl SessionSlot {
    pub fn is_active(&self) -> bool {
        self.credential.is_some()
    }
}

pub struct CredentialStore {
    backend: Box<dyn CredentialBackend>,
    slot: watch::Sender<SessionSlot>,
}

impl CredentialStore {
    /// Open the store, restoring a persisted session if one is complete.
    pub fn open(backend: impl CredentialBackend + 'static) -> Self {
        let credential = load_credential(&backend);
        match credential {
            Some(ref c) => info!(role = %c.role, user = %c.display_name, "Restored saved session"),
            None => debug!("No saved session"),
        }

        let (slot, _) = watch::channel(SessionSlot {
            epoch: SessionEpoch::default(),
            credential,
        });

        Self {
            backend: Box::new(backend),
            slot,
        }
    }

    /// A store that forgets everything when the process exits
    pub fn ephemeral() -> Self {
        Self::open(MemoryBackend::new())
    }

    pub fn get(&self) -> Option<Credential> {
        self.slot.borrow().credential.clone()
    }

    pub fn snapshot(&self) -> SessionSlot {
        self.slot.borrow().clone()
    }

    pub fn epoch(&self) -> SessionEpoch {
        self.slot.borrow().epoch
    }

    /// Observe every session change (login, logout, invalidation)
    pub fn subscribe(&self) -> watch::Receiver<SessionSlot> {
        self.slot.subscribe()
    }

    /// Store a new session, replacing whatever was there.
    pub fn set(
        &self,
        token: impl Into<String>,
        role: Role,
        display_name: impl Into<String>,
    ) -> SessionEpoch {
        let credential = Credential::new(token, role, display_name);
        let mut epoch = SessionEpoch::default();

        self.slot.send_modify(|slot| {
            let entries = [
                (TOKEN_KEY, credential.token.as_str()),
                (ROLE_KEY, credential.role.as_str()),
                (USERNAME_KEY, credential.display_name.as_str()),
            ];
            if let Err(e) = self.backend.write_all(&entries) {
                warn!(error = %e, "Failed to persist session");
            }
            slot.epoch = slot.epoch.next();
            slot.credential = Some(credential);
            epoch = slot.epoch;
        });

        info!(role = %role, "Session stored");
        epoch
    }

    /// Remove the current session. Returns `false` if there was none.
    pub fn clear(&self) -> bool {
        let cleared = self
            .slot
            .send_if_modified(|slot| self.end_session(slot, None));
        if cleared {
            info!("Session cleared");
        }
        cleared
    }

    /// Clear the session only if it is still the one identified by `epoch`.
    ///
    /// Returns `true` only for the call that actually ended the session;
    /// every later call for the same epoch observes the change and does
    /// nothing.
    pub fn invalidate(&self, epoch: SessionEpoch) -> bool {
        let ended = self
            .slot
            .send_if_modified(|slot| self.end_session(slot, Some(epoch)));
        if ended {
            warn!(?epoch, "Session invalidated");
        } else {
            debug!(?epoch, "Session already ended, nothing to invalidate");
        }
        ended
    }

    /// Adopt the server's view of the role for the session `epoch`.
    ///
    /// The token is unchanged, so the epoch is not bumped.
    pub fn reconcile_role(&self, epoch: SessionEpoch, role: Role) -> bool {
        self.slot.send_if_modified(|slot| {
            if slot.epoch != epoch {
                return false;
            }
            let Some(credential) = slot.credential.as_mut() else {
                return false;
            };
            if credential.role == role {
                return false;
            }

            warn!(cached = %credential.role, server = %role, "Cached role differs from server");
            credential.role = role;
            if let Err(e) = self.backend.write_all(&[(ROLE_KEY, role.as_str())]) {
                warn!(error = %e, "Failed to persist reconciled role");
            }
            true
        })
    }

    fn end_session(&self, slot: &mut SessionSlot, expected: Option<SessionEpoch>) -> bool {
        if slot.credential.is_none() {
            return false;
        }
        if expected.is_some_and(|epoch| epoch != slot.epoch) {
            return false;
        }

        if let Err(e) = self.backend.remove_all(&CREDENTIAL_KEYS) {
            warn!(error = %e, "Failed to remove persisted session");
        }
        slot.credential = None;
        slot.epoch = slot.epoch.next();
        true
    }
}

/// Assemble a credential from the backend. All three keys must be present
/// and the role must parse; anything less is no session at all.
fn load_credential(backend: &dyn CredentialBackend) -> Option<Credential> {
    let read = |key: &str| match backend.read(key) {
        Ok(value) => value.filter(|v| !v.is_empty()),
        Err(e) => {
            warn!(error = %e, key, "Failed to read persisted session");
            None
        }
    };

    let token = read(TOKEN_KEY);
    let role = read(ROLE_KEY).and_then(|r| r.parse::<Role>().ok());
    let name = read(USERNAME_KEY);

    match (token, role, name) {
        (Some(token), Some(role), Some(name)) => Some(Credential::new(token, role, name)),
        (None, None, None) => None,
        _ => {
            warn!("Discarding incomplete saved session");
            if let Err(e) = backend.remove_all(&CREDENTIAL_KEYS) {
                warn!(error = %e, "Failed to remove incomplete session");
            }
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::auth::backend::FileBackend;

    #[test]
    fn test_set_and_get() {
        let store = CredentialStore::ephemeral();
        assert!(store.get().is_none());

        let epoch = store.set("tok", Role::Friend, "mia");
        let cred = store.get().unwrap();
        assert_eq!(cred.token, "tok");
        assert_eq!(cred.role, Role::Friend);
        assert_eq!(cred.display_name, "mia");
        assert_eq!(store.epoch(), epoch);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let store = CredentialStore::ephemeral();
        store.set("tok", Role::Admin, "sam");

        assert!(store.clear());
        let after_first = store.snapshot();
        assert!(!store.clear());
        let after_second = store.snapshot();

        assert!(after_second.credential.is_none());
        assert_eq!(after_first.epoch, after_second.epoch);
    }

    #[test]
    fn test_clear_on_empty_store_is_noop() {
        let store = CredentialStore::ephemeral();
        let before = store.epoch();
        assert!(!store.clear());
        assert_eq!(store.epoch(), before);
    }

    #[test]
    fn test_invalidate_only_first_caller_wins() {
        let store = CredentialStore::ephemeral();
        let epoch = store.set("tok", Role::Friend, "mia");

        assert!(store.invalidate(epoch));
        assert!(!store.invalidate(epoch));
        assert!(store.get().is_none());
    }

    #[test]
    fn test_invalidate_stale_epoch_keeps_new_session() {
        let store = CredentialStore::ephemeral();
        let old = store.set("old", Role::Friend, "mia");
        let new = store.set("new", Role::Friend, "mia");
        assert_ne!(old, new);

        assert!(!store.invalidate(old));
        assert_eq!(store.get().unwrap().token, "new");
    }

    #[test]
    fn test_invalidate_concurrent_threads_collapse() {
        let store = Arc::new(CredentialStore::ephemeral());
        let epoch = store.set("tok", Role::Admin, "sam");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = store.clone();
                std::thread::spawn(move || store.invalidate(epoch))
            })
            .collect();
        let wins = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|won| *won)
            .count();

        assert_eq!(wins, 1);
    }

    #[test]
    fn test_reconcile_role() {
        let store = CredentialStore::ephemeral();
        let epoch = store.set("tok", Role::Admin, "sam");

        assert!(!store.reconcile_role(epoch, Role::Admin));
        assert!(store.reconcile_role(epoch, Role::Friend));
        assert_eq!(store.get().unwrap().role, Role::Friend);
        assert_eq!(store.epoch(), epoch);

        store.clear();
        assert!(!store.reconcile_role(epoch, Role::Admin));
    }

    #[test]
    fn test_partial_persisted_session_is_no_session() {
        let backend = MemoryBackend::with_entries(&[(TOKEN_KEY, "tok"), (ROLE_KEY, "ADMIN")]);
        let store = CredentialStore::open(backend);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_unknown_persisted_role_is_no_session() {
        let backend = MemoryBackend::with_entries(&[
            (TOKEN_KEY, "tok"),
            (ROLE_KEY, "GUEST"),
            (USERNAME_KEY, "x"),
        ]);
        let store = CredentialStore::open(backend);
        assert!(store.get().is_none());
    }

    #[test]
    fn test_session_survives_reopen() {
        let dir = std::env::temp_dir().join(format!("hearth-store-{}", std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);

        {
            let store = CredentialStore::open(FileBackend::new(dir.clone()));
            store.set("tok", Role::Friend, "mia");
        }

        let reopened = CredentialStore::open(FileBackend::new(dir.clone()));
        let cred = reopened.get().unwrap();
        assert_eq!(cred.token, "tok");
        assert_eq!(cred.role, Role::Friend);

        reopened.clear();
        let again = CredentialStore::open(FileBackend::new(dir.clone()));
        assert!(again.get().is_none());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_subscribers_see_invalidation() {
        let store = CredentialStore::ephemeral();
        let epoch = store.set("tok", Role::Friend, "mia");
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        store.invalidate(epoch);
        rx.changed().await.unwrap();
        assert!(!rx.borrow().is_active());
    }
}
