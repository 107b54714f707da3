//! Access gate for role-restricted views.
//!
//! Each protected navigation runs the guard from scratch:
//!
//! ```text
//! Unknown ──no credential──────────────▶ Unauthenticated
//!    │
//!    └──credential──▶ Verifying ──/auth/me ok──▶ Authenticated(role)
//!                         │
//!                         └──any failure──▶ Unauthenticated
//! ```
//!
//! The role comes from the server, never from the cached credential. A
//! verified role outside the view's allow-list is an access-denied outcome
//! that keeps the session.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::ApiClient;
use crate::models::{Role, UserInfo};
use crate::nav::Route;

use super::{CredentialStore, SessionEpoch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not checked yet for this navigation
    Unknown,
    Unauthenticated,
    Verifying,
    Authenticated(Role),
}

/// What a protected view should do after the guard has run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardOutcome {
    /// Render the view for this user
    Granted(UserInfo),
    /// Valid session, wrong role: show access denied in place
    Denied { role: Role },
    /// No valid session: go to the login view
    RedirectToLogin,
}

impl GuardOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, GuardOutcome::Granted(_))
    }
}

pub struct SessionGuard {
    client: ApiClient,
    store: Arc<CredentialStore>,
    state: SessionState,
    verified: Option<SessionEpoch>,
}

impl SessionGuard {
    pub fn new(client: ApiClient) -> Self {
        let store = client.credentials().clone();
        Self {
            client,
            store,
            state: SessionState::Unknown,
            verified: None,
        }
    }

    /// Current state, re-derived from the store on every read. A session
    /// that was invalidated after verification reads as `Unauthenticated`.
    pub fn state(&self) -> SessionState {
        match self.state {
            SessionState::Authenticated(role) => {
                let slot = self.store.snapshot();
                let still_valid = self.verified == Some(slot.epoch)
                    && slot.credential.is_some_and(|c| c.role == role);
                if still_valid {
                    SessionState::Authenticated(role)
                } else {
                    SessionState::Unauthenticated
                }
            }
            other => other,
        }
    }

    pub async fn enter_route(&mut self, route: Route) -> GuardOutcome {
        debug!(path = route.path(), "Guarding route");
        self.enter(route.allowed_roles()).await
    }

    /// Resolve access for a view that admits `allowed` roles.
    pub async fn enter(&mut self, allowed: &[Role]) -> GuardOutcome {
        self.verified = None;
        self.transition(SessionState::Unknown);

        let slot = self.store.snapshot();
        if slot.credential.is_none() {
            self.transition(SessionState::Unauthenticated);
            return GuardOutcome::RedirectToLogin;
        }

        self.transition(SessionState::Verifying);
        let result = self.client.me().await;

        // The store may have changed while we were waiting
        let current = self.store.snapshot();
        match result {
            Ok(user) if current.epoch == slot.epoch && current.is_active() => {
                self.store.reconcile_role(slot.epoch, user.role);
                self.verified = Some(slot.epoch);
                self.transition(SessionState::Authenticated(user.role));

                if allowed.contains(&user.role) {
                    GuardOutcome::Granted(user)
                } else {
                    info!(role = %user.role, ?allowed, "Access denied");
                    GuardOutcome::Denied { role: user.role }
                }
            }
            Ok(_) => {
                debug!("Session changed during verification");
                self.transition(SessionState::Unauthenticated);
                GuardOutcome::RedirectToLogin
            }
            Err(e) => {
                warn!(error = %e, "Session verification failed");
                self.store.invalidate(slot.epoch);
                self.transition(SessionState::Unauthenticated);
                GuardOutcome::RedirectToLogin
            }
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "Session state");
        self.state = next;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::{AdminPage, FriendPage};
    use crate::testing::{harness, Reply};

    #[tokio::test]
    async fn test_no_credential_skips_verification() {
        let h = harness();
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Admin]).await;

        assert_eq!(outcome, GuardOutcome::RedirectToLogin);
        assert_eq!(guard.state(), SessionState::Unauthenticated);
        assert_eq!(h.exchange.call_count("/auth/me"), 0);
    }

    #[tokio::test]
    async fn test_granted_uses_server_role() {
        let h = harness();
        h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::me("ADMIN"));
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Admin]).await;

        assert!(outcome.is_granted());
        assert_eq!(guard.state(), SessionState::Authenticated(Role::Admin));
        // cached role follows the server
        assert_eq!(h.store.get().unwrap().role, Role::Admin);
    }

    #[tokio::test]
    async fn test_server_role_wins_even_when_denying() {
        let h = harness();
        h.store.set("tok", Role::Admin, "sam");
        h.exchange.push("GET /auth/me", Reply::me("FRIEND"));
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Admin]).await;
        assert_eq!(outcome, GuardOutcome::Denied { role: Role::Friend });
    }

    #[tokio::test]
    async fn test_friend_on_admin_view_is_denied_and_keeps_session() {
        let mut h = harness();
        h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::me("FRIEND"));
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter_route(Route::Admin(AdminPage::Audit)).await;

        assert_eq!(outcome, GuardOutcome::Denied { role: Role::Friend });
        assert_eq!(guard.state(), SessionState::Authenticated(Role::Friend));
        let cred = h.store.get().unwrap();
        assert_eq!(cred.role, Role::Friend);
        assert_eq!(cred.token, "tok");
        assert!(h.events.try_next().is_none());
    }

    #[tokio::test]
    async fn test_verification_failure_fails_closed() {
        let h = harness();
        h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::Unreachable);
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Friend]).await;

        assert_eq!(outcome, GuardOutcome::RedirectToLogin);
        assert_eq!(guard.state(), SessionState::Unauthenticated);
        assert!(h.store.get().is_none());
    }

    #[tokio::test]
    async fn test_rejected_credential_clears_once() {
        let mut h = harness();
        h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::status(401));
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Friend]).await;

        assert_eq!(outcome, GuardOutcome::RedirectToLogin);
        assert!(h.store.get().is_none());
        assert_eq!(h.events.drain(), vec![Route::Login]);
    }

    #[tokio::test]
    async fn test_invalidation_forces_state_out_of_authenticated() {
        let h = harness();
        let epoch = h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::me("FRIEND"));
        let mut guard = SessionGuard::new(h.client.clone());

        guard.enter_route(Route::Friend(FriendPage::Todos)).await;
        assert_eq!(guard.state(), SessionState::Authenticated(Role::Friend));

        h.store.invalidate(epoch);
        assert_eq!(guard.state(), SessionState::Unauthenticated);
    }

    #[tokio::test]
    async fn test_session_replaced_during_verification() {
        let h = harness();
        h.store.set("old", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::me("FRIEND"));
        let store = h.store.clone();
        h.exchange.on_execute(move |_| {
            store.set("new", Role::Admin, "sam");
        });
        let mut guard = SessionGuard::new(h.client.clone());

        let outcome = guard.enter(&[Role::Friend]).await;

        assert_eq!(outcome, GuardOutcome::RedirectToLogin);
        // the newer session is not ours to clear
        assert_eq!(h.store.get().unwrap().token, "new");
    }

    #[tokio::test]
    async fn test_every_entry_reverifies() {
        let h = harness();
        h.store.set("tok", Role::Friend, "mia");
        h.exchange.push("GET /auth/me", Reply::me("FRIEND"));
        let mut guard = SessionGuard::new(h.client.clone());

        guard.enter(&[Role::Friend]).await;
        guard.enter(&[Role::Friend]).await;
        guard.enter(&[Role::Friend]).await;

        assert_eq!(h.exchange.call_count("/auth/me"), 3);
    }
}
