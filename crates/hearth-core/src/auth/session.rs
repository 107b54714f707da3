//! Login and logout.

use thiserror::Error;
use tracing::{error, info};

use crate::api::{ApiClient, ApiError};
use crate::models::Role;
use crate::nav::Route;

use super::{CredentialStore, SessionEpoch};

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Username and password required")]
    MissingCredentials,

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl AuthError {
    /// Message suitable for showing next to a login form
    pub fn user_message(&self) -> String {
        match self {
            AuthError::MissingCredentials | AuthError::InvalidCredentials => self.to_string(),
            AuthError::Api(ApiError::NetworkError(e)) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            AuthError::Api(ApiError::NetworkError(_)) => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            AuthError::Api(ApiError::RateLimited) => {
                "Too many login attempts. Please wait and try again.".to_string()
            }
            AuthError::Api(e) => format!("Login failed: {}", e),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoginOutcome {
    pub role: Role,
    pub epoch: SessionEpoch,
    /// Where the user should land
    pub landing: Route,
}

/// Authenticate and, on success, store the new credential.
pub async fn login(
    client: &ApiClient,
    username: &str,
    password: &str,
) -> Result<LoginOutcome, AuthError> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err(AuthError::MissingCredentials);
    }

    let response = match client.login(username, password).await {
        Ok(response) => response,
        Err(ApiError::Unauthorized) => {
            error!(user = username, "Login rejected");
            return Err(AuthError::InvalidCredentials);
        }
        Err(e) => {
            error!(error = %e, "Login failed");
            return Err(e.into());
        }
    };

    let epoch = client
        .credentials()
        .set(response.access_token, response.role, username);
    info!(role = %response.role, "Login successful");

    Ok(LoginOutcome {
        role: response.role,
        epoch,
        landing: Route::landing(response.role),
    })
}

/// End the current session. Safe to call when already logged out.
pub fn logout(store: &CredentialStore) -> bool {
    let ended = store.clear();
    if ended {
        info!("Logged out");
    }
    ended
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nav::{AdminPage, FriendPage};
    use crate::testing::{harness, Reply};

    #[tokio::test]
    async fn test_login_stores_credential() {
        let h = harness();
        h.exchange.push(
            "POST /auth/login",
            Reply::ok(r#"{"access_token":"abc","token_type":"bearer","role":"FRIEND"}"#),
        );

        let outcome = login(&h.client, " mia ", "pw").await.unwrap();

        assert_eq!(outcome.landing, Route::Friend(FriendPage::Countdown));
        let cred = h.store.get().unwrap();
        assert_eq!(cred.token, "abc");
        assert_eq!(cred.role, Role::Friend);
        assert_eq!(cred.display_name, "mia");
    }

    #[tokio::test]
    async fn test_admin_lands_on_overview() {
        let h = harness();
        h.exchange.push(
            "POST /auth/login",
            Reply::ok(r#"{"access_token":"abc","token_type":"bearer","role":"ADMIN"}"#),
        );
        let outcome = login(&h.client, "sam", "pw").await.unwrap();
        assert_eq!(outcome.landing, Route::Admin(AdminPage::Overview));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let h = harness();
        h.exchange.push("POST /auth/login", Reply::status(401));

        let err = login(&h.client, "mia", "wrong").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidCredentials));
        assert_eq!(err.user_message(), "Invalid username or password");
        assert!(h.store.get().is_none());
    }

    #[tokio::test]
    async fn test_login_requires_both_fields() {
        let h = harness();
        assert!(matches!(
            login(&h.client, "  ", "pw").await,
            Err(AuthError::MissingCredentials)
        ));
        assert!(matches!(
            login(&h.client, "mia", "").await,
            Err(AuthError::MissingCredentials)
        ));
        assert!(h.exchange.calls().is_empty());
    }

    #[test]
    fn test_logout_twice_same_end_state() {
        let store = CredentialStore::ephemeral();
        store.set("tok", Role::Friend, "mia");

        assert!(logout(&store));
        let once = store.snapshot();
        assert!(!logout(&store));
        let twice = store.snapshot();

        assert!(twice.credential.is_none());
        assert_eq!(once.epoch, twice.epoch);
    }
}
