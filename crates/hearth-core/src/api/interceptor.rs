//! Request/response middleware for the `ApiClient`.
//!
//! `before_send` hooks run in chain order; `after_receive` hooks run in
//! reverse order and see the raw response before any status mapping.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::auth::CredentialStore;
use crate::nav::Navigator;

use super::exchange::{ApiRequest, ApiResponse};
use super::ApiError;

pub trait Interceptor: Send + Sync {
    fn before_send(&self, _request: &mut ApiRequest) {}

    fn after_receive(&self, _request: &ApiRequest, _outcome: Result<&ApiResponse, &ApiError>) {}
}

/// Attaches the current credential, if any, and remembers which session it
/// came from.
pub struct BearerAuth {
    store: Arc<CredentialStore>,
}

impl BearerAuth {
    pub fn new(store: Arc<CredentialStore>) -> Self {
        Self { store }
    }
}

impl Interceptor for BearerAuth {
    fn before_send(&self, request: &mut ApiRequest) {
        let slot = self.store.snapshot();
        match slot.credential {
            Some(credential) => {
                request.bearer = Some(credential.token);
                request.session = Some(slot.epoch);
            }
            None => {
                request.bearer = None;
                request.session = None;
            }
        }
    }
}

/// Ends the session on a 401 and sends the user to the login view.
///
/// Only the response that actually ends the session redirects. Concurrent
/// rejections of the same session, rejections of a session that has since
/// been replaced, and rejections of anonymous requests are ignored.
pub struct SessionTerminator {
    store: Arc<CredentialStore>,
    navigator: Navigator,
}

impl SessionTerminator {
    pub fn new(store: Arc<CredentialStore>, navigator: Navigator) -> Self {
        Self { store, navigator }
    }
}

impl Interceptor for SessionTerminator {
    fn after_receive(&self, request: &ApiRequest, outcome: Result<&ApiResponse, &ApiError>) {
        let Ok(response) = outcome else {
            return;
        };
        if response.status.as_u16() != 401 {
            return;
        }
        let Some(epoch) = request.session else {
            debug!(path = %request.path, "401 on anonymous request");
            return;
        };

        if self.store.invalidate(epoch) {
            warn!(path = %request.path, "Credential rejected, logging out");
            self.navigator.redirect_to_login();
        }
    }
}

/// Traces every exchange.
pub struct RequestLog;

impl Interceptor for RequestLog {
    fn before_send(&self, request: &mut ApiRequest) {
        debug!(
            method = %request.method,
            path = %request.path,
            authenticated = request.bearer.is_some(),
            "API request"
        );
    }

    fn after_receive(&self, request: &ApiRequest, outcome: Result<&ApiResponse, &ApiError>) {
        match outcome {
            Ok(response) if response.status.is_success() => {
                debug!(path = %request.path, status = response.status.as_u16(), "API response");
            }
            Ok(response) => {
                warn!(
                    path = %request.path,
                    status = response.status.as_u16(),
                    "API error response"
                );
            }
            Err(e) => {
                warn!(path = %request.path, error = %e, "API request failed");
            }
        }
    }
}
