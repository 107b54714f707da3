//! The authenticated shell: the scope that owns the unread poller.
//!
//! Every navigation into a protected route goes through the session guard.
//! A granted route keeps (or starts) the poller for the verified session;
//! a redirect to login, a logout, or dropping the shell releases it.

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::auth::{self, GuardOutcome, SessionGuard, SessionState};
use crate::models::{Role, UserInfo};
use crate::nav::Route;
use crate::notify::{PollerConfig, PollerHandle, UnreadEvent, UnreadSnapshot};

/// What the caller should show after a navigation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewOutcome {
    Login,
    Rendered { route: Route, user: UserInfo },
    Denied { route: Route, role: Role },
}

pub struct Shell {
    client: ApiClient,
    guard: SessionGuard,
    poller_config: PollerConfig,
    poller: Option<PollerHandle>,
    unread_tx: mpsc::UnboundedSender<UnreadEvent>,
    current: Route,
}

impl Shell {
    pub fn new(
        client: ApiClient,
        poller_config: PollerConfig,
        unread_tx: mpsc::UnboundedSender<UnreadEvent>,
    ) -> Self {
        Self {
            guard: SessionGuard::new(client.clone()),
            client,
            poller_config,
            poller: None,
            unread_tx,
            current: Route::Login,
        }
    }

    pub fn current(&self) -> Route {
        self.current
    }

    pub fn session_state(&self) -> SessionState {
        self.guard.state()
    }

    /// Unread state, if the poller is running
    pub fn unread(&self) -> Option<UnreadSnapshot> {
        self.poller.as_ref().map(PollerHandle::snapshot)
    }

    pub fn dismiss_toast(&self) {
        if let Some(ref poller) = self.poller {
            poller.dismiss_toast();
        }
    }

    pub fn is_polling(&self) -> bool {
        self.poller.as_ref().is_some_and(PollerHandle::is_running)
    }

    pub async fn navigate(&mut self, route: Route) -> ViewOutcome {
        if !route.is_protected() {
            self.leave();
            return ViewOutcome::Login;
        }

        match self.guard.enter_route(route).await {
            GuardOutcome::RedirectToLogin => {
                self.leave();
                ViewOutcome::Login
            }
            GuardOutcome::Denied { role } => ViewOutcome::Denied { route, role },
            GuardOutcome::Granted(user) => {
                self.ensure_poller();
                if route.is_message_view() {
                    self.enter_message_view().await;
                }
                self.current = route;
                ViewOutcome::Rendered { route, user }
            }
        }
    }

    /// A forced redirect arrived from the transport
    pub fn handle_redirect(&mut self, route: Route) {
        if route == Route::Login {
            self.leave();
        }
    }

    pub fn logout(&mut self) -> bool {
        self.leave();
        auth::logout(self.client.credentials())
    }

    fn leave(&mut self) {
        if let Some(poller) = self.poller.take() {
            debug!("Leaving authenticated shell");
            poller.shutdown();
        }
        self.current = Route::Login;
    }

    fn ensure_poller(&mut self) {
        let epoch = self.client.credentials().epoch();
        let current = self
            .poller
            .as_ref()
            .is_some_and(|p| p.is_running() && p.epoch() == epoch);
        if current {
            return;
        }

        self.poller = PollerHandle::spawn(
            self.client.clone(),
            self.poller_config,
            self.unread_tx.clone(),
        );
    }

    /// Clear the badge locally first; the server acknowledgement is best effort.
    async fn enter_message_view(&self) {
        if let Some(ref poller) = self.poller {
            poller.reset();
        }
        if let Err(e) = self.client.mark_read().await {
            warn!(error = %e, "Failed to mark messages read");
        }
    }
}
