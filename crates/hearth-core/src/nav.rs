//! Route table and client-side navigation.
//!
//! Routes mirror the site's views. Protected routes declare which roles may
//! see them; the session guard enforces that list. Navigation requests
//! (including the forced redirect after a rejected credential) are sent on
//! an unbounded channel that the running shell drains.

use tokio::sync::mpsc;
use tracing::debug;

use crate::models::Role;

/// Views reachable by the `ADMIN` role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdminPage {
    Overview,
    Audit,
    FriendTodos,
    FriendMessages,
    Photos,
}

/// Views reachable by the `FRIEND` role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FriendPage {
    Countdown,
    Pictures,
    Messages,
    Todos,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Route {
    Login,
    Admin(AdminPage),
    Friend(FriendPage),
}

const ADMIN_ONLY: &[Role] = &[Role::Admin];
const FRIEND_ONLY: &[Role] = &[Role::Friend];

impl Route {
    /// Resolve a path. Section roots land on their index page; `/` and
    /// anything unknown go to the login view.
    pub fn parse(path: &str) -> Self {
        let path = path.trim().trim_end_matches('/');
        match path {
            "/admin" | "/admin/overview" => Route::Admin(AdminPage::Overview),
            "/admin/audit" => Route::Admin(AdminPage::Audit),
            "/admin/friend-todos" => Route::Admin(AdminPage::FriendTodos),
            "/admin/friend-messages" => Route::Admin(AdminPage::FriendMessages),
            "/admin/photos" => Route::Admin(AdminPage::Photos),
            "/app" | "/app/countdown" => Route::Friend(FriendPage::Countdown),
            "/app/pictures" => Route::Friend(FriendPage::Pictures),
            "/app/messages" => Route::Friend(FriendPage::Messages),
            "/app/todos" => Route::Friend(FriendPage::Todos),
            _ => Route::Login,
        }
    }

    pub fn path(&self) -> &'static str {
        match self {
            Route::Login => "/login",
            Route::Admin(AdminPage::Overview) => "/admin/overview",
            Route::Admin(AdminPage::Audit) => "/admin/audit",
            Route::Admin(AdminPage::FriendTodos) => "/admin/friend-todos",
            Route::Admin(AdminPage::FriendMessages) => "/admin/friend-messages",
            Route::Admin(AdminPage::Photos) => "/admin/photos",
            Route::Friend(FriendPage::Countdown) => "/app/countdown",
            Route::Friend(FriendPage::Pictures) => "/app/pictures",
            Route::Friend(FriendPage::Messages) => "/app/messages",
            Route::Friend(FriendPage::Todos) => "/app/todos",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Route::Login => "Login",
            Route::Admin(AdminPage::Overview) => "Overview",
            Route::Admin(AdminPage::Audit) => "Audit Log",
            Route::Admin(AdminPage::FriendTodos) => "Friend's Todos",
            Route::Admin(AdminPage::FriendMessages) => "Message Wall",
            Route::Admin(AdminPage::Photos) => "Photo Review",
            Route::Friend(FriendPage::Countdown) => "Countdown",
            Route::Friend(FriendPage::Pictures) => "Pictures",
            Route::Friend(FriendPage::Messages) => "Message Wall",
            Route::Friend(FriendPage::Todos) => "Todos",
        }
    }

    /// Roles allowed to render this route. Empty for public routes.
    pub fn allowed_roles(&self) -> &'static [Role] {
        match self {
            Route::Login => &[],
            Route::Admin(_) => ADMIN_ONLY,
            Route::Friend(_) => FRIEND_ONLY,
        }
    }

    pub fn is_protected(&self) -> bool {
        !self.allowed_roles().is_empty()
    }

    /// Entering one of these resets the unread badge
    pub fn is_message_view(&self) -> bool {
        matches!(
            self,
            Route::Friend(FriendPage::Messages) | Route::Admin(AdminPage::FriendMessages)
        )
    }

    /// Where a freshly logged-in user lands
    pub fn landing(role: Role) -> Self {
        match role {
            Role::Admin => Route::Admin(AdminPage::Overview),
            Role::Friend => Route::Friend(FriendPage::Countdown),
        }
    }

    /// Every navigable page for a role, in menu order
    pub fn menu(role: Role) -> &'static [Route] {
        match role {
            Role::Admin => &[
                Route::Admin(AdminPage::Overview),
                Route::Admin(AdminPage::Audit),
                Route::Admin(AdminPage::FriendTodos),
                Route::Admin(AdminPage::FriendMessages),
            ],
            Role::Friend => &[
                Route::Friend(FriendPage::Countdown),
                Route::Friend(FriendPage::Pictures),
                Route::Friend(FriendPage::Messages),
                Route::Friend(FriendPage::Todos),
            ],
        }
    }
}

/// Sends navigation requests to whoever is driving the views.
#[derive(Clone)]
pub struct Navigator {
    tx: mpsc::UnboundedSender<Route>,
}

impl Navigator {
    pub fn navigate(&self, route: Route) {
        debug!(path = route.path(), "Navigate");
        // A closed receiver means the shell is gone; nothing left to steer.
        let _ = self.tx.send(route);
    }

    pub fn redirect_to_login(&self) {
        self.navigate(Route::Login);
    }
}

/// Receiving end of a `Navigator`
pub struct NavigationEvents {
    rx: mpsc::UnboundedReceiver<Route>,
}

impl NavigationEvents {
    pub async fn next(&mut self) -> Option<Route> {
        self.rx.recv().await
    }

    /// Non-blocking poll, `None` when nothing is queued
    pub fn try_next(&mut self) -> Option<Route> {
        self.rx.try_recv().ok()
    }

    /// Drain everything queued so far
    pub fn drain(&mut self) -> Vec<Route> {
        std::iter::from_fn(|| self.try_next()).collect()
    }
}

pub fn channel() -> (Navigator, NavigationEvents) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Navigator { tx }, NavigationEvents { rx })
}
