//! Core library for the hearth client.
//!
//! Session handling, the authenticated API transport, route access control
//! and unread-message polling. Front ends (the `hearth` CLI) drive a
//! [`Shell`] and render what it reports.

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod nav;
pub mod notify;
pub mod shell;

#[cfg(test)]
mod testing;

pub use api::{ApiClient, ApiError};
pub use auth::{CredentialStore, GuardOutcome, SessionGuard, SessionState};
pub use config::Config;
pub use nav::{NavigationEvents, Navigator, Route};
pub use notify::{PollerConfig, PollerHandle, UnreadEvent, UnreadSnapshot};
pub use shell::{Shell, ViewOutcome};
