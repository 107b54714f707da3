//! Unread-message notifications.
//!
//! `UnreadSnapshot` holds the badge/toast rules; `PollerHandle` runs the
//! background task that feeds it.

pub mod poller;
pub mod tracker;

pub use poller::{
    PollerConfig, PollerHandle, UnreadEvent, DEFAULT_POLL_INTERVAL, DEFAULT_TOAST_DURATION,
};
pub use tracker::UnreadSnapshot;
