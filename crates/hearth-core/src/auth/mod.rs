//! Session management and access control.
//!
//! This module provides:
//! - `CredentialStore`: the one process-wide holder of the current credential
//! - `CredentialBackend`: durable storage (file, OS keychain, memory)
//! - `SessionGuard`: per-navigation verification and role gating
//! - `login` / `logout`
//!
//! Sessions persist across restarts until logout or until the server
//! rejects the token.

pub mod backend;
pub mod credentials;
pub mod guard;
pub mod session;

pub use backend::{CredentialBackend, FileBackend, KeyringBackend, MemoryBackend};
pub use credentials::{CredentialStore, SessionEpoch, SessionSlot};
pub use guard::{GuardOutcome, SessionGuard, SessionState};
pub use session::{login, logout, AuthError, LoginOutcome};
