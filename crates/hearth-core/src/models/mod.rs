//! Data models shared by the client and the REST API.
//!
//! - `Role`, `Credential`: who is logged in
//! - `LoginRequest`, `LoginResponse`, `UserInfo`: auth endpoint payloads
//! - `Message`, `MessageCreate`, `UnreadCount`: message wall payloads

pub mod message;
pub mod user;

pub use message::{Message, MessageCreate, UnreadCount, MAX_MESSAGE_LENGTH};
pub use user::{Credential, LoginRequest, LoginResponse, Role, UserInfo};
