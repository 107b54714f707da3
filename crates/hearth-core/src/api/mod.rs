//! Authenticated transport for the hearth REST API.
//!
//! `ApiClient` wraps every outbound call in an interceptor chain that
//! attaches the current bearer credential and watches responses for a
//! rejected credential. The wire itself sits behind the `Exchange` trait so
//! the chain can be exercised without a server.

pub mod client;
pub mod error;
pub mod exchange;
pub mod interceptor;

pub use client::{ApiClient, MESSAGE_PAGE_SIZE};
pub use error::ApiError;
pub use exchange::{ApiRequest, ApiResponse, Exchange, HttpExchange};
pub use interceptor::{BearerAuth, Interceptor, RequestLog, SessionTerminator};
