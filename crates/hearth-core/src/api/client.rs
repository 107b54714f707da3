//! API client for the hearth REST backend.
//!
//! Every call goes through the same path: the interceptor chain decorates
//! the request, the `Exchange` puts it on the wire, the chain inspects the
//! raw response, and only then are error statuses mapped to `ApiError`.
//! Nothing is retried.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::auth::CredentialStore;
use crate::models::{LoginRequest, LoginResponse, Message, MessageCreate, UnreadCount, UserInfo};
use crate::nav::Navigator;

use super::exchange::{ApiRequest, ApiResponse, Exchange, HttpExchange};
use super::interceptor::{BearerAuth, Interceptor, RequestLog, SessionTerminator};
use super::ApiError;

/// Default page size for the message wall
pub const MESSAGE_PAGE_SIZE: u32 = 100;

/// Authenticated transport.
/// Clone is cheap - the exchange, store and chain are shared.
#[derive(Clone)]
pub struct ApiClient {
    exchange: Arc<dyn Exchange>,
    credentials: Arc<CredentialStore>,
    interceptors: Arc<[Arc<dyn Interceptor>]>,
}

impl ApiClient {
    /// Create a client talking HTTP to `base_url`
    pub fn new(
        base_url: &str,
        credentials: Arc<CredentialStore>,
        navigator: Navigator,
    ) -> Result<Self, ApiError> {
        let exchange = HttpExchange::new(base_url)?;
        Ok(Self::with_exchange(Arc::new(exchange), credentials, navigator))
    }

    /// Create a client over any exchange, with the standard chain:
    /// logging, bearer credential, session termination on 401.
    pub fn with_exchange(
        exchange: Arc<dyn Exchange>,
        credentials: Arc<CredentialStore>,
        navigator: Navigator,
    ) -> Self {
        let interceptors: Vec<Arc<dyn Interceptor>> = vec![
            Arc::new(BearerAuth::new(credentials.clone())),
            Arc::new(SessionTerminator::new(credentials.clone(), navigator)),
            Arc::new(RequestLog),
        ];
        Self::with_interceptors(exchange, credentials, interceptors)
    }

    pub fn with_interceptors(
        exchange: Arc<dyn Exchange>,
        credentials: Arc<CredentialStore>,
        interceptors: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        Self {
            exchange,
            credentials,
            interceptors: interceptors.into(),
        }
    }

    pub fn credentials(&self) -> &Arc<CredentialStore> {
        &self.credentials
    }

    /// Run one request through the chain.
    pub async fn send(&self, mut request: ApiRequest) -> Result<ApiResponse, ApiError> {
        for interceptor in self.interceptors.iter() {
            interceptor.before_send(&mut request);
        }

        let outcome = self.exchange.execute(&request).await;

        for interceptor in self.interceptors.iter().rev() {
            interceptor.after_receive(&request, outcome.as_ref());
        }

        let response = outcome?;
        if response.status.is_success() {
            Ok(response)
        } else {
            Err(ApiError::from_status(response.status, &response.body))
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, ApiError> {
        let path = request.path.clone();
        let response = self.send(request).await?;
        serde_json::from_str(&response.body).map_err(|e| {
            ApiError::InvalidResponse(format!("Failed to parse JSON response from {}: {}", path, e))
        })
    }

    fn body<B: Serialize>(body: &B) -> Result<serde_json::Value, ApiError> {
        serde_json::to_value(body)
            .map_err(|e| ApiError::InvalidResponse(format!("Failed to encode request: {}", e)))
    }

    // ===== Auth =====

    /// Exchange username and password for a token. Does not touch the store.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        let body = Self::body(&LoginRequest {
            username: username.to_string(),
            password: password.to_string(),
        })?;
        self.send_json(ApiRequest::post("/auth/login").json(body)).await
    }

    /// Ask the server who the current credential belongs to
    pub async fn me(&self) -> Result<UserInfo, ApiError> {
        self.send_json(ApiRequest::get("/auth/me")).await
    }

    // ===== Messages =====

    pub async fn unread_count(&self) -> Result<u64, ApiError> {
        let count: UnreadCount = self
            .send_json(ApiRequest::get("/messages/unread_count"))
            .await?;
        Ok(count.unread)
    }

    pub async fn mark_read(&self) -> Result<(), ApiError> {
        self.send(ApiRequest::post("/messages/mark_read")).await?;
        debug!("Messages marked read");
        Ok(())
    }

    pub async fn list_messages(&self, limit: u32, offset: u32) -> Result<Vec<Message>, ApiError> {
        let request = ApiRequest::get("/messages")
            .query("limit", limit)
            .query("offset", offset);
        self.send_json(request).await
    }

    pub async fn post_message(&self, message: &MessageCreate) -> Result<Message, ApiError> {
        let body = Self::body(message)?;
        self.send_json(ApiRequest::post("/messages").json(body)).await
    }
}
