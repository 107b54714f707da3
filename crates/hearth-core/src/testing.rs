//! Test doubles shared by the unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reqwest::StatusCode;

use crate::api::{ApiClient, ApiError, ApiRequest, ApiResponse, Exchange};
use crate::auth::CredentialStore;
use crate::nav::{self, NavigationEvents};

#[derive(Clone)]
pub enum Reply {
    Status(StatusCode, String),
    /// The request never got an HTTP response
    Unreachable,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Reply::Status(StatusCode::OK, body.to_string())
    }

    pub fn status(code: u16) -> Self {
        let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        Reply::Status(status, String::new())
    }

    pub fn unread(count: u64) -> Self {
        Self::ok(&format!(r#"{{"unread": {}}}"#, count))
    }

    pub fn me(role: &str) -> Self {
        Self::ok(&format!(r#"{{"id": 1, "username": "user", "role": "{}"}}"#, role))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub path: String,
    pub bearer: Option<String>,
}

type Hook = Box<dyn FnMut(&ApiRequest) + Send>;

/// Replies from per-route queues. The last queued reply for a route keeps
/// repeating once the queue is down to one entry.
#[derive(Default)]
pub struct ScriptedExchange {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<RecordedCall>>,
    hook: Mutex<Option<Hook>>,
    yields: AtomicUsize,
}

impl ScriptedExchange {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a reply for `"<METHOD> <path>"`, e.g. `"GET /auth/me"`.
    pub fn push(&self, route: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(route.to_string())
            .or_default()
            .push_back(reply);
    }

    /// Number of scheduler yields before each reply, to keep concurrent
    /// requests in flight together.
    pub fn set_yields(&self, yields: usize) {
        self.yields.store(yields, Ordering::SeqCst);
    }

    /// Run `hook` while each request is in flight
    pub fn on_execute(&self, hook: impl FnMut(&ApiRequest) + Send + 'static) {
        *self.hook.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.path == path)
            .count()
    }

    fn next_reply(&self, route: &str) -> Reply {
        let mut replies = self.replies.lock().unwrap();
        match replies.get_mut(route) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue.front().cloned().unwrap_or_else(|| Reply::status(404)),
            None => Reply::status(404),
        }
    }
}

#[async_trait]
impl Exchange for ScriptedExchange {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: request.method.to_string(),
            path: request.path.clone(),
            bearer: request.bearer.clone(),
        });

        for _ in 0..self.yields.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }

        if let Some(hook) = self.hook.lock().unwrap().as_mut() {
            hook(request);
        }

        let route = format!("{} {}", request.method, request.path);
        match self.next_reply(&route) {
            Reply::Status(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::Unreachable => Err(ApiError::InvalidResponse("connection refused".into())),
        }
    }
}

pub struct Harness {
    pub exchange: Arc<ScriptedExchange>,
    pub store: Arc<CredentialStore>,
    pub client: ApiClient,
    pub events: NavigationEvents,
}

pub fn harness() -> Harness {
    let exchange = ScriptedExchange::new();
    let store = Arc::new(CredentialStore::ephemeral());
    let (navigator, events) = nav::channel();
    let client = ApiClient::with_exchange(exchange.clone(), store.clone(), navigator);
    Harness {
        exchange,
        store,
        client,
        events,
    }
}
