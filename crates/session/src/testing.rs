//! Scripted transport for unit tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use storefront_session_core::AuthTokens;
use tokio::sync::Semaphore;

use crate::store::{MemorySessionStore, StoreKeys};
use crate::tokens::TokenStore;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, TransportError};

type Reply = Result<ApiResponse, TransportError>;

/// Replies are queued per path and consumed in order. An unscripted path
/// answers 404.
#[derive(Default)]
pub struct ScriptedTransport {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<ApiRequest>>,
    gates: Mutex<HashMap<String, Arc<Semaphore>>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn reply(&self, path: &str, reply: Reply) {
        self.replies
            .lock()
            .unwrap()
            .entry(path.to_owned())
            .or_default()
            .push_back(reply);
    }

    pub fn ok(&self, path: &str, body: Value) {
        self.reply(path, Ok(ApiResponse::ok(body)));
    }

    pub fn status(&self, path: &str, status: u16) {
        self.reply(path, Err(TransportError::from_status(status, None)));
    }

    /// Requests to `path` wait until [`ScriptedTransport::release`].
    pub fn hold(&self, path: &str) {
        self.gates
            .lock()
            .unwrap()
            .insert(path.to_owned(), Arc::new(Semaphore::new(0)));
    }

    pub fn release(&self, path: &str) {
        if let Some(gate) = self.gates.lock().unwrap().get(path) {
            gate.add_permits(Semaphore::MAX_PERMITS / 2);
        }
    }

    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path == path)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: ApiRequest) -> Result<ApiResponse, TransportError> {
        let path = request.path.clone();
        self.calls.lock().unwrap().push(request);

        let gate = self.gates.lock().unwrap().get(&path).cloned();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }

        self.replies
            .lock()
            .unwrap()
            .get_mut(&path)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(TransportError::from_status(404, None)))
    }
}

/// `{success: true, data: {...token grant...}}`
pub fn grant(access: &str, refresh: &str, expires_in: i64) -> Value {
    json!({
        "success": true,
        "data": {
            "access_token": access,
            "refresh_token": refresh,
            "expires_in": expires_in,
        }
    })
}

pub fn tokens(access: &str, refresh: &str) -> AuthTokens {
    AuthTokens::issue(access, refresh, None, 3600, Utc::now()).unwrap()
}

pub fn token_store() -> (Arc<MemorySessionStore>, Arc<TokenStore>) {
    let backing = Arc::new(MemorySessionStore::new());
    let store = Arc::new(TokenStore::new(backing.clone(), StoreKeys::default()));
    (backing, store)
}
