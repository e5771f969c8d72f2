//! Scripted in-memory transport for unit tests

use parking_lot::Mutex;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthMode, User};
use crate::error::{Error, Result};
use crate::transport::{Method, RawResponse, Transport};

/// One request as seen by the mock
#[derive(Debug, Clone)]
pub struct Call {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    pub server_root: bool,
    pub mode: AuthMode,
}

#[derive(Default)]
struct State {
    data: HashMap<(Method, String), VecDeque<Result<Value>>>,
    raw: HashMap<(Method, String), VecDeque<Result<RawResponse>>>,
    calls: Vec<Call>,
    mode: AuthMode,
    user: User,
    url: String,
    timeout: Duration,
}

#[derive(Default)]
pub struct MockTransport {
    state: Mutex<State>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_auth(user: User, mode: AuthMode) -> Arc<Self> {
        let mock = Self::default();
        {
            let mut state = mock.state.lock();
            state.user = user;
            state.mode = mode;
        }
        Arc::new(mock)
    }

    pub fn respond(&self, method: Method, path: &str, response: Result<Value>) {
        self.state
            .lock()
            .data
            .entry((method, path.to_string()))
            .or_default()
            .push_back(response);
    }

    pub fn respond_status(&self, method: Method, path: &str, status: u16) {
        self.state
            .lock()
            .raw
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Ok(RawResponse {
                status,
                headers: HashMap::new(),
            }));
    }

    pub fn respond_raw_error(&self, method: Method, path: &str, error: Error) {
        self.state
            .lock()
            .raw
            .entry((method, path.to_string()))
            .or_default()
            .push_back(Err(error));
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    fn record(&self, state: &mut State, method: Method, path: &str, body: Option<&Value>, server_root: bool) {
        let mode = state.mode;
        state.calls.push(Call {
            method,
            path: path.to_string(),
            body: body.cloned(),
            server_root,
            mode,
        });
    }
}

#[async_trait::async_trait]
impl Transport for MockTransport {
    async fn get_data(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        server_root: bool,
    ) -> Result<Value> {
        let mut state = self.state.lock();
        self.record(&mut state, method, path, body, server_root);
        state
            .data
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(Error::Transport(format!("no response scripted for {} {}", method, path))))
    }

    async fn get_raw_data(&self, path: &str, method: Method) -> Result<RawResponse> {
        let mut state = self.state.lock();
        self.record(&mut state, method, path, None, false);
        state
            .raw
            .get_mut(&(method, path.to_string()))
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(Error::Transport(format!("no response scripted for {} {}", method, path))))
    }

    fn timeout(&self) -> Duration {
        self.state.lock().timeout
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.lock().timeout = timeout;
    }

    fn auth_mode(&self) -> AuthMode {
        self.state.lock().mode
    }

    fn set_auth_mode(&self, mode: AuthMode) {
        self.state.lock().mode = mode;
    }

    fn user(&self) -> User {
        self.state.lock().user.clone()
    }

    fn set_user(&self, user: User) {
        self.state.lock().user = user;
    }

    fn server_url(&self) -> String {
        self.state.lock().url.clone()
    }

    fn set_server_url(&self, url: &str) -> Result<()> {
        self.state.lock().url = url.to_string();
        Ok(())
    }
}
