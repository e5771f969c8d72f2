use couchlink_core::transport::{Method, RawResponse, SharedTransport, Transport, TransportFactory};
use couchlink_core::{AuthMode, Error, Result, User};
use parking_lot::RwLock;
use reqwest::header::{HeaderMap, ACCEPT, COOKIE, SET_COOKIE};
use reqwest::{Client as HttpClient, RequestBuilder, StatusCode};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Name of the session cookie issued by `/_session`
const SESSION_COOKIE: &str = "AuthSession";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Mutable session settings, shared by every holder of the transport
struct SessionState {
    server_url: String,
    user: User,
    auth_mode: AuthMode,
    timeout: Duration,
    /// `AuthSession=...` pair captured from the last login
    cookie: Option<String>,
}

/// CouchDB REST transport over reqwest
pub struct HttpTransport {
    client: HttpClient,
    state: RwLock<SessionState>,
}

/// Settings for building [`HttpTransport`]s; also usable as a [`TransportFactory`]
#[derive(Debug, Clone)]
pub struct HttpTransportFactory {
    timeout: Duration,
    insecure_skip_verify: bool,
}

impl Default for HttpTransportFactory {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            insecure_skip_verify: false,
        }
    }
}

impl HttpTransportFactory {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Accept invalid TLS certificates (self-signed development servers)
    pub fn insecure_skip_verify(mut self, skip: bool) -> Self {
        self.insecure_skip_verify = skip;
        self
    }

    pub fn open(&self, url: &str, user: User, mode: AuthMode) -> Result<HttpTransport> {
        validate_url(url)?;

        let client = if self.insecure_skip_verify {
            HttpClient::builder()
                .danger_accept_invalid_certs(true)
                .build()
                .map_err(|e| Error::Transport(e.to_string()))?
        } else {
            HttpClient::new()
        };

        Ok(HttpTransport {
            client,
            state: RwLock::new(SessionState {
                server_url: url.trim_end_matches('/').to_string(),
                user,
                auth_mode: mode,
                timeout: self.timeout,
                cookie: None,
            }),
        })
    }
}

impl TransportFactory for HttpTransportFactory {
    fn build(&self, url: &str, user: User, mode: AuthMode) -> Result<SharedTransport> {
        Ok(Arc::new(self.open(url, user, mode)?))
    }
}

impl HttpTransport {
    pub fn builder() -> HttpTransportFactory {
        HttpTransportFactory::default()
    }

    /// Unauthenticated transport with default settings
    pub fn new(url: &str) -> Result<Self> {
        Self::builder().open(url, User::default(), AuthMode::None)
    }

    /// True when a session cookie from a previous login is held
    pub fn has_session_cookie(&self) -> bool {
        self.state.read().cookie.is_some()
    }

    fn prepare(&self, path: &str, method: Method, server_root: bool) -> Result<RequestBuilder> {
        let state = self.state.read();
        let url = if server_root {
            root_url(&state.server_url, path)?
        } else {
            join_url(&state.server_url, path)
        };

        let mut request = self
            .client
            .request(to_reqwest_method(method), &url)
            .header(ACCEPT, "application/json")
            .timeout(state.timeout);

        match state.auth_mode {
            AuthMode::Basic if !state.user.is_anonymous() => {
                request = request.basic_auth(state.user.username(), Some(state.user.password()));
            }
            AuthMode::Cookie => {
                if let Some(cookie) = &state.cookie {
                    request = request.header(COOKIE, cookie.as_str());
                }
            }
            _ => {}
        }

        tracing::debug!("{} {}", method, url);
        Ok(request)
    }

    fn capture_cookie(&self, headers: &HeaderMap) {
        for value in headers.get_all(SET_COOKIE) {
            let Ok(value) = value.to_str() else {
                continue;
            };
            if let Some(cookie) = session_cookie(value) {
                self.state.write().cookie = (!cookie.is_empty()).then_some(cookie);
            }
        }
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn get_data(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        server_root: bool,
    ) -> Result<Value> {
        let mut request = self.prepare(path, method, server_root)?;
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await.map_err(map_send_error)?;
        self.capture_cookie(response.headers());

        let status = response.status();
        let text = response.text().await.map_err(map_send_error)?;
        classify_response(status, &text)
    }

    async fn get_raw_data(&self, path: &str, method: Method) -> Result<RawResponse> {
        let request = self.prepare(path, method, false)?;
        let response = request.send().await.map_err(map_send_error)?;

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect::<HashMap<_, _>>();

        Ok(RawResponse {
            status: response.status().as_u16(),
            headers,
        })
    }

    fn timeout(&self) -> Duration {
        self.state.read().timeout
    }

    fn set_timeout(&self, timeout: Duration) {
        self.state.write().timeout = timeout;
    }

    fn auth_mode(&self) -> AuthMode {
        self.state.read().auth_mode
    }

    fn set_auth_mode(&self, mode: AuthMode) {
        self.state.write().auth_mode = mode;
    }

    fn user(&self) -> User {
        self.state.read().user.clone()
    }

    fn set_user(&self, user: User) {
        self.state.write().user = user;
    }

    fn server_url(&self) -> String {
        self.state.read().server_url.clone()
    }

    fn set_server_url(&self, url: &str) -> Result<()> {
        validate_url(url)?;
        self.state.write().server_url = url.trim_end_matches('/').to_string();
        Ok(())
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Head => reqwest::Method::HEAD,
        Method::Put => reqwest::Method::PUT,
        Method::Post => reqwest::Method::POST,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn map_send_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout
    } else {
        Error::Transport(e.to_string())
    }
}

fn validate_url(url: &str) -> Result<Url> {
    Url::parse(url).map_err(|e| Error::InvalidUrl(format!("{}: {}", url, e)))
}

fn join_url(base: &str, path: &str) -> String {
    format!("{}{}", base.trim_end_matches('/'), path)
}

/// Address `path` against the scheme/host/port of `base`, dropping any path prefix
fn root_url(base: &str, path: &str) -> Result<String> {
    let url = validate_url(base)?;
    Ok(format!(
        "{}/{}",
        url.origin().ascii_serialization(),
        path.trim_start_matches('/')
    ))
}

/// `AuthSession=<value>` from a `Set-Cookie` header, empty value on logout
fn session_cookie(set_cookie: &str) -> Option<String> {
    let pair = set_cookie.split(';').next()?.trim();
    let (name, value) = pair.split_once('=')?;
    if name.trim() != SESSION_COOKIE {
        return None;
    }
    if value.trim().is_empty() {
        Some(String::new())
    } else {
        Some(pair.to_string())
    }
}

/// Map a status and body onto a JSON value or a classified error.
///
/// Any non-2xx status is an error. A JSON body carrying an `error` member is
/// classified from it; anything else falls back to the bare status.
fn classify_response(status: StatusCode, text: &str) -> Result<Value> {
    let parsed = if text.trim().is_empty() {
        Ok(Value::Null)
    } else {
        serde_json::from_str::<Value>(text)
    };

    if status.is_success() {
        return parsed.map_err(|_| Error::BadResponse);
    }

    let code = status.as_u16();
    let parsed = parsed.ok();
    if let Some(err) = parsed
        .as_ref()
        .and_then(|body| Error::from_error_body(Some(code), body))
    {
        tracing::debug!("Server returned {}: {}", code, err);
        return Err(err);
    }

    let reason = parsed
        .as_ref()
        .and_then(|v| v.get("reason"))
        .and_then(Value::as_str)
        .map(str::to_string);

    match code {
        404 | 401 | 403 => Err(Error::from_status(code, reason)),
        _ => Err(Error::Http {
            status: code,
            message: reason.unwrap_or_else(|| text.trim().to_string()),
        }),
    }
}
