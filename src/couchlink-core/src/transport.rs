use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::auth::{AuthMode, User};
use crate::error::{Error, Result};

/// HTTP verb of a transport request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Put,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Head => "HEAD",
            Self::Put => "PUT",
            Self::Post => "POST",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status line and headers of a request whose body is not interpreted
#[derive(Debug, Clone, Default)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
}

impl RawResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Request executor shared by a connection and every handle it produces.
///
/// Implementations must be safe to call from several tasks at once; the
/// setters take `&self` so one handle can be reconfigured while shared.
/// Session state (auth mode, cookie) is shared too, so concurrent logins on
/// the same transport must be serialised by the caller.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    /// Issue a request and return its JSON body.
    ///
    /// `server_root` addresses the server root rather than the configured URL path.
    async fn get_data(
        &self,
        path: &str,
        method: Method,
        body: Option<&Value>,
        server_root: bool,
    ) -> Result<Value>;

    /// Issue a request and return only its status and headers.
    async fn get_raw_data(&self, path: &str, method: Method) -> Result<RawResponse>;

    fn timeout(&self) -> Duration;
    fn set_timeout(&self, timeout: Duration);

    fn auth_mode(&self) -> AuthMode;
    fn set_auth_mode(&self, mode: AuthMode);

    fn user(&self) -> User;
    fn set_user(&self, user: User);

    fn server_url(&self) -> String;
    /// Rejects URLs the transport cannot address, keeping the current one
    fn set_server_url(&self, url: &str) -> Result<()>;
}

pub type SharedTransport = Arc<dyn Transport>;

/// Builds a fresh transport for a server URL and credentials
pub trait TransportFactory {
    fn build(&self, url: &str, user: User, mode: AuthMode) -> Result<SharedTransport>;
}

impl<F> TransportFactory for F
where
    F: Fn(&str, User, AuthMode) -> Result<SharedTransport>,
{
    fn build(&self, url: &str, user: User, mode: AuthMode) -> Result<SharedTransport> {
        self(url, user, mode)
    }
}

/// Issue a request and reject bodies that report an `error`.
///
/// Transports may hand error bodies back as values; every caller that
/// returns server JSON goes through here so none of them pass as success.
pub(crate) async fn fetch(
    transport: &dyn Transport,
    path: &str,
    method: Method,
    body: Option<&Value>,
    server_root: bool,
) -> Result<Value> {
    let response = transport.get_data(path, method, body, server_root).await?;
    match Error::from_error_body(None, &response) {
        Some(err) => {
            tracing::debug!("{} {} reported {}", method, path, err);
            Err(err)
        }
        None => Ok(response),
    }
}

/// Characters left as-is in a path segment (RFC 3986 unreserved set)
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single path segment, including any `/` it contains
pub fn url_encode(segment: &str) -> String {
    utf8_percent_encode(segment, SEGMENT).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_encode_segment() {
        assert_eq!(url_encode("alpha"), "alpha");
        assert_eq!(url_encode("a/b"), "a%2Fb");
        assert_eq!(url_encode("my db+1"), "my%20db%2B1");
        assert_eq!(url_encode("_users"), "_users");
    }

    #[test]
    fn test_raw_response_success_range() {
        let ok = RawResponse { status: 200, ..Default::default() };
        let missing = RawResponse { status: 404, ..Default::default() };
        assert!(ok.is_success());
        assert!(!missing.is_success());
    }
}
