use serde_json::Value;
use std::fmt;

/// Errors surfaced by the session layer and its transports.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Unexpected response from server")]
    BadResponse,

    #[error("Database listing unavailable")]
    DatabaseUnavailable,

    #[error("Database could not be created{}", fmt_reason(.0))]
    DatabaseNotCreatable(Option<String>),

    #[error("Database could not be deleted{}", fmt_reason(.0))]
    DatabaseNotDeletable(Option<String>),

    #[error("Content not found{}", fmt_reason(.0))]
    ContentNotFound(Option<String>),

    #[error("Not authorized{}", fmt_reason(.0))]
    Unauthorized(Option<String>),

    #[error("Server error: {status} - {message}")]
    Http { status: u16, message: String },

    /// JSON error body (`{"error": ..., "reason": ...}`) from the server
    #[error("Server reported {error}{}", fmt_reason(.reason))]
    Server {
        status: Option<u16>,
        error: String,
        reason: Option<String>,
    },

    #[error("Request timed out")]
    Timeout,

    #[error("HTTP request failed: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Unknown authentication mode: {0}")]
    InvalidAuthMode(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

fn fmt_reason(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {}", r),
        None => String::new(),
    }
}

/// Fieldless discriminant of [`Error`], for matching on the kind alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    BadResponse,
    DatabaseUnavailable,
    DatabaseNotCreatable,
    DatabaseNotDeletable,
    ContentNotFound,
    Unauthorized,
    Http,
    Server,
    Timeout,
    Transport,
    Serialization,
    InvalidUrl,
    InvalidAuthMode,
    Config,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::BadResponse => "bad_response",
            Self::DatabaseUnavailable => "database_unavailable",
            Self::DatabaseNotCreatable => "database_not_creatable",
            Self::DatabaseNotDeletable => "database_not_deletable",
            Self::ContentNotFound => "content_not_found",
            Self::Unauthorized => "unauthorized",
            Self::Http => "http",
            Self::Server => "server",
            Self::Timeout => "timeout",
            Self::Transport => "transport",
            Self::Serialization => "serialization",
            Self::InvalidUrl => "invalid_url",
            Self::InvalidAuthMode => "invalid_auth_mode",
            Self::Config => "config",
        };
        f.write_str(name)
    }
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::BadResponse => ErrorKind::BadResponse,
            Self::DatabaseUnavailable => ErrorKind::DatabaseUnavailable,
            Self::DatabaseNotCreatable(_) => ErrorKind::DatabaseNotCreatable,
            Self::DatabaseNotDeletable(_) => ErrorKind::DatabaseNotDeletable,
            Self::ContentNotFound(_) => ErrorKind::ContentNotFound,
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::Http { .. } => ErrorKind::Http,
            Self::Server { .. } => ErrorKind::Server,
            Self::Timeout => ErrorKind::Timeout,
            Self::Transport(_) => ErrorKind::Transport,
            Self::Serialization(_) => ErrorKind::Serialization,
            Self::InvalidUrl(_) => ErrorKind::InvalidUrl,
            Self::InvalidAuthMode(_) => ErrorKind::InvalidAuthMode,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Server-supplied reason, when the error carries one
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::DatabaseNotCreatable(r)
            | Self::DatabaseNotDeletable(r)
            | Self::ContentNotFound(r)
            | Self::Unauthorized(r) => r.as_deref(),
            Self::Http { message, .. } => Some(message),
            Self::Server { reason, .. } => reason.as_deref(),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::ContentNotFound
    }

    /// Classify a JSON body carrying an `error` member, if it does.
    ///
    /// 404 and 401/403 keep their dedicated kinds; anything else becomes
    /// [`Error::Server`].
    pub fn from_error_body(status: Option<u16>, body: &Value) -> Option<Self> {
        let error = body.get("error")?;
        let error = match error.as_str() {
            Some(e) => e.to_string(),
            None => error.to_string(),
        };
        let reason = body
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string);

        Some(match status {
            Some(code @ (404 | 401 | 403)) => Self::from_status(code, reason.or(Some(error))),
            _ => Self::Server {
                status,
                error,
                reason,
            },
        })
    }

    /// Classify a non-success HTTP status that came without a usable body
    pub fn from_status(status: u16, reason: Option<String>) -> Self {
        match status {
            404 => Self::ContentNotFound(reason),
            401 | 403 => Self::Unauthorized(reason),
            _ => Self::Http {
                status,
                message: reason.unwrap_or_default(),
            },
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
