use std::time::Duration;

use crate::backoff::{BackoffClass, BackoffExhausted};

/// Errors raised while building a client, before any connection is attempted.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("missing credential: {0}")]
    MissingCredential(&'static str),
    #[error("invalid endpoint {url:?}: {reason}")]
    InvalidEndpoint { url: String, reason: &'static str },
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Failures reported by the transport underneath a stream.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("read failed: {0}")]
    Read(String),
    #[error("stream closed by remote")]
    Closed,
}

/// Which failure class a reconnect or error notification belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Network,
    Http,
    RateLimit,
    Stall,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Http => "http",
            Self::RateLimit => "rate-limit",
            Self::Stall => "stall",
        }
    }
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed error carried by `reconnect` and `error` notifications.
/// Transient variants drive a reconnect; the rest end the connection.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum StreamError {
    #[error("http status {status}: {}", explain_status(*status))]
    HttpStatus { status: u16 },
    #[error("rate limit exceeded: {0}")]
    RateLimitExceeded(BackoffExhausted),
    #[error(transparent)]
    Network(TransportError),
    #[error("no data received for {0:?}")]
    Stalled(Duration),
}

impl StreamError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::HttpStatus { status: 420 } => FailureKind::RateLimit,
            Self::HttpStatus { .. } => FailureKind::Http,
            Self::RateLimitExceeded(_) => FailureKind::RateLimit,
            Self::Network(_) => FailureKind::Network,
            Self::Stalled(_) => FailureKind::Stall,
        }
    }

    /// Originating status code, when the failure came from an HTTP response.
    pub fn code(&self) -> Option<u16> {
        match self {
            Self::HttpStatus { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            Self::HttpStatus { status } => {
                matches!(classify_status(*status), StatusDisposition::Retry(_))
            }
            Self::Network(_) | Self::Stalled(_) => true,
            Self::RateLimitExceeded(_) => false,
        }
    }

    pub fn is_fatal(&self) -> bool {
        !self.is_retryable()
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::HttpStatus { .. } if self.is_retryable() => "http_retryable",
            Self::HttpStatus { .. } => "http_fatal",
            Self::RateLimitExceeded(_) => "rate_limit_exceeded",
            Self::Network(_) => "network",
            Self::Stalled(_) => "stalled",
        }
    }
}

/// What the supervisor should do with a response status.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StatusDisposition {
    Stream,
    Retry(BackoffClass),
    Fatal,
}

pub fn classify_status(status: u16) -> StatusDisposition {
    match status {
        200 => StatusDisposition::Stream,
        420 => StatusDisposition::Retry(BackoffClass::RateLimit),
        503 => StatusDisposition::Retry(BackoffClass::Http),
        _ => StatusDisposition::Fatal,
    }
}

/// Human-readable explanation for the statuses the filter endpoint documents.
pub fn explain_status(status: u16) -> &'static str {
    match status {
        401 => "Unauthorized: HTTP authentication failed due to invalid credentials or an unknown or unauthorized OAuth client",
        403 => "Forbidden: the connecting account is not permitted to access this endpoint",
        404 => "Unknown: there is nothing at this URL, which means the resource does not exist",
        406 => "Not Acceptable: at least one request parameter is invalid, e.g. a track keyword is too long or too short, a bounding box is invalid, neither track nor follow is set, or a follow id is invalid",
        413 => "Too Long: a parameter list is too long, e.g. more track values were sent than the account is allowed",
        416 => "Range Unacceptable: a count parameter was specified but is out of range",
        420 => "Rate Limited: the client has connected too frequently",
        503 => "Service Unavailable: a streaming server is temporarily overloaded; reconnect with backoff",
        _ => "unexpected response status from the streaming endpoint",
    }
}
