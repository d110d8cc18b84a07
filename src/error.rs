use http::StatusCode;
use std::fmt;

/// Error taxonomy for the proxy pipeline and the safezone channel handler.
///
/// Each variant maps to one HTTP status (`status_code`) and one short,
/// stack-trace-free message suitable for the `{"error": ...}` JSON body or
/// the safezone `error` frame (`kind_message`).
#[derive(Debug)]
pub enum ProxyError {
    MissingTarget,
    InvalidTarget(String),
    UnsupportedScheme,
    BlockedHost,
    HeadlessBusy,
    HeadlessUnavailable,
    UpstreamUnavailable(String),
    StreamRelayFailed(String),
    MalformedFrame(String),
    Internal(String),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::MissingTarget => StatusCode::BAD_REQUEST,
            ProxyError::InvalidTarget(_) => StatusCode::BAD_REQUEST,
            ProxyError::UnsupportedScheme => StatusCode::BAD_REQUEST,
            ProxyError::BlockedHost => StatusCode::FORBIDDEN,
            ProxyError::HeadlessBusy => StatusCode::TOO_MANY_REQUESTS,
            ProxyError::HeadlessUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            ProxyError::UpstreamUnavailable(_) => StatusCode::BAD_GATEWAY,
            ProxyError::StreamRelayFailed(_) => StatusCode::BAD_GATEWAY,
            ProxyError::MalformedFrame(_) => StatusCode::BAD_REQUEST,
            ProxyError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short message for the `error` JSON field / safezone error frame.
    /// Never includes internal detail beyond what each variant carries.
    pub fn kind_message(&self) -> String {
        match self {
            ProxyError::MissingTarget => "Target URL is required.".to_string(),
            ProxyError::InvalidTarget(_) => "Target URL could not be parsed.".to_string(),
            ProxyError::UnsupportedScheme => "Only http and https targets are supported.".to_string(),
            ProxyError::BlockedHost => "Target host is not allowed.".to_string(),
            ProxyError::HeadlessBusy => "Headless renderer is at capacity.".to_string(),
            ProxyError::HeadlessUnavailable => "Headless renderer is not available.".to_string(),
            ProxyError::UpstreamUnavailable(_) => "Upstream request failed.".to_string(),
            ProxyError::StreamRelayFailed(_) => "Upstream stream failed while relaying.".to_string(),
            ProxyError::MalformedFrame(_) => "Malformed safezone frame.".to_string(),
            ProxyError::Internal(_) => "Internal error.".to_string(),
        }
    }

    /// Whether this error increments `upstreamErrors` and is logged at `warn`,
    /// per spec.md §7 ("Upstream errors with status ≥ 500 and all unexpected
    /// errors increment upstreamErrors and are logged; other errors are not").
    pub fn counts_as_upstream_error(&self) -> bool {
        matches!(
            self,
            ProxyError::UpstreamUnavailable(_)
                | ProxyError::StreamRelayFailed(_)
                | ProxyError::HeadlessUnavailable
                | ProxyError::Internal(_)
        )
    }
}

impl fmt::Display for ProxyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProxyError::MissingTarget => write!(f, "missing target url"),
            ProxyError::InvalidTarget(msg) => write!(f, "invalid target url: {}", msg),
            ProxyError::UnsupportedScheme => write!(f, "unsupported scheme"),
            ProxyError::BlockedHost => write!(f, "blocked host"),
            ProxyError::HeadlessBusy => write!(f, "headless busy"),
            ProxyError::HeadlessUnavailable => write!(f, "headless unavailable"),
            ProxyError::UpstreamUnavailable(msg) => write!(f, "upstream unavailable: {}", msg),
            ProxyError::StreamRelayFailed(msg) => write!(f, "stream relay failed: {}", msg),
            ProxyError::MalformedFrame(msg) => write!(f, "malformed frame: {}", msg),
            ProxyError::Internal(msg) => write!(f, "internal error: {}", msg),
        }
    }
}

impl std::error::Error for ProxyError {}
