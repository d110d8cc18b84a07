use async_trait::async_trait;
use http::{HeaderMap, StatusCode};

use crate::error::ProxyError;
use crate::target_url::TargetURL;

#[derive(Debug, Clone)]
pub struct HeadlessOptions {
    pub user_agent: String,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub timeout: std::time::Duration,
}

pub struct HeadlessRendered {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: String,
}

/// A headless browser driver capability (spec.md §9 "Headless driver"):
/// `render(url, opts) → buffered HTML or error`. Abstracted behind a trait
/// so the pipeline is testable without a real browser — the real
/// implementation is an external collaborator this crate does not ship.
#[async_trait]
pub trait HeadlessRenderer: Send + Sync {
    async fn render(&self, target: &TargetURL, opts: &HeadlessOptions) -> Result<HeadlessRendered, ProxyError>;
}

/// Renderer used when no real browser driver is wired up. Always reports
/// `HeadlessUnavailable`, which the pipeline maps to HTTP 500 (spec.md §4.7,
/// §7) rather than silently falling back to a direct fetch.
pub struct NullRenderer;

#[async_trait]
impl HeadlessRenderer for NullRenderer {
    async fn render(&self, _target: &TargetURL, _opts: &HeadlessOptions) -> Result<HeadlessRendered, ProxyError> {
        Err(ProxyError::HeadlessUnavailable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn null_renderer_reports_unavailable() {
        let renderer = NullRenderer;
        let target = TargetURL::validate("https://example.com/").unwrap();
        let opts = HeadlessOptions {
            user_agent: "test".to_string(),
            viewport_width: 1366,
            viewport_height: 768,
            timeout: std::time::Duration::from_secs(30),
        };
        let err = renderer.render(&target, &opts).await.unwrap_err();
        assert!(matches!(err, ProxyError::HeadlessUnavailable));
    }
}
