use std::time::Instant;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use http_body_util::BodyExt;

use crate::cache::{CacheEntry, CacheKey, Renderer};
use crate::error::ProxyError;
use crate::headers::filter_response_headers;
use crate::headless::HeadlessOptions;
use crate::rewrite::{profile_for, rewrite_css, rewrite_html_body};
use crate::server::state::AppState;
use crate::target_url::TargetURL;
use crate::upstream::fetcher::ReqBody;

/// Outcome of running the pipeline once (spec.md §3 "ProxyResult").
pub struct ProxyResult {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: ProxyBody,
    pub from_cache: bool,
    pub renderer: Renderer,
}

pub enum ProxyBody {
    Buffered(Bytes),
    Streamed(hyper::body::Incoming),
}

/// Run one request through validation, cache, fetch-or-render, and rewrite
/// (spec.md §4.8). This is the single entry point shared by the HTTP
/// endpoint and the safezone multiplexer.
pub async fn handle(
    state: &AppState,
    raw_target: &str,
    method: Method,
    headers: HeaderMap,
    body: ReqBody,
    render_hint: Option<&str>,
) -> Result<ProxyResult, ProxyError> {
    let start = Instant::now();
    let result = handle_inner(state, raw_target, method, headers, body, render_hint).await;
    state.proxy_metrics.record_request(start.elapsed().as_millis() as u64);

    if let Err(ref e) = result {
        if e.counts_as_upstream_error() {
            state.proxy_metrics.record_upstream_error();
            tracing::warn!(error = %e, target = raw_target, "pipeline error");
        }
    }
    result
}

async fn handle_inner(
    state: &AppState,
    raw_target: &str,
    method: Method,
    headers: HeaderMap,
    body: ReqBody,
    render_hint: Option<&str>,
) -> Result<ProxyResult, ProxyError> {
    let target = TargetURL::validate(raw_target)?;
    let cfg = state.config.load();

    let wants_headless = cfg.headless_enabled && method == Method::GET && render_hint == Some("headless");
    let headless_max = cfg.headless_max;

    let cache_key = (method == Method::GET).then(|| {
        if wants_headless {
            CacheKey::headless(target.as_url().as_str())
        } else {
            CacheKey::direct(target.as_url().as_str())
        }
    });

    if let Some(ref key) = cache_key {
        if let Some(entry) = state.cache.lookup(key) {
            state.proxy_metrics.record_cache_hit();
            return Ok(ProxyResult {
                status: entry.status,
                headers: entry.headers,
                body: ProxyBody::Buffered(entry.body),
                from_cache: true,
                renderer: entry.renderer,
            });
        }
        state.proxy_metrics.record_cache_miss();
    }

    if wants_headless {
        return render_headless(state, &target, cache_key, headless_max).await;
    }

    fetch_direct(state, &target, method, headers, body, cache_key).await
}

async fn render_headless(
    state: &AppState,
    target: &TargetURL,
    cache_key: Option<CacheKey>,
    headless_max: usize,
) -> Result<ProxyResult, ProxyError> {
    let cfg = state.config.load();
    let Some(_guard) = state.proxy_metrics.try_enter_headless(headless_max) else {
        return Err(ProxyError::HeadlessBusy);
    };
    state.proxy_metrics.record_headless_attempt();

    let opts = HeadlessOptions {
        user_agent: cfg.headless_ua.clone(),
        viewport_width: 1366,
        viewport_height: 768,
        timeout: std::time::Duration::from_millis(cfg.headless_timeout_ms),
    };

    let rendered = match state.headless.render(target, &opts).await {
        Ok(r) => r,
        Err(e) => {
            state.proxy_metrics.record_headless_failure();
            return Err(e);
        }
    };

    let rewritten = rewrite_html_body(&rendered.body, target).map_err(|e| ProxyError::Internal(e.to_string()))?;
    let profile = profile_for(target);
    let mut headers = filter_response_headers(&rendered.headers, true, profile);
    headers.insert(
        http::HeaderName::from_static("x-renderer"),
        http::HeaderValue::from_static("headless"),
    );

    let body = Bytes::from(rewritten);
    if let Some(key) = cache_key {
        state.cache.insert(
            key,
            CacheEntry {
                status: rendered.status,
                headers: headers.clone(),
                body: body.clone(),
                renderer: Renderer::Headless,
                added_at: Instant::now(),
            },
        );
    }

    Ok(ProxyResult {
        status: rendered.status,
        headers,
        body: ProxyBody::Buffered(body),
        from_cache: false,
        renderer: Renderer::Headless,
    })
}

async fn fetch_direct(
    state: &AppState,
    target: &TargetURL,
    method: Method,
    headers: HeaderMap,
    body: ReqBody,
    cache_key: Option<CacheKey>,
) -> Result<ProxyResult, ProxyError> {
    let response = state.fetcher.fetch(target, method, headers, body).await?;

    let content_type = response
        .headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_ascii_lowercase();

    if content_type.contains("text/html") {
        let buffered = buffer_body(response.body).await?;
        let html = String::from_utf8_lossy(&buffered);
        let rewritten = rewrite_html_body(&html, target).map_err(|e| ProxyError::Internal(e.to_string()))?;
        let profile = profile_for(target);
        let headers = filter_response_headers(&response.headers, true, profile);
        let body = Bytes::from(rewritten);

        if let Some(key) = cache_key {
            state.cache.insert(
                key,
                CacheEntry {
                    status: response.status,
                    headers: headers.clone(),
                    body: body.clone(),
                    renderer: Renderer::Direct,
                    added_at: Instant::now(),
                },
            );
        }

        return Ok(ProxyResult {
            status: response.status,
            headers,
            body: ProxyBody::Buffered(body),
            from_cache: false,
            renderer: Renderer::Direct,
        });
    }

    if content_type.contains("text/css") {
        let buffered = buffer_body(response.body).await?;
        let css = String::from_utf8_lossy(&buffered);
        let rewritten = rewrite_css(&css, target);
        let headers = filter_response_headers(&response.headers, false, None);
        let body = Bytes::from(rewritten);

        if let Some(key) = cache_key {
            state.cache.insert(
                key,
                CacheEntry {
                    status: response.status,
                    headers: headers.clone(),
                    body: body.clone(),
                    renderer: Renderer::Direct,
                    added_at: Instant::now(),
                },
            );
        }

        return Ok(ProxyResult {
            status: response.status,
            headers,
            body: ProxyBody::Buffered(body),
            from_cache: false,
            renderer: Renderer::Direct,
        });
    }

    // Everything else streams straight through, never cached (spec.md §4.8 step 5).
    let headers = filter_response_headers(&response.headers, false, None);
    Ok(ProxyResult {
        status: response.status,
        headers,
        body: ProxyBody::Streamed(response.body),
        from_cache: false,
        renderer: Renderer::Direct,
    })
}

async fn buffer_body(body: hyper::body::Incoming) -> Result<Bytes, ProxyError> {
    body.collect()
        .await
        .map(|collected| collected.to_bytes())
        .map_err(|e| ProxyError::StreamRelayFailed(e.to_string()))
}
