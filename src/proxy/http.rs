use http::{HeaderValue, Method, Request, Response, StatusCode};
use http_body_util::BodyExt;
use hyper::body::Incoming;

use crate::proxy::context::{empty_body, full_body, json_error_body, BoxBody};
use crate::proxy::pipeline::{self, ProxyBody};
use crate::server::state::AppState;
use crate::target_url::PROXY_PREFIX;

/// Route an inbound HTTP request to the proxy surface (spec.md §6).
pub async fn handle_request(req: Request<Incoming>, state: AppState) -> Result<Response<BoxBody>, hyper::Error> {
    if req.method() == Method::OPTIONS {
        return Ok(cors(Response::builder().status(StatusCode::NO_CONTENT)).body(empty_body()).expect("static"));
    }

    if crate::safezone::is_upgrade_request(&req) && req.uri().path() == "/safezone" {
        return Ok(crate::safezone::upgrade(req, state).unwrap_or_else(|_| {
            Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(empty_body())
                .expect("static")
        }));
    }

    let path = req.uri().path().to_string();

    if path == "/health" && req.method() == Method::GET {
        return Ok(health_response());
    }

    if path == "/metrics" && req.method() == Method::GET {
        return Ok(metrics_response(&state));
    }

    if let Some(encoded) = path.strip_prefix("/proxy/") {
        return Ok(legacy_redirect(encoded));
    }

    if path == PROXY_PREFIX {
        return Ok(proxy_request(req, state).await);
    }

    Ok(cors(Response::builder().status(StatusCode::NOT_FOUND)).body(full_body(r#"{"error":"Not found."}"#)).expect("static"))
}

async fn proxy_request(req: Request<Incoming>, state: AppState) -> Response<BoxBody> {
    let (parts, body) = req.into_parts();
    let query_params: std::collections::HashMap<String, String> = parts
        .uri
        .query()
        .map(|q| url::form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default();

    let Some(target) = query_params.get("url") else {
        return json_error_body(StatusCode::BAD_REQUEST, "Target URL is required.");
    };

    let render_hint = query_params
        .get("render")
        .cloned()
        .or_else(|| parts.headers.get("x-powerthrough-render").and_then(|v| v.to_str().ok()).map(String::from));

    let method = parts.method.clone();
    let headers = parts.headers.clone();

    let req_body = if matches!(method, Method::GET | Method::HEAD) {
        empty_body()
    } else {
        match body.collect().await {
            Ok(collected) => crate::upstream::fetcher::box_request_body(
                http_body_util::Full::new(collected.to_bytes()).map_err(|never: std::convert::Infallible| match never {}),
            ),
            Err(e) => return json_error_body(StatusCode::BAD_REQUEST, &e.to_string()),
        }
    };

    match pipeline::handle(&state, target, method, headers, req_body, render_hint.as_deref()).await {
        Ok(result) => {
            let mut builder = Response::builder().status(result.status);
            for (name, value) in result.headers.iter() {
                builder = builder.header(name, value);
            }
            if result.from_cache {
                builder = builder.header("x-cache", HeaderValue::from_static("HIT"));
            }
            let builder = cors(builder);

            match result.body {
                ProxyBody::Buffered(bytes) => builder.body(full_body(bytes)).expect("well-formed response"),
                ProxyBody::Streamed(incoming) => builder
                    .body(incoming.map_err(|e| hyper::Error::from(e)).boxed())
                    .expect("well-formed response"),
            }
        }
        Err(e) => cors_error(e.status_code(), &e.kind_message()),
    }
}

fn legacy_redirect(encoded: &str) -> Response<BoxBody> {
    let decoded = match url::form_urlencoded::parse(format!("url={encoded}").as_bytes())
        .into_owned()
        .find(|(k, _)| k == "url")
        .map(|(_, v)| v)
    {
        Some(v) => v,
        None => return json_error_body(StatusCode::BAD_REQUEST, "Target URL is required."),
    };

    let location = format!(
        "{PROXY_PREFIX}?url={}",
        percent_encoding::utf8_percent_encode(&decoded, percent_encoding::NON_ALPHANUMERIC)
    );

    cors(Response::builder().status(StatusCode::FOUND).header(http::header::LOCATION, location))
        .body(empty_body())
        .expect("well-formed redirect")
}

fn health_response() -> Response<BoxBody> {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    let body = format!(r#"{{"status":"ok","timestamp":{now}}}"#);
    cors(Response::builder().status(StatusCode::OK).header(http::header::CONTENT_TYPE, "application/json"))
        .body(full_body(body))
        .expect("static")
}

fn metrics_response(state: &AppState) -> Response<BoxBody> {
    let cfg = state.config.load();
    let snapshot = state.proxy_metrics.snapshot();
    let body = serde_json::json!({
        "requests": snapshot.requests,
        "cacheHits": snapshot.cache_hits,
        "cacheMisses": snapshot.cache_misses,
        "upstreamErrors": snapshot.upstream_errors,
        "totalLatencyMs": snapshot.total_latency_ms,
        "headlessRequests": snapshot.headless_requests,
        "headlessFailures": snapshot.headless_failures,
        "headlessActive": snapshot.headless_active,
        "cacheSize": state.cache.len(),
        "cacheTtlMs": cfg.cache_ttl_ms,
        "cacheEnabled": cfg.cache_enabled(),
    });

    cors(Response::builder().status(StatusCode::OK).header(http::header::CONTENT_TYPE, "application/json"))
        .body(full_body(body.to_string()))
        .expect("static")
}

fn cors_error(status: StatusCode, message: &str) -> Response<BoxBody> {
    cors(Response::builder().status(status)).body(full_body(format!(r#"{{"error":"{}"}}"#, message.replace('"', "'")))).expect("well-formed error")
}

/// Attach the permissive CORS headers every response on this surface carries
/// (spec.md §6 "All responses set permissive CORS").
fn cors(builder: http::response::Builder) -> http::response::Builder {
    builder
        .header("access-control-allow-origin", "*")
        .header("access-control-allow-methods", "GET, POST, PUT, PATCH, DELETE, OPTIONS")
        .header("access-control-allow-headers", "Content-Type, Authorization, X-Requested-With")
        .header("access-control-expose-headers", "*")
}
