use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use powerthrough::config::PowerthroughConfig;
use powerthrough::headers::filter_response_headers;
use powerthrough::metrics::Metrics;
use powerthrough::rewrite::{rewrite_css, rewrite_html_body};
use powerthrough::server::{self, AppState};
use powerthrough::target_url::TargetURL;
use tokio::sync::Notify;
use tokio_tungstenite::tungstenite::Message;

async fn spawn_proxy() -> (String, std::sync::Arc<Notify>) {
    let mut config = PowerthroughConfig::default();
    config.cache_ttl_ms = 60_000;
    let state = AppState::new(config, Metrics::install());
    let shutdown = std::sync::Arc::new(Notify::new());

    // Bind on an ephemeral port ourselves so the test knows the address before
    // the server starts accepting connections.
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    {
        let listen = addr.to_string();
        let state = state.clone();
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            let _ = server::run_proxy_server(&listen, state, shutdown).await;
        });
    }

    // Give the accept loop a moment to bind before the test connects.
    tokio::time::sleep(Duration::from_millis(50)).await;
    (format!("http://{addr}"), shutdown)
}

fn http_client() -> Client<HttpConnector, Empty<Bytes>> {
    Client::builder(TokioExecutor::new()).build_http()
}

/// Scenario A (spec.md §8, component composition): HTML rewrite + header
/// filter together produce the exact attribute/header shape the proxy
/// promises, without requiring a live upstream hop.
#[tokio::test]
async fn scenario_a_html_rewrite_and_headers_compose() {
    let base = TargetURL::validate("https://example.com/p").unwrap();
    let mut upstream_headers = http::HeaderMap::new();
    upstream_headers.insert(http::header::CONTENT_TYPE, http::HeaderValue::from_static("text/html"));
    upstream_headers.insert("x-frame-options", http::HeaderValue::from_static("DENY"));

    let rewritten = rewrite_html_body(r#"<a href="/foo">X</a>"#, &base).unwrap();
    assert!(rewritten.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Ffoo"));

    let headers = filter_response_headers(&upstream_headers, true, None);
    assert_eq!(headers.get(http::header::CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
    assert_ne!(headers.get("x-frame-options").unwrap(), "DENY");
}

/// Scenario B: CSS rewrite produces a proxy-local `url()` token.
#[tokio::test]
async fn scenario_b_css_rewrite() {
    let base = TargetURL::validate("https://example.com/p").unwrap();
    let out = rewrite_css("body{background:url('/bg.png')}", &base);
    assert_eq!(out, "body{background:url(/powerthrough?url=https%3A%2F%2Fexample.com%2Fbg.png)}");
}

/// Scenario C: a request targeting a blocked host is rejected with 403 before
/// any upstream dispatch is attempted — fully testable over a live listener.
#[tokio::test]
async fn scenario_c_blocked_host_returns_403() {
    let (base_url, shutdown) = spawn_proxy().await;
    let client = http_client();

    let uri: http::Uri = format!("{base_url}/powerthrough?url=http%3A%2F%2F127.0.0.1%2F").parse().unwrap();
    let req = hyper::Request::builder().uri(uri).body(Empty::new()).unwrap();
    let resp = client.request(req).await.unwrap();

    assert_eq!(resp.status(), http::StatusCode::FORBIDDEN);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let text = String::from_utf8_lossy(&body);
    assert!(text.contains("not allowed"));

    shutdown.notify_waiters();
}

/// Scenario D (URL Validator only — no live network in a test suite):
/// a bare natural-language query becomes a DuckDuckGo search URL.
#[tokio::test]
async fn scenario_d_search_fallback_resolves_to_duckduckgo() {
    let target = TargetURL::validate("hello world").unwrap();
    assert_eq!(target.host(), "duckduckgo.com");
    assert_eq!(target.query(), Some("q=hello+world"));
}

/// `/health` and `/metrics` respond on the same listener as the proxy surface.
#[tokio::test]
async fn health_and_metrics_endpoints_respond() {
    let (base_url, shutdown) = spawn_proxy().await;
    let client = http_client();

    let uri: http::Uri = format!("{base_url}/health").parse().unwrap();
    let resp = client.request(hyper::Request::builder().uri(uri).body(Empty::new()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), http::StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains(r#""status":"ok""#));

    let uri: http::Uri = format!("{base_url}/metrics").parse().unwrap();
    let resp = client.request(hyper::Request::builder().uri(uri).body(Empty::new()).unwrap()).await.unwrap();
    assert_eq!(resp.status(), http::StatusCode::OK);
    let body = resp.into_body().collect().await.unwrap().to_bytes();
    assert!(String::from_utf8_lossy(&body).contains("cacheTtlMs"));

    shutdown.notify_waiters();
}

/// Scenario E/F (offline variant): a safezone `request` frame targeting a
/// blocked host produces a channel-scoped error frame and closes out the
/// channel, without ever touching the network — exercising the full
/// WebSocket upgrade + multiplexer framing path end to end.
#[tokio::test]
async fn safezone_blocked_host_emits_channel_error_frame() {
    let (base_url, shutdown) = spawn_proxy().await;
    let ws_url = base_url.replacen("http://", "ws://", 1) + "/safezone";

    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await.expect("safezone upgrade");

    use futures_util::{SinkExt, StreamExt};
    ws.send(Message::Text(
        r#"{"type":"request","id":"r1","url":"http://127.0.0.1/"}"#.into(),
    ))
    .await
    .unwrap();

    let reply = ws.next().await.unwrap().unwrap();
    let Message::Text(text) = reply else { panic!("expected text frame") };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "error");
    assert_eq!(value["id"], "r1");
    assert_eq!(value["status"], 403);

    ws.close(None).await.ok();
    shutdown.notify_waiters();
}

/// Malformed JSON on the safezone socket produces a connection-wide error
/// frame (no `id`) rather than silently dropping the connection.
#[tokio::test]
async fn safezone_malformed_json_emits_connection_error_frame() {
    let (base_url, shutdown) = spawn_proxy().await;
    let ws_url = base_url.replacen("http://", "ws://", 1) + "/safezone";

    let (mut ws, _) = tokio_tungstenite::connect_async(ws_url).await.expect("safezone upgrade");

    use futures_util::{SinkExt, StreamExt};
    ws.send(Message::Text("not json".into())).await.unwrap();

    let reply = ws.next().await.unwrap().unwrap();
    let Message::Text(text) = reply else { panic!("expected text frame") };
    let value: serde_json::Value = serde_json::from_str(&text).unwrap();
    assert_eq!(value["type"], "error");
    assert!(value.get("id").is_none());

    ws.close(None).await.ok();
    shutdown.notify_waiters();
}
