use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use http::{HeaderMap, HeaderName, HeaderValue, Method};
use http_body_util::BodyExt;
use hyper_tungstenite::tungstenite::Message;
use hyper_tungstenite::WebSocketStream;
use hyper_util::rt::TokioIo;
use tokio::sync::{mpsc, Notify};

use crate::proxy::context::empty_body;
use crate::proxy::pipeline::{self, ProxyBody};
use crate::safezone::frame::{parse_client_frame, ClientFrame, ServerFrame};
use crate::server::state::AppState;

const WRITER_QUEUE_DEPTH: usize = 64;

/// Per-request bookkeeping kept while a channel is active (spec.md §3
/// "SafezoneChannel"). Removed from the connection's channel map the moment
/// the channel reaches a terminal state.
struct ChannelHandle {
    cancel: Arc<Notify>,
}

/// One WebSocket connection, multiplexing many concurrent proxy requests
/// over `response`/`body`/`error` frames (spec.md §4.9). All outbound frames
/// funnel through a single writer task so concurrent request tasks never
/// write to the socket directly — WebSocket sends are not concurrency-safe
/// (spec.md §5, §9 "Cyclic reference... avoid mutating shared WebSocket
/// state from many request tasks").
pub async fn run(ws: WebSocketStream<TokioIo<hyper::upgrade::Upgraded>>, state: AppState) {
    let (mut sink, mut stream) = ws.split();
    let (writer_tx, mut writer_rx) = mpsc::channel::<Message>(WRITER_QUEUE_DEPTH);

    let writer = tokio::spawn(async move {
        while let Some(msg) = writer_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    metrics::gauge!("powerthrough_safezone_connections").increment(1.0);

    let channels: Arc<DashMap<String, ChannelHandle>> = Arc::new(DashMap::new());

    while let Some(next) = stream.next().await {
        let msg = match next {
            Ok(m) => m,
            Err(_) => break,
        };

        match msg {
            Message::Text(text) => handle_text(text.to_string(), &channels, &writer_tx, &state).await,
            Message::Binary(_) => {
                send(&writer_tx, ServerFrame::connection_error("binary frames are not supported")).await;
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => {}
        }
    }

    // Connection closing fails every still-active channel (spec.md §3 "SafezoneConnection").
    for entry in channels.iter() {
        entry.value().cancel.notify_waiters();
    }
    drop(writer_tx);
    let _ = writer.await;
    metrics::gauge!("powerthrough_safezone_connections").decrement(1.0);
}

async fn handle_text(text: String, channels: &Arc<DashMap<String, ChannelHandle>>, writer_tx: &mpsc::Sender<Message>, state: &AppState) {
    let frame = match parse_client_frame(&text) {
        Ok(f) => f,
        Err(e) => {
            send(writer_tx, ServerFrame::connection_error(e)).await;
            return;
        }
    };

    match frame {
        ClientFrame::Cancel { id } => {
            if let Some((_, handle)) = channels.remove(&id) {
                handle.cancel.notify_waiters();
            }
        }
        ClientFrame::Request {
            id,
            url,
            method,
            headers,
            render_hint,
            body,
            body_encoding,
        } => {
            let cancel = Arc::new(Notify::new());
            channels.insert(id.clone(), ChannelHandle { cancel: cancel.clone() });

            let state = state.clone();
            let writer_tx = writer_tx.clone();
            let channels = channels.clone();

            tokio::spawn(async move {
                tokio::select! {
                    _ = cancel.notified() => {
                        // Request frame cancelled before it completed; no further frames for this id.
                    }
                    _ = run_request(id.clone(), url, method, headers, render_hint, body, body_encoding, &state, &writer_tx) => {}
                }
                channels.remove(&id);
            });
        }
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_request(
    id: String,
    url: String,
    method: Option<String>,
    headers: Option<HashMap<String, String>>,
    render_hint: Option<String>,
    body: Option<String>,
    body_encoding: Option<String>,
    state: &AppState,
    writer_tx: &mpsc::Sender<Message>,
) {
    let method = method
        .as_deref()
        .map(|m| Method::from_bytes(m.as_bytes()).unwrap_or(Method::GET))
        .unwrap_or(Method::GET);

    let mut header_map = HeaderMap::new();
    if let Some(h) = headers {
        for (name, value) in h {
            if let (Ok(name), Ok(value)) = (HeaderName::from_bytes(name.as_bytes()), HeaderValue::from_str(&value)) {
                header_map.insert(name, value);
            }
        }
    }

    let req_body = if matches!(method, Method::GET | Method::HEAD) {
        empty_body()
    } else {
        match materialize_body(body, body_encoding.as_deref()) {
            Ok(bytes) => crate::upstream::fetcher::box_request_body(http_body_util::Full::new(bytes).map_err(|never: std::convert::Infallible| match never {})),
            Err(e) => {
                send(writer_tx, ServerFrame::channel_error(id, 400, e)).await;
                return;
            }
        }
    };

    let result = pipeline::handle(state, &url, method, header_map, req_body, render_hint.as_deref()).await;

    match result {
        Ok(res) => {
            let headers: Vec<(String, String)> = res
                .headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_str().unwrap_or("").to_string()))
                .collect();

            send(
                writer_tx,
                ServerFrame::Response {
                    id: id.clone(),
                    status: res.status.as_u16(),
                    headers,
                    from_cache: res.from_cache,
                    renderer: match res.renderer {
                        crate::cache::Renderer::Direct => "direct",
                        crate::cache::Renderer::Headless => "headless",
                    },
                },
            )
            .await;

            relay_body(id, res.body, writer_tx).await;
        }
        Err(e) => {
            send(writer_tx, ServerFrame::channel_error(id, e.status_code().as_u16(), e.kind_message())).await;
        }
    }
}

async fn relay_body(id: String, body: ProxyBody, writer_tx: &mpsc::Sender<Message>) {
    match body {
        ProxyBody::Buffered(bytes) => {
            let data = base64::engine::general_purpose::STANDARD.encode(&bytes);
            send(writer_tx, ServerFrame::Body { id, data, is_final: true }).await;
        }
        ProxyBody::Streamed(mut incoming) => {
            loop {
                match incoming.frame().await {
                    Some(Ok(frame)) => {
                        if let Some(chunk) = frame.data_ref() {
                            let data = base64::engine::general_purpose::STANDARD.encode(chunk);
                            send(
                                writer_tx,
                                ServerFrame::Body {
                                    id: id.clone(),
                                    data,
                                    is_final: false,
                                },
                            )
                            .await;
                        }
                    }
                    Some(Err(e)) => {
                        send(writer_tx, ServerFrame::channel_error(id, 502, format!("stream relay failed: {e}"))).await;
                        return;
                    }
                    None => break,
                }
            }
            // The terminal frame MUST be sent even when the stream ended cleanly
            // with no trailing chunk (spec.md §4.9 "body" frame).
            send(
                writer_tx,
                ServerFrame::Body {
                    id,
                    data: String::new(),
                    is_final: true,
                },
            )
            .await;
        }
    }
}

fn materialize_body(body: Option<String>, encoding: Option<&str>) -> Result<bytes::Bytes, String> {
    let Some(body) = body else {
        return Ok(bytes::Bytes::new());
    };
    match encoding.unwrap_or("base64") {
        "base64" => base64::engine::general_purpose::STANDARD
            .decode(body)
            .map(bytes::Bytes::from)
            .map_err(|e| format!("invalid base64 body: {e}")),
        "utf8" => Ok(bytes::Bytes::from(body)),
        other => Err(format!("unsupported bodyEncoding: {other}")),
    }
}

async fn send(writer_tx: &mpsc::Sender<Message>, frame: ServerFrame) {
    let _ = writer_tx.send(Message::Text(frame.to_json().into())).await;
}
