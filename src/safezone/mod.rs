mod connection;
mod frame;

use hyper::{Request, Response};
use tracing::error;

use crate::proxy::context::{empty_body, BoxBody};
use crate::server::state::AppState;

/// WebSocket subprotocol label negotiated on `/safezone` (spec.md §4.9).
pub const PROTOCOL: &str = "safezone.v1";

/// Upgrade an inbound `/safezone` request and spawn the per-connection
/// multiplexer loop (spec.md §4.9). The upgrade response is returned
/// immediately; the websocket handshake completes asynchronously.
pub fn upgrade(req: Request<hyper::body::Incoming>, state: AppState) -> Result<Response<BoxBody>, http::Error> {
    match hyper_tungstenite::upgrade(req, None) {
        Ok((response, websocket)) => {
            tokio::spawn(async move {
                match websocket.await {
                    Ok(ws) => connection::run(ws, state).await,
                    Err(e) => error!("safezone: handshake failed: {e}"),
                }
            });
            let (mut parts, _) = response.into_parts();
            parts
                .headers
                .insert("sec-websocket-protocol", http::HeaderValue::from_static(PROTOCOL));
            Ok(Response::from_parts(parts, empty_body()))
        }
        Err(e) => {
            error!("safezone: upgrade rejected: {e}");
            Response::builder().status(http::StatusCode::BAD_REQUEST).body(empty_body())
        }
    }
}

/// Check whether `req` is a valid WebSocket upgrade request for `/safezone`.
pub fn is_upgrade_request(req: &Request<hyper::body::Incoming>) -> bool {
    hyper_tungstenite::is_upgrade_request(req)
}
