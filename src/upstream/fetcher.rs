use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderValue, Method, StatusCode};
use http_body_util::combinators::BoxBody;
use http_body_util::BodyExt;
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;

use crate::error::ProxyError;
use crate::headers::strip_hop_by_hop;
use crate::target_url::TargetURL;

pub type ReqBody = BoxBody<bytes::Bytes, hyper::Error>;

/// Result of an upstream fetch (spec.md §3 "UpstreamResponse").
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: hyper::body::Incoming,
}

/// Fetches a `TargetURL` from the real internet on the proxy's behalf
/// (spec.md §4.2). One client is shared for the process lifetime; unlike the
/// teacher's per-cluster pool there is only ever one logical upstream class
/// here — arbitrary public origins — so a single pool suffices.
pub struct UpstreamFetcher {
    client: Client<HttpsConnector<HttpConnector>, ReqBody>,
    fallback_ua: Arc<str>,
}

impl UpstreamFetcher {
    pub fn new(fallback_ua: &str) -> Self {
        let mut http = HttpConnector::new();
        http.set_nodelay(true);
        http.set_keepalive(Some(Duration::from_secs(90)));
        http.set_connect_timeout(Some(Duration::from_secs(10)));
        http.enforce_http(false);

        let https = hyper_rustls::HttpsConnectorBuilder::new()
            .with_webpki_roots()
            .https_or_http()
            .enable_http1()
            .enable_http2()
            .wrap_connector(http);

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(32)
            .build(https);

        Self {
            client,
            fallback_ua: Arc::from(fallback_ua),
        }
    }

    /// Fetch `target` with the given method/headers/body (spec.md §4.2).
    /// Never follows redirects — 3xx responses are returned as-is.
    pub async fn fetch(&self, target: &TargetURL, method: Method, mut headers: HeaderMap, body: ReqBody) -> Result<UpstreamResponse, ProxyError> {
        strip_hop_by_hop(&mut headers);
        headers.remove(http::header::HOST);

        headers.insert(http::header::ACCEPT_ENCODING, HeaderValue::from_static("identity"));

        let host_value = match target.port() {
            Some(p) => format!("{}:{p}", target.host()),
            None => target.host().to_string(),
        };
        headers.insert(
            http::header::HOST,
            HeaderValue::from_str(&host_value).map_err(|e| ProxyError::Internal(e.to_string()))?,
        );
        headers.insert(
            http::header::ORIGIN,
            HeaderValue::from_str(&target.origin()).map_err(|e| ProxyError::Internal(e.to_string()))?,
        );
        headers.insert(
            http::header::REFERER,
            HeaderValue::from_str(target.as_url().as_str()).map_err(|e| ProxyError::Internal(e.to_string()))?,
        );

        if !headers.contains_key(http::header::USER_AGENT) {
            headers.insert(
                http::header::USER_AGENT,
                HeaderValue::from_str(&self.fallback_ua).map_err(|e| ProxyError::Internal(e.to_string()))?,
            );
        }

        let uri: http::Uri = target
            .as_url()
            .as_str()
            .parse()
            .map_err(|e: http::uri::InvalidUri| ProxyError::InvalidTarget(e.to_string()))?;

        let mut builder = hyper::Request::builder().method(method).uri(uri);
        *builder.headers_mut().expect("builder has no error yet") = headers;
        let request = builder.body(body).map_err(|e| ProxyError::Internal(e.to_string()))?;

        let response = self
            .client
            .request(request)
            .await
            .map_err(|e| ProxyError::UpstreamUnavailable(e.to_string()))?;

        let (parts, body) = response.into_parts();
        Ok(UpstreamResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }
}

/// Box a body that is already a concrete `Bytes`-yielding body into the
/// shared request body type the fetcher accepts.
pub fn box_request_body<B>(body: B) -> ReqBody
where
    B: hyper::body::Body<Data = bytes::Bytes, Error = hyper::Error> + Send + Sync + 'static,
{
    body.boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetcher_constructs_without_panicking() {
        let _fetcher = UpstreamFetcher::new("Mozilla/5.0 test-agent");
    }
}
