use http::{HeaderMap, HeaderName, HeaderValue};

use crate::rewrite::profile::RewriteProfile;

/// Hop-by-hop headers, never forwarded in either direction (RFC 7230 §6.1).
const HOP_BY_HOP: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// Headers dropped unconditionally from the upstream response before it
/// reaches the client (spec.md §4.3) — framing/origin controls that would
/// otherwise prevent the rewritten page from working when reframed under
/// the proxy's own origin.
const DROPPED_RESPONSE_HEADERS: &[&str] = &[
    "access-control-allow-origin",
    "access-control-allow-credentials",
    "x-frame-options",
    "content-security-policy",
    "content-security-policy-report-only",
    "x-content-security-policy",
    "set-cookie",
];

/// Build the outbound response header set from the upstream response headers
/// (spec.md §4.3). `rewrote_html` marks that the body passed through the
/// HTML rewriter, which forces `content-type`/`x-frame-options`. `profile`
/// supplies an optional CSP to reinsert.
pub fn filter_response_headers(upstream: &HeaderMap, rewrote_html: bool, profile: Option<RewriteProfile>) -> HeaderMap {
    let mut out = HeaderMap::with_capacity(upstream.len());

    for (name, value) in upstream.iter() {
        let lower = name.as_str();
        if HOP_BY_HOP.contains(&lower) || DROPPED_RESPONSE_HEADERS.contains(&lower) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }

    // set-cookie is multi-valued; re-add every occurrence via the multi-value getter.
    for cookie in upstream.get_all("set-cookie") {
        out.append(HeaderName::from_static("set-cookie"), cookie.clone());
    }

    if rewrote_html {
        out.insert(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        out.insert(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("ALLOWALL"),
        );
    }

    if let Some(csp) = profile.and_then(|p| p.csp) {
        if let Ok(value) = HeaderValue::from_str(csp.header_value()) {
            out.insert(HeaderName::from_static("content-security-policy"), value);
        }
    }

    out
}

/// Strip hop-by-hop headers from a request before forwarding upstream
/// (spec.md §4.2 "Header sanitization").
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    for name in HOP_BY_HOP {
        headers.remove(*name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::profile::CspProfile;

    fn upstream_headers() -> HeaderMap {
        let mut h = HeaderMap::new();
        h.insert(http::header::CONTENT_TYPE, HeaderValue::from_static("text/html"));
        h.insert(
            HeaderName::from_static("x-frame-options"),
            HeaderValue::from_static("DENY"),
        );
        h.append(HeaderName::from_static("set-cookie"), HeaderValue::from_static("a=1"));
        h.append(HeaderName::from_static("set-cookie"), HeaderValue::from_static("b=2"));
        h.insert(HeaderName::from_static("connection"), HeaderValue::from_static("keep-alive"));
        h
    }

    #[test]
    fn drops_hop_by_hop_and_framing_headers() {
        let out = filter_response_headers(&upstream_headers(), false, None);
        assert!(!out.contains_key("connection"));
        assert!(!out.contains_key("x-frame-options"));
    }

    #[test]
    fn preserves_all_set_cookie_values() {
        let out = filter_response_headers(&upstream_headers(), false, None);
        let cookies: Vec<_> = out.get_all("set-cookie").iter().collect();
        assert_eq!(cookies.len(), 2);
    }

    #[test]
    fn forces_content_type_and_allowall_after_html_rewrite() {
        let out = filter_response_headers(&upstream_headers(), true, None);
        assert_eq!(out.get(http::header::CONTENT_TYPE).unwrap(), "text/html; charset=utf-8");
        assert_eq!(out.get("x-frame-options").unwrap(), "ALLOWALL");
    }

    #[test]
    fn inserts_profile_csp_when_present() {
        let profile = RewriteProfile {
            csp: Some(CspProfile::GoogleCompatible),
            html_patch: None,
        };
        let out = filter_response_headers(&upstream_headers(), true, Some(profile));
        assert!(out.get("content-security-policy").is_some());
    }
}
