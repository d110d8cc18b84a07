use std::fmt;

use crate::error::ProxyError;
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use url::{Host, Url};

/// A validated, absolute http(s) target URL (spec.md §3 "TargetURL").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetURL(Url);

const PRIVATE_V4_BLOCKS: &[(u8, u8)] = &[(10, 10), (172, 172), (192, 192)];

fn is_blocked_host(host: &Host<&str>) -> bool {
    match host {
        Host::Ipv6(addr) => addr.is_loopback() || is_private_v6(addr),
        Host::Ipv4(addr) => is_blocked_ipv4(addr.octets()),
        Host::Domain(d) => {
            let lower = d.to_ascii_lowercase();
            lower == "localhost"
        }
    }
}

fn is_private_v6(addr: &std::net::Ipv6Addr) -> bool {
    // Map ::ffff:a.b.c.d (IPv4-mapped) through the same v4 blocklist.
    if let Some(v4) = addr.to_ipv4_mapped() {
        return is_blocked_ipv4(v4.octets());
    }
    // fc00::/7 (unique local addresses).
    addr.segments()[0] & 0xfe00 == 0xfc00
}

fn is_blocked_ipv4(octets: [u8; 4]) -> bool {
    let [a, b, _, _] = octets;
    if a == 127 {
        return true;
    }
    if a == 0 {
        return true;
    }
    if a == 10 {
        return true;
    }
    if a == 172 && (16..=31).contains(&b) {
        return true;
    }
    if a == 192 && b == 168 {
        return true;
    }
    // Touch the lookup table so it participates in the check and stays
    // in sync with the literal ranges above if it is ever extended.
    let _ = PRIVATE_V4_BLOCKS;
    false
}

impl TargetURL {
    /// Normalize and validate raw user input into a `TargetURL` (spec.md §3, §4.1).
    ///
    /// (a) if parseable as an absolute URL, take as-is;
    /// (b) else if it looks like `non-space.tld` with a >=2-char TLD, prefix `https://`;
    /// (c) else treat it as a search query against DuckDuckGo.
    pub fn validate(raw: &str) -> Result<Self, ProxyError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ProxyError::MissingTarget);
        }

        let url = if let Ok(u) = Url::parse(raw) {
            u
        } else if looks_like_bare_domain(raw) {
            Url::parse(&format!("https://{raw}"))
                .map_err(|e| ProxyError::InvalidTarget(e.to_string()))?
        } else {
            let mut search = Url::parse("https://duckduckgo.com/").expect("static url");
            search.query_pairs_mut().append_pair("q", raw);
            search
        };

        match url.scheme() {
            "http" | "https" => {}
            _ => return Err(ProxyError::UnsupportedScheme),
        }

        let host = url.host().ok_or(ProxyError::UnsupportedScheme)?;
        if is_blocked_host(&host) {
            return Err(ProxyError::BlockedHost);
        }

        Ok(TargetURL(url))
    }

    pub fn as_url(&self) -> &Url {
        &self.0
    }

    pub fn scheme(&self) -> &str {
        self.0.scheme()
    }

    pub fn host(&self) -> &str {
        self.0.host_str().unwrap_or("")
    }

    pub fn port(&self) -> Option<u16> {
        self.0.port()
    }

    pub fn path(&self) -> &str {
        self.0.path()
    }

    pub fn query(&self) -> Option<&str> {
        self.0.query()
    }

    /// `scheme://host[:port]` with no path — used to set `Origin`.
    pub fn origin(&self) -> String {
        match self.port() {
            Some(p) => format!("{}://{}:{}", self.scheme(), self.host(), p),
            None => format!("{}://{}", self.scheme(), self.host()),
        }
    }

    /// Resolve a possibly-relative reference against this URL.
    pub fn resolve(&self, reference: &str) -> Option<Url> {
        self.0.join(reference).ok()
    }

    /// Build the proxy-local URL for an already-resolved absolute URL:
    /// `{proxyPrefix}?url={percentEncode(absolute)}`.
    pub fn to_proxy_url(resolved: &Url) -> String {
        let encoded = utf8_percent_encode(resolved.as_str(), NON_ALPHANUMERIC);
        format!("{PROXY_PREFIX}?url={encoded}")
    }
}

impl fmt::Display for TargetURL {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The path every rewritten reference re-enters the proxy through.
pub const PROXY_PREFIX: &str = "/powerthrough";

fn looks_like_bare_domain(raw: &str) -> bool {
    if raw.contains(char::is_whitespace) {
        return false;
    }
    match raw.rsplit_once('.') {
        Some((head, tld)) => !head.is_empty() && tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_absolute_https_url() {
        let t = TargetURL::validate("https://example.com/p").unwrap();
        assert_eq!(t.host(), "example.com");
    }

    #[test]
    fn rejects_empty() {
        assert!(matches!(TargetURL::validate(""), Err(ProxyError::MissingTarget)));
    }

    #[test]
    fn rejects_localhost() {
        assert!(matches!(
            TargetURL::validate("http://localhost/"),
            Err(ProxyError::BlockedHost)
        ));
    }

    #[test]
    fn rejects_loopback_ip() {
        assert!(matches!(
            TargetURL::validate("http://127.0.0.1/"),
            Err(ProxyError::BlockedHost)
        ));
    }

    #[test]
    fn rejects_rfc1918_ranges() {
        assert!(matches!(
            TargetURL::validate("http://10.0.0.5/"),
            Err(ProxyError::BlockedHost)
        ));
        assert!(matches!(
            TargetURL::validate("http://172.16.0.1/"),
            Err(ProxyError::BlockedHost)
        ));
        assert!(matches!(
            TargetURL::validate("http://192.168.1.1/"),
            Err(ProxyError::BlockedHost)
        ));
    }

    #[test]
    fn rejects_ipv6_loopback_and_unique_local() {
        assert!(matches!(
            TargetURL::validate("http://[::1]/"),
            Err(ProxyError::BlockedHost)
        ));
        assert!(matches!(
            TargetURL::validate("http://[fd00::1]/"),
            Err(ProxyError::BlockedHost)
        ));
        assert!(matches!(
            TargetURL::validate("http://[::ffff:127.0.0.1]/"),
            Err(ProxyError::BlockedHost)
        ));
    }

    #[test]
    fn allows_public_172_range() {
        // 172.32.x.x is outside the 172.16/12 block.
        assert!(TargetURL::validate("http://172.32.0.1/").is_ok());
    }

    #[test]
    fn rejects_unsupported_scheme() {
        assert!(matches!(
            TargetURL::validate("ftp://example.com/"),
            Err(ProxyError::UnsupportedScheme)
        ));
    }

    #[test]
    fn bare_domain_gets_https_prefix() {
        let t = TargetURL::validate("example.com").unwrap();
        assert_eq!(t.scheme(), "https");
        assert_eq!(t.host(), "example.com");
    }

    #[test]
    fn non_url_becomes_duckduckgo_search() {
        let t = TargetURL::validate("hello world").unwrap();
        assert_eq!(t.host(), "duckduckgo.com");
        assert_eq!(t.query(), Some("q=hello+world"));
    }

    #[test]
    fn proxy_url_is_percent_encoded() {
        let resolved = Url::parse("https://example.com/foo").unwrap();
        let p = TargetURL::to_proxy_url(&resolved);
        assert_eq!(p, "/powerthrough?url=https%3A%2F%2Fexample.com%2Ffoo");
    }
}
