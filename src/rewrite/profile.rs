/// Per-hostname content policy (spec.md §3 "RewriteProfile", §4.3/§4.4).
///
/// Matched by case-insensitive substring of the upstream hostname — the
/// first matching profile in `match_profile` wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteProfile {
    pub csp: Option<CspProfile>,
    pub html_patch: Option<HtmlPatch>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CspProfile {
    DuckduckgoHardened,
    GoogleCompatible,
    BingCompatible,
}

impl CspProfile {
    /// The permissive, `default-src *`-style CSP string named by the profile.
    pub fn header_value(&self) -> &'static str {
        match self {
            CspProfile::DuckduckgoHardened => {
                "default-src * data: blob: 'unsafe-inline' 'unsafe-eval'; \
                 script-src * data: blob: 'unsafe-inline' 'unsafe-eval'; \
                 style-src * data: blob: 'unsafe-inline'; \
                 img-src * data: blob:; \
                 connect-src * data: blob:; \
                 frame-src *; frame-ancestors *"
            }
            CspProfile::GoogleCompatible => {
                "default-src * 'unsafe-inline' 'unsafe-eval'; \
                 script-src * 'unsafe-inline' 'unsafe-eval' blob:; \
                 style-src * 'unsafe-inline'; \
                 img-src * data: blob:; \
                 connect-src * blob:; \
                 frame-src *; frame-ancestors *"
            }
            CspProfile::BingCompatible => {
                "default-src * data: blob: 'unsafe-inline' 'unsafe-eval'; \
                 img-src * data: blob:; \
                 style-src * 'unsafe-inline'; \
                 connect-src *; \
                 frame-ancestors *"
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HtmlPatch {
    DuckduckgoHardened,
    GoogleCompatible,
}

/// `(hostname substring, profile)` table, checked in order.
const PROFILES: &[(&str, RewriteProfile)] = &[
    (
        "duckduckgo.com",
        RewriteProfile {
            csp: Some(CspProfile::DuckduckgoHardened),
            html_patch: Some(HtmlPatch::DuckduckgoHardened),
        },
    ),
    (
        "google.com",
        RewriteProfile {
            csp: Some(CspProfile::GoogleCompatible),
            html_patch: Some(HtmlPatch::GoogleCompatible),
        },
    ),
    (
        "bing.com",
        RewriteProfile {
            csp: Some(CspProfile::BingCompatible),
            html_patch: None,
        },
    ),
];

/// Match a profile by case-insensitive substring of the upstream hostname.
pub fn match_profile(host: &str) -> Option<RewriteProfile> {
    let host = host.to_ascii_lowercase();
    PROFILES
        .iter()
        .find(|(needle, _)| host.contains(needle))
        .map(|(_, profile)| *profile)
}

/// Apply a per-host HTML post-patch to already-serialized HTML (spec.md §4.4 step 4).
pub fn apply_html_patch(patch: HtmlPatch, html: &str) -> String {
    match patch {
        HtmlPatch::DuckduckgoHardened => strip_integrity(&html.replace("href=\"//", "href=\"https://")),
        HtmlPatch::GoogleCompatible => strip_attr(html, "nonce"),
    }
}

fn strip_integrity(html: &str) -> String {
    strip_attr(html, "integrity")
}

/// Remove every `name="..."` attribute occurrence (double-quoted values only,
/// matching the table's own `integrity="…"` / `nonce="…"` examples).
fn strip_attr(html: &str, name: &str) -> String {
    let needle = format!("{name}=\"");
    let mut out = String::with_capacity(html.len());
    let mut rest = html;
    while let Some(pos) = rest.find(&needle) {
        out.push_str(&rest[..pos]);
        let after_quote = &rest[pos + needle.len()..];
        match after_quote.find('"') {
            Some(end) => {
                rest = &after_quote[end + 1..];
                // Drop one adjacent space so we don't leave `tag   >`.
                if out.ends_with(' ') && rest.starts_with(' ') {
                    rest = &rest[1..];
                }
            }
            None => {
                // Unterminated attribute value; leave the rest untouched.
                out.push_str(&needle);
                rest = after_quote;
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_by_substring_case_insensitive() {
        assert!(match_profile("www.DuckDuckGo.com").is_some());
        assert!(match_profile("example.com").is_none());
    }

    #[test]
    fn ddg_patch_rewrites_protocol_relative_and_strips_integrity() {
        let html = r#"<link href="//cdn.example.com/a.css" integrity="sha256-abc" rel="stylesheet">"#;
        let out = apply_html_patch(HtmlPatch::DuckduckgoHardened, html);
        assert!(out.contains(r#"href="https://cdn.example.com/a.css""#));
        assert!(!out.contains("integrity"));
    }

    #[test]
    fn google_patch_strips_nonce() {
        let html = r#"<script nonce="abc123" src="/a.js"></script>"#;
        let out = apply_html_patch(HtmlPatch::GoogleCompatible, html);
        assert!(!out.contains("nonce"));
        assert!(out.contains(r#"src="/a.js""#));
    }
}
