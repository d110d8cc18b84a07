use lol_html::{element, HtmlRewriter, Settings};

use crate::rewrite::profile::{apply_html_patch, HtmlPatch};
use crate::target_url::TargetURL;

/// `(selector, attribute)` table from spec.md §4.4.
const ATTR_TABLE: &[(&str, &str)] = &[
    ("a", "href"),
    ("link", "href"),
    ("img", "src"),
    ("script", "src"),
    ("iframe", "src"),
    ("source", "src"),
    ("video", "src"),
    ("audio", "src"),
    ("track", "src"),
    ("form", "action"),
];

/// Rewrite an HTML document so that every URL-bearing attribute re-enters the
/// proxy (spec.md §4.4). `html_patch` is an optional per-host post-pass
/// applied to the serialized output.
pub fn rewrite_html(html: &str, base: &TargetURL, html_patch: Option<HtmlPatch>) -> Result<String, lol_html::errors::RewritingError> {
    let mut output = Vec::with_capacity(html.len());

    let handlers = ATTR_TABLE
        .iter()
        .map(|(selector, attr)| {
            let attr = *attr;
            let base = base.clone();
            element!(format!("{selector}[{attr}]"), move |el| {
                rewrite_attr(el, attr, &base);
                Ok(())
            })
        })
        .chain(std::iter::once({
            let base = base.clone();
            element!("form", move |el| {
                if el.get_attribute("action").is_none() {
                    el.set_attribute("action", &TargetURL::to_proxy_url(base.as_url()))
                        .ok();
                }
                Ok(())
            })
        }))
        .chain(std::iter::once({
            let base = base.clone();
            element!("[srcset]", move |el| {
                if let Some(srcset) = el.get_attribute("srcset") {
                    let rewritten = rewrite_srcset(&srcset, &base);
                    el.set_attribute("srcset", &rewritten).ok();
                }
                Ok(())
            })
        }))
        .collect();

    let mut rewriter = HtmlRewriter::new(
        Settings {
            element_content_handlers: handlers,
            ..Settings::default()
        },
        |c: &[u8]| output.extend_from_slice(c),
    );

    rewriter.write(html.as_bytes())?;
    rewriter.end()?;

    let mut serialized = String::from_utf8_lossy(&output).into_owned();
    if let Some(patch) = html_patch {
        serialized = apply_html_patch(patch, &serialized);
    }
    Ok(serialized)
}

fn rewrite_attr(el: &mut lol_html::html_content::Element, attr: &str, base: &TargetURL) {
    let Some(value) = el.get_attribute(attr) else {
        return;
    };
    if let Some(rewritten) = rewrite_url_value(&value, base) {
        el.set_attribute(attr, &rewritten).ok();
    }
}

/// Apply the per-attribute rewrite rules to a single URL value. Returns
/// `None` when the value should be left unchanged.
fn rewrite_url_value(value: &str, base: &TargetURL) -> Option<String> {
    let trimmed = value.trim();

    if trimmed.starts_with(crate::target_url::PROXY_PREFIX) {
        return None;
    }
    if trimmed.starts_with('#') {
        return None;
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("mailto:") || lower.starts_with("tel:") || lower.starts_with("javascript:") {
        return None;
    }

    base.resolve(trimmed).map(|resolved| TargetURL::to_proxy_url(&resolved))
}

/// Split a `srcset` value on commas, rewrite each entry's URL, and rejoin.
fn rewrite_srcset(srcset: &str, base: &TargetURL) -> String {
    srcset
        .split(',')
        .map(|entry| {
            let entry = entry.trim();
            let mut parts = entry.splitn(2, char::is_whitespace);
            let url = parts.next().unwrap_or("");
            let descriptor = parts.next();

            let rewritten = rewrite_url_value(url, base).unwrap_or_else(|| url.to_string());
            match descriptor {
                Some(d) => format!("{rewritten} {}", d.trim()),
                None => rewritten,
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TargetURL {
        TargetURL::validate("https://example.com/page").unwrap()
    }

    #[test]
    fn rewrites_anchor_and_image() {
        let html = r#"<a href="/a">x</a><img src="/b.png">"#;
        let out = rewrite_html(html, &base(), None).unwrap();
        assert!(out.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Fa"));
        assert!(out.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Fb.png"));
    }

    #[test]
    fn skips_fragment_mailto_tel_javascript() {
        let html = r#"<a href="#top">a</a><a href="mailto:x@y.com">b</a><a href="tel:+1">c</a><a href="javascript:void(0)">d</a>"#;
        let out = rewrite_html(html, &base(), None).unwrap();
        assert!(out.contains(r#"href="#top""#));
        assert!(out.contains(r#"href="mailto:x@y.com""#));
        assert!(out.contains(r#"href="tel:+1""#));
        assert!(out.contains(r#"href="javascript:void(0)""#));
    }

    #[test]
    fn skips_already_proxied_values() {
        let html = r#"<a href="/powerthrough?url=https%3A%2F%2Fexample.com%2Fz">z</a>"#;
        let out = rewrite_html(html, &base(), None).unwrap();
        assert!(out.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Fz"));
    }

    #[test]
    fn form_without_action_gets_base_proxy_url() {
        let html = "<form method=\"post\"></form>";
        let out = rewrite_html(html, &base(), None).unwrap();
        assert!(out.contains("action=\"/powerthrough?url=https%3A%2F%2Fexample.com%2Fpage\""));
    }

    #[test]
    fn srcset_entries_rewritten_with_descriptors() {
        let html = r#"<img srcset="/a.png 1x, /b.png 2x">"#;
        let out = rewrite_html(html, &base(), None).unwrap();
        assert!(out.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Fa.png 1x"));
        assert!(out.contains("/powerthrough?url=https%3A%2F%2Fexample.com%2Fb.png 2x"));
    }

    #[test]
    fn applies_ddg_host_patch_after_serialization() {
        let html = r#"<link href="/style.css" integrity="sha256-xyz">"#;
        let out = rewrite_html(html, &base(), Some(HtmlPatch::DuckduckgoHardened)).unwrap();
        assert!(!out.contains("integrity"));
    }
}
