use once_cell_regex::CSS_URL;

use crate::target_url::TargetURL;

/// Rewrite every `url(...)` token in a stylesheet so that resolvable
/// references re-enter the proxy (spec.md §4.5).
///
/// `data:` and fragment-only (`#...`) values are left untouched, as are
/// values that fail to resolve against `base`. Quotes around the URL are
/// always dropped in the output, matching the spec's exact grammar.
pub fn rewrite_css(css: &str, base: &TargetURL) -> String {
    CSS_URL
        .replace_all(css, |caps: &regex::Captures| {
            let raw = &caps[1];
            let inner = strip_quotes(raw);

            if inner.starts_with("data:") || inner.starts_with('#') {
                return caps[0].to_string();
            }

            match base.resolve(inner) {
                Some(resolved) => format!("url({})", TargetURL::to_proxy_url(&resolved)),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn strip_quotes(raw: &str) -> &str {
    let raw = raw.trim();
    if raw.len() >= 2 {
        let bytes = raw.as_bytes();
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'\'' && last == b'\'') || (first == b'"' && last == b'"') {
            return &raw[1..raw.len() - 1];
        }
    }
    raw
}

/// Regex module kept separate so the lazily-compiled pattern is built once.
mod once_cell_regex {
    use regex::Regex;
    use std::sync::OnceLock;

    /// `url(` then any run of non-`)` characters (covers quoted and bare
    /// forms) then `)` — matches spec.md §4.5's `url(['"]?X['"]?)` grammar.
    pub struct LazyRegex(OnceLock<Regex>);

    impl LazyRegex {
        pub const fn new() -> Self {
            LazyRegex(OnceLock::new())
        }

        fn get(&self) -> &Regex {
            self.0
                .get_or_init(|| Regex::new(r#"url\(\s*([^)]*?)\s*\)"#).expect("valid css url regex"))
        }

        pub fn replace_all<'h, F>(&self, text: &'h str, rep: F) -> std::borrow::Cow<'h, str>
        where
            F: FnMut(&regex::Captures) -> String,
        {
            self.get().replace_all(text, rep)
        }
    }

    pub static CSS_URL: LazyRegex = LazyRegex::new();
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> TargetURL {
        TargetURL::validate("https://example.com/p").unwrap()
    }

    #[test]
    fn rewrites_single_quoted_url() {
        let out = rewrite_css("body{background:url('/bg.png')}", &base());
        assert_eq!(
            out,
            "body{background:url(/powerthrough?url=https%3A%2F%2Fexample.com%2Fbg.png)}"
        );
    }

    #[test]
    fn rewrites_bare_and_double_quoted() {
        let out = rewrite_css(r#"a{b:url(/x.png)} c{d:url("/y.png")}"#, &base());
        assert!(out.contains("url=https%3A%2F%2Fexample.com%2Fx.png"));
        assert!(out.contains("url=https%3A%2F%2Fexample.com%2Fy.png"));
        assert!(!out.contains('\''));
    }

    #[test]
    fn leaves_data_uri_untouched() {
        let css = "body{background:url(data:image/png;base64,AAAA)}";
        assert_eq!(rewrite_css(css, &base()), css);
    }

    #[test]
    fn leaves_fragment_only_untouched() {
        let css = "svg{fill:url(#gradient)}";
        assert_eq!(rewrite_css(css, &base()), css);
    }

    #[test]
    fn idempotent_on_already_proxied_url() {
        let once = rewrite_css("a{b:url('/bg.png')}", &base());
        let twice = rewrite_css(&once, &base());
        assert_eq!(once, twice);
    }
}
