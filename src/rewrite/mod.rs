pub mod css;
pub mod html;
pub mod profile;

use crate::target_url::TargetURL;
use profile::{match_profile, RewriteProfile};

pub use css::rewrite_css;
pub use html::rewrite_html;

/// Rewrite an HTML document body, applying the per-host profile's HTML patch
/// (if any) as part of the same pass (spec.md §4.4 step 4).
pub fn rewrite_html_body(html: &str, base: &TargetURL) -> Result<String, lol_html::errors::RewritingError> {
    let profile = match_profile(base.host());
    let patch = profile.and_then(|p| p.html_patch);
    rewrite_html(html, base, patch)
}

/// Look up the rewrite profile for the given base URL's host, if any.
pub fn profile_for(base: &TargetURL) -> Option<RewriteProfile> {
    match_profile(base.host())
}
