//! Link tracking — rewrites anchor targets into click-tracking redirects.
//!
//! Every `href` in the outbound body is replaced with
//! `<base>/track/<lead>/<campaign>?url=<encoded>&eqid=<item>` so the
//! redirect endpoint can record the click before forwarding. `mailto:`
//! targets and links that already point at the tracker are left alone,
//! which also makes the rewrite idempotent.

use std::sync::OnceLock;

use regex::{Captures, Regex};
use url::Url;

/// Path marker identifying an already-rewritten tracking link.
const TRACK_MARKER: &str = "/track/";

fn href_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"href="(.*?)""#).expect("href regex"))
}

/// Rewrite all trackable hrefs in `html` for the given identifiers.
pub fn rewrite_links(
    html: &str,
    lead_id: i64,
    campaign_id: i64,
    queue_item_id: i64,
    base_url: &str,
) -> String {
    href_re()
        .replace_all(html, |caps: &Captures<'_>| {
            let original = &caps[1];
            if original.contains(TRACK_MARKER) || original.starts_with("mailto:") {
                return caps[0].to_string();
            }
            match tracking_url(original, lead_id, campaign_id, queue_item_id, base_url) {
                Some(tracked) => format!(r#"href="{tracked}""#),
                // Unbuildable base URL: leave the link untouched rather
                // than corrupting the body.
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Build one tracking URL. The original target travels percent-encoded in
/// the `url` query parameter.
fn tracking_url(
    original: &str,
    lead_id: i64,
    campaign_id: i64,
    queue_item_id: i64,
    base_url: &str,
) -> Option<String> {
    let mut url = Url::parse(base_url).ok()?;
    {
        let mut segments = url.path_segments_mut().ok()?;
        segments.pop_if_empty();
        segments.push("track");
        segments.push(&lead_id.to_string());
        segments.push(&campaign_id.to_string());
    }
    url.query_pairs_mut()
        .append_pair("url", original)
        .append_pair("eqid", &queue_item_id.to_string());
    Some(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const BASE: &str = "https://mail.example.com";

    #[test]
    fn rewrites_plain_href() {
        let html = r#"<a href="https://example.com/x">go</a>"#;
        let out = rewrite_links(html, 1, 2, 3, BASE);
        assert!(out.contains(r#"href="https://mail.example.com/track/1/2?url="#), "{out}");
        assert!(out.contains("eqid=3"), "{out}");
        assert!(!out.contains(r#"href="https://example.com/x""#), "{out}");
    }

    #[test]
    fn original_url_is_percent_encoded() {
        let html = r#"<a href="https://example.com/x?a=1&b=2">go</a>"#;
        let out = rewrite_links(html, 1, 2, 3, BASE);
        assert!(
            out.contains("url=https%3A%2F%2Fexample.com%2Fx%3Fa%3D1%26b%3D2"),
            "{out}"
        );
    }

    #[test]
    fn mailto_links_untouched() {
        let html = r#"<a href="https://example.com/x">a</a> <a href="mailto:a@b.com">b</a>"#;
        let out = rewrite_links(html, 1, 2, 3, BASE);
        assert!(out.contains(r#"href="mailto:a@b.com""#), "{out}");
        assert!(out.contains("/track/1/2"), "{out}");
    }

    #[test]
    fn rewrite_is_idempotent() {
        let html = r#"<p><a href="https://example.com/x">go</a> and <a href="mailto:a@b.com">mail</a></p>"#;
        let once = rewrite_links(html, 1, 2, 3, BASE);
        let twice = rewrite_links(&once, 1, 2, 3, BASE);
        assert_eq!(once, twice);
    }

    #[test]
    fn rewrites_every_trackable_link() {
        let html = r#"<a href="https://one.example">1</a><a href="https://two.example">2</a>"#;
        let out = rewrite_links(html, 9, 8, 7, BASE);
        assert_eq!(out.matches("/track/9/8").count(), 2, "{out}");
    }

    #[test]
    fn body_without_links_unchanged() {
        let html = "<p>No links here</p>";
        assert_eq!(rewrite_links(html, 1, 2, 3, BASE), html);
    }

    #[test]
    fn base_url_with_path_keeps_its_prefix() {
        let html = r#"<a href="https://example.com/x">go</a>"#;
        let out = rewrite_links(html, 1, 2, 3, "https://example.org/app");
        assert!(out.contains(r#"href="https://example.org/app/track/1/2?"#), "{out}");
    }
}
