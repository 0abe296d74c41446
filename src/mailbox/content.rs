//! Content normalizer — pure functions, no I/O.
//!
//! Isolates the newly written text of a reply by truncating at the first
//! quoted-reply marker, then stripping HTML.

use std::sync::LazyLock;

use regex::Regex;

/// Quoted-reply markers, in priority order.
///
/// Truncation happens at the start offset of the FIRST pattern in this
/// list that matches anywhere in the body — not at the earliest offset
/// across all patterns. Reordering these changes behavior.
static QUOTE_MARKERS: LazyLock<[Regex; 3]> = LazyLock::new(|| {
    [
        // "On <date> <person> wrote:" attribution line
        Regex::new(r"(?m)^\s*On .{0,200}wrote:").expect("wrote-marker regex"),
        // A From: header embedded in the body (forwarded/quoted headers)
        Regex::new(r"(?m)^From: ").expect("from-marker regex"),
        // Gmail's quoted-HTML container
        Regex::new(r#"<div[^>]*class="gmail_quote""#).expect("gmail-quote regex"),
    ]
});

/// Extract the new content from a raw message body.
///
/// Scans the marker patterns in priority order, truncates the body at the
/// start of the first one that matches, strips HTML tags from what
/// remains, and trims surrounding whitespace. A body with no markers is
/// kept whole.
pub fn extract_new_content(raw_body: &str) -> String {
    let cut = QUOTE_MARKERS
        .iter()
        .find_map(|marker| marker.find(raw_body))
        .map_or(raw_body.len(), |m| m.start());

    strip_html(&raw_body[..cut]).trim().to_string()
}

/// Extract the bare address from a header value.
///
/// `"Jane Doe <jane@x.com>"` yields `jane@x.com`; a value with no angle
/// brackets is returned trimmed.
pub fn extract_address(header_value: &str) -> String {
    static BRACKETED: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"<([^>]+)>").expect("address regex"));

    match BRACKETED.captures(header_value) {
        Some(caps) => caps[1].trim().to_string(),
        None => header_value.trim().to_string(),
    }
}

/// Remove HTML tags, leaving text content and whitespace untouched.
pub fn strip_html(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(ch),
            _ => {}
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── extract_new_content ─────────────────────────────────────────

    #[test]
    fn truncates_at_wrote_attribution() {
        let body = "Hello there\n\nOn Jan 1 wrote:\n> old text";
        assert_eq!(extract_new_content(body), "Hello there");
    }

    #[test]
    fn truncates_at_gmail_quote_container() {
        let body = "<p>Hi</p><div class=\"gmail_quote\">old</div>";
        assert_eq!(extract_new_content(body), "Hi");
    }

    #[test]
    fn truncates_at_embedded_from_header() {
        let body = "Sounds good.\n\nFrom: Alice <alice@x.com>\nSent: Monday\nold text";
        assert_eq!(extract_new_content(body), "Sounds good.");
    }

    #[test]
    fn no_markers_keeps_trimmed_input() {
        let body = "  Just a plain reply\nacross two lines  ";
        assert_eq!(
            extract_new_content(body),
            "Just a plain reply\nacross two lines"
        );
    }

    #[test]
    fn marker_with_no_html() {
        let body = "Confirmed for Friday.\nOn Tue, Feb 3, 2026 at 9:00 AM Bob <bob@x.com> wrote:\n> earlier";
        assert_eq!(extract_new_content(body), "Confirmed for Friday.");
    }

    #[test]
    fn body_entirely_html_without_markers() {
        let body = "<div><b>Works for me</b></div>";
        assert_eq!(extract_new_content(body), "Works for me");
    }

    #[test]
    fn empty_body() {
        assert_eq!(extract_new_content(""), "");
    }

    #[test]
    fn priority_order_beats_earliest_offset() {
        // The gmail_quote div sits earlier in the body, but the wrote:
        // marker is first in the pattern list, so truncation happens at
        // the wrote: line and the div survives into HTML stripping.
        let body = "Reply text\n<div class=\"gmail_quote\">html quote</div>\nOn Jan 1 Bob wrote:\n> old";
        assert_eq!(extract_new_content(body), "Reply text\nhtml quote");
    }

    #[test]
    fn wrote_line_mid_body_not_at_line_start_is_ignored() {
        let body = "He said he wrote: a book once";
        assert_eq!(extract_new_content(body), "He said he wrote: a book once");
    }

    // ── extract_address ─────────────────────────────────────────────

    #[test]
    fn address_from_display_name_form() {
        assert_eq!(extract_address("Jane Doe <jane@x.com>"), "jane@x.com");
    }

    #[test]
    fn address_plain_passthrough() {
        assert_eq!(extract_address("plain@x.com"), "plain@x.com");
    }

    #[test]
    fn address_plain_with_whitespace() {
        assert_eq!(extract_address("  padded@x.com  "), "padded@x.com");
    }

    #[test]
    fn address_quoted_display_name() {
        assert_eq!(
            extract_address("\"Doe, Jane\" <jane.doe@example.org>"),
            "jane.doe@example.org"
        );
    }

    // ── strip_html ──────────────────────────────────────────────────

    #[test]
    fn strip_html_basic() {
        assert_eq!(strip_html("<p>Hello</p>"), "Hello");
    }

    #[test]
    fn strip_html_nested_tags() {
        assert_eq!(
            strip_html("<div><b>Bold</b> and <i>italic</i></div>"),
            "Bold and italic"
        );
    }

    #[test]
    fn strip_html_with_attributes() {
        assert_eq!(
            strip_html(r#"<a href="https://example.com">Link</a>"#),
            "Link"
        );
    }

    #[test]
    fn strip_html_preserves_inner_whitespace() {
        assert_eq!(strip_html("<p>line one\nline two</p>"), "line one\nline two");
    }

    #[test]
    fn strip_html_plain_text_passthrough() {
        assert_eq!(strip_html("No HTML here"), "No HTML here");
    }
}
