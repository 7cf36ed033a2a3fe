//! HTML to plain text conversion.
//!
//! Source conversation bodies arrive as rich-text HTML. Destination comments are
//! plain text, so block-level tags become line breaks, all other markup is
//! dropped, and common character entities are decoded.

use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_STYLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)<(script|style)\b[^>]*>.*?</(script|style)\s*>").expect("valid regex")
});
static LINE_BREAK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)<br\s*/?>|</(p|div|li|tr|h[1-6]|blockquote)\s*>").expect("valid regex")
});
static TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]*>").expect("valid regex"));
static ENTITY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"&(#[0-9]{1,7}|#[xX][0-9a-fA-F]{1,6}|[a-zA-Z]{2,8});").expect("valid regex"));
static BLANK_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

/// Strip HTML markup and return readable plain text.
#[must_use]
pub fn strip_html(content: &str) -> String {
    if !content.contains('<') && !content.contains('&') {
        return content.trim().to_string();
    }

    let text = SCRIPT_STYLE.replace_all(content, "");
    let text = LINE_BREAK.replace_all(&text, "\n");
    let text = TAG.replace_all(&text, "");
    let text = ENTITY.replace_all(&text, |caps: &regex::Captures<'_>| {
        decode_entity(&caps[1]).unwrap_or_else(|| caps[0].to_string())
    });

    let lines: Vec<&str> = text.lines().map(str::trim_end).collect();
    let joined = lines.join("\n");
    BLANK_RUN.replace_all(&joined, "\n\n").trim().to_string()
}

fn decode_entity(name: &str) -> Option<String> {
    if let Some(numeric) = name.strip_prefix('#') {
        let code = if let Some(hex) = numeric.strip_prefix(['x', 'X']) {
            u32::from_str_radix(hex, 16).ok()?
        } else {
            numeric.parse::<u32>().ok()?
        };
        return char::from_u32(code).map(|c| c.to_string());
    }

    let decoded = match name {
        "amp" => "&",
        "lt" => "<",
        "gt" => ">",
        "quot" => "\"",
        "apos" => "'",
        "nbsp" => " ",
        "ndash" => "-",
        "mdash" => "--",
        "hellip" => "...",
        "copy" => "(c)",
        _ => return None,
    };
    Some(decoded.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_text_passes_through() {
        assert_eq!(strip_html("  printer is jammed  "), "printer is jammed");
    }

    #[test]
    fn block_tags_become_newlines() {
        let html = "<p>Hello team,</p><p>The printer<br/>is jammed.</p>";
        assert_eq!(strip_html(html), "Hello team,\nThe printer\nis jammed.");
    }

    #[test]
    fn entities_are_decoded() {
        assert_eq!(strip_html("A &amp; B &lt;ok&gt; &#39;x&#x27;"), "A & B <ok> 'x'");
        assert_eq!(strip_html("&bogus; stays"), "&bogus; stays");
    }

    #[test]
    fn script_and_style_are_removed() {
        let html = "<style>p{color:red}</style><div>Body</div><script>alert(1)</script>";
        assert_eq!(strip_html(html), "Body");
    }

    #[test]
    fn blank_runs_are_collapsed() {
        let html = "<p>one</p><p></p><p></p><p></p><p>two</p>";
        assert_eq!(strip_html(html), "one\n\ntwo");
    }
}
