//! Utility functions for `ticket_ferry`.
//!
//! - [`html`] - HTML to plain text for source conversation bodies
//! - [`time`] - Source timestamp parsing and destination timezone adjustment

pub mod html;
pub mod time;

pub use html::strip_html;
pub use time::{format_for_destination, parse_source_timestamp, parse_utc_offset};

/// Normalize a lookup key: trimmed, inner whitespace collapsed, lower-cased.
#[must_use]
pub fn normalize_key(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
