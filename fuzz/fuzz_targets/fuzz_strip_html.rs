#![no_main]

use libfuzzer_sys::fuzz_target;
use ticket_ferry::util::strip_html;

fuzz_target!(|data: &[u8]| {
    let Ok(html) = std::str::from_utf8(data) else {
        return;
    };
    let text = strip_html(html);
    assert_eq!(text.trim(), text);
});
