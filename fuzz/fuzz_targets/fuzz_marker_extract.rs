#![no_main]

use libfuzzer_sys::fuzz_target;
use ticket_ferry::dedup::SubjectMarker;

fuzz_target!(|data: &[u8]| {
    let Ok(subject) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(marker) = SubjectMarker::new("SRC") else {
        return;
    };

    // An extracted id must re-embed to a subject that extracts the same id.
    if let Some(id) = marker.extract(subject) {
        let embedded = marker.embed("subject", id);
        assert_eq!(marker.extract(&embedded), Some(id));
    }
});
