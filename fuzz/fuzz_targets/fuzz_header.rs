#![no_main]

use libfuzzer_sys::fuzz_target;
use service_link::core::header::Header;

fuzz_target!(|data: &[u8]| {
    // Whatever decodes must survive a re-encode unchanged
    if let Ok(header) = Header::decode(data) {
        let reencoded = header.encode();
        let again = Header::decode(&reencoded).ok();
        assert_eq!(again.as_ref(), Some(&header));
    }
});
