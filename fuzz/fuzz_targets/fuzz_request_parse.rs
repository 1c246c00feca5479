#![no_main]

//! The control-request parser must never panic on arbitrary input; it may
//! only return a `ParseError`.

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(request) = locshim::http::parse_request(text) {
            let _ = request.float_param("lat");
            let _ = request.float_param("lon");
            let _ = request.float_param("acc");
        }
    }
});
