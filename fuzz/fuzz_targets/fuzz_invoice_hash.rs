#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        // Errors are fine, panics are bugs.
        let _ = fatoora::xml::hash_invoice(s);
        let _ = fatoora::xml::UblDocument::parse(s).map(|doc| fatoora::xml::qr::phase_one(&doc));
    }
});
