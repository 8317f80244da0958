#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = fatoora::xml::qr::decode_tlv(data);
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = fatoora::xml::qr::read_qr(s);
    }
});
