#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cert) = fatoora::signing::Certificate::parse(s) {
            let _ = cert.info();
        }
        let _ = fatoora::signing::PrivateKey::parse(s);
    }
});
