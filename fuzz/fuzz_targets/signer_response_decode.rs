#![no_main]

use libfuzzer_sys::fuzz_target;
use rescue_signer::codec;

fuzz_target!(|data: &[u8]| {
    // Phantom answers with raw bytes
    if let Ok(psbt) = codec::from_bytes(data) {
        let _ = codec::to_base64(&psbt);
    }

    // Everyone else answers with hex or base64 text
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = codec::from_hex(s);
        let _ = codec::from_base64(s);
        let _ = codec::from_text(s);
    }
});
