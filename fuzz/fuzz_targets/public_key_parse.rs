#![no_main]

use libfuzzer_sys::fuzz_target;
use rescue_core::script::decode_public_key;
use rescue_core::{parse_public_key, validate_public_key};

fuzz_target!(|data: &[u8]| {
    // Raw bytes, as a wallet reports them
    if let Ok(key) = decode_public_key(data) {
        assert_eq!(key.to_bytes().as_slice(), data);
    }

    // Hex text, as typed by the user
    if let Ok(s) = std::str::from_utf8(data) {
        let parsed = parse_public_key(s);
        assert_eq!(parsed.is_ok(), validate_public_key(s));
    }
});
