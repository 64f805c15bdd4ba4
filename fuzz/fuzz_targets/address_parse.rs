#![no_main]

use bitcoin::Network;
use libfuzzer_sys::fuzz_target;
use rescue_core::{output_script_for, parse_address, validate_address};

fuzz_target!(|data: &[u8]| {
    let Ok(s) = std::str::from_utf8(data) else {
        return;
    };
    for network in [
        Network::Bitcoin,
        Network::Testnet,
        Network::Signet,
        Network::Regtest,
    ] {
        match parse_address(s, network) {
            Ok(address) => {
                assert!(validate_address(s, network));
                let script = output_script_for(s, network).unwrap();
                assert_eq!(script, address.script_pubkey());
            }
            Err(_) => assert!(!validate_address(s, network)),
        }
    }
});
