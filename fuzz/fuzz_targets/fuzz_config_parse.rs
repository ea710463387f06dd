// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        if let Ok(cfg) = omnisupply::core::config::parse_config(s) {
            // A validated config always yields a reachable quorum.
            let oc = cfg.oracle_config().expect("validated");
            assert!(oc.required_signatures >= 1);
            assert!(oc.required_signatures <= cfg.signer_keys().expect("validated").len());
        }
    }
});
