// Copyright (c) 2026 Amunchain
// Licensed under the Apache-2.0 License.

#![no_main]
#![forbid(unsafe_code)]

use libfuzzer_sys::fuzz_target;
use omnisupply::core::bridge::message::TransferMessage;

fuzz_target!(|data: &[u8]| {
    // Strict decode: anything accepted must re-encode to the exact input.
    if let Ok(msg) = TransferMessage::decode(data) {
        assert_eq!(msg.encode(), data);
    }
});
