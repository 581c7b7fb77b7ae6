// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Fuzz target for the MAAP PDU parser.
//!
//! This fuzzer tests the parser's robustness against malformed frames.

#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Must not panic on any input; well-formed frames (sv bit set, as
    // every conformant sender emits) must re-encode to the same bytes.
    if let Ok(pdu) = maap::MaapPdu::parse(data) {
        let frame = pdu.encode().expect("decoded PDU must re-encode");
        if data[15] >> 7 == 1 {
            assert_eq!(&frame[..], &data[..frame.len()]);
        }
    }
});
