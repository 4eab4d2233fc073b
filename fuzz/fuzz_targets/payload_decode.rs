//! Fuzz target for inbound payload decoding
//!
//! Feeds arbitrary bytes to every inbound topic family and to the history
//! decoder:
//! - Malformed JSON
//! - Type confusion (a typing signal on the message queue)
//! - Missing or mistyped fields
//!
//! The fuzzer should NEVER panic. All invalid inputs should return an error.

#![no_main]

use libfuzzer_sys::fuzz_target;
use parley_proto::{Inbound, InboundKind, decode_history};

fuzz_target!(|data: &[u8]| {
    for kind in [InboundKind::Message, InboundKind::MessageStatus, InboundKind::Typing] {
        if let Ok(decoded) = Inbound::decode(kind, data) {
            assert_eq!(decoded.kind(), kind);
        }
    }

    let _ = decode_history(data);
});
