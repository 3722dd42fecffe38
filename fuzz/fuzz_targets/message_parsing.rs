//! Fuzz target for wire message parsing
//!
//! Arbitrary bytes must never panic, and anything that parses must
//! serialize back to the same bytes.

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_session::{PreKeySignalMessage, SignalMessage};

fuzz_target!(|data: &[u8]| {
    if let Ok(message) = SignalMessage::deserialize(data) {
        let serialized = message.serialize().unwrap();
        assert_eq!(serialized, data);
        assert_eq!(SignalMessage::deserialize(&serialized).unwrap(), message);
    }

    if let Ok(message) = PreKeySignalMessage::deserialize(data) {
        let serialized = message.serialize().unwrap();
        assert_eq!(PreKeySignalMessage::deserialize(&serialized).unwrap(), message);
    }
});
