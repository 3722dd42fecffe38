//! Fuzz target for stored record parsing

#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_session::{IdentityKey, IdentityKeyPair, PreKeyRecord, SessionRecord, SignedPreKeyRecord};

fuzz_target!(|data: &[u8]| {
    if let Ok(record) = SessionRecord::deserialize(data) {
        let serialized = record.serialize().unwrap();
        assert_eq!(SessionRecord::deserialize(&serialized).unwrap(), record);
    }

    if let Ok(record) = PreKeyRecord::deserialize(data) {
        assert_eq!(record.serialize().unwrap(), data);
    }

    if let Ok(record) = SignedPreKeyRecord::deserialize(data) {
        assert_eq!(record.serialize().unwrap(), data);
    }

    let _ = IdentityKeyPair::deserialize(data);
    let _ = IdentityKey::deserialize(data);
});
