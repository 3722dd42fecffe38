//! Fuzz target for decryption of hostile ciphertexts
//!
//! Feeds arbitrary bodies to an established session. Nothing may panic and
//! a rejected message must leave the stored session untouched.

#![no_main]

use std::sync::OnceLock;

use libfuzzer_sys::fuzz_target;
use signal_session::storage::{PreKeyStore, SessionStore, SignedPreKeyStore};
use signal_session::{
    CiphertextMessage, DefaultCryptoProvider, IdentityKeyPair, InMemoryProtocolStore,
    MessageType, PreKeyBundle, PreKeyRecord, ProtocolAddress, SessionBuilder, SessionCipher,
    SessionRecord, SignedPreKeyRecord,
};

/// Bob's side of a session Alice has opened, as a serialized record.
fn bob_session() -> &'static (IdentityKeyPair, Vec<u8>) {
    static SESSION: OnceLock<(IdentityKeyPair, Vec<u8>)> = OnceLock::new();
    SESSION.get_or_init(|| {
        let crypto = DefaultCryptoProvider::from_seed([7u8; 32]);
        let bob_identity = IdentityKeyPair::generate(&crypto).unwrap();
        let mut bob = InMemoryProtocolStore::new(bob_identity.clone(), 2);
        let signed = SignedPreKeyRecord::generate(1, 0, &bob_identity, &crypto).unwrap();
        let one_time = PreKeyRecord::generate(1, &crypto).unwrap();
        let bundle =
            PreKeyBundle::from_records(2, 1, Some(&one_time), &signed, *bob_identity.identity_key());
        bob.store_signed_pre_key(1, signed).unwrap();
        bob.store_pre_key(1, one_time).unwrap();

        let mut alice = InMemoryProtocolStore::new(IdentityKeyPair::generate(&crypto).unwrap(), 1);
        let alice_address = ProtocolAddress::new("alice", 1);
        let bob_address = ProtocolAddress::new("bob", 1);
        SessionBuilder::new(&mut alice, &crypto, bob_address.clone())
            .process_pre_key_bundle(&bundle)
            .unwrap();
        let hello = SessionCipher::new(&mut alice, &crypto, bob_address)
            .encrypt(b"hello")
            .unwrap();
        SessionCipher::new(&mut bob, &crypto, alice_address.clone())
            .decrypt_ciphertext(&hello)
            .unwrap();

        let record = bob.load_session(&alice_address).unwrap().unwrap();
        (bob_identity, record.serialize().unwrap())
    })
}

fuzz_target!(|data: &[u8]| {
    let Some((&tag, body)) = data.split_first() else {
        return;
    };
    let message_type = if tag & 1 == 0 {
        MessageType::Whisper
    } else {
        MessageType::PreKey
    };

    let (identity, bytes) = bob_session();
    let record = SessionRecord::deserialize(bytes).unwrap();
    let alice_address = ProtocolAddress::new("alice", 1);
    let mut store = InMemoryProtocolStore::new(identity.clone(), 2);
    store.store_session(&alice_address, &record).unwrap();

    let crypto = DefaultCryptoProvider::from_seed([8u8; 32]);
    let message = CiphertextMessage {
        message_type,
        body: body.to_vec(),
    };
    let result = SessionCipher::new(&mut store, &crypto, alice_address.clone())
        .decrypt_ciphertext(&message);

    if result.is_err() {
        assert_eq!(store.load_session(&alice_address).unwrap(), Some(record));
    }
});
