#![no_main]

use libfuzzer_sys::fuzz_target;
use signal_session::{CryptoProvider, DefaultCryptoProvider, IdentityKey, PrivateKey, PublicKey};

const SIGNATURE_LENGTH: usize = 64;

fuzz_target!(|data: &[u8]| {
    let crypto = DefaultCryptoProvider::from_seed([0u8; 32]);

    // Arbitrary keys and signatures must verify false or error, never panic
    if data.len() >= 32 + SIGNATURE_LENGTH {
        let public = PublicKey::from_slice(&data[..32]).unwrap();
        let signature = &data[32..32 + SIGNATURE_LENGTH];
        let message = &data[32 + SIGNATURE_LENGTH..];
        let _ = IdentityKey::new(public).verify_signature(&crypto, message, signature);
    }

    // Any private key signs, and its own public key accepts the signature
    if data.len() >= 32 {
        let private = PrivateKey::from_slice(&data[..32]).unwrap();
        let message = &data[32..];
        let public = crypto.public_key(&private).unwrap();
        let signature = crypto.sign(&private, message).unwrap();
        assert!(crypto.verify(&public, message, &signature).unwrap());
    }
});
