//! The crypto backend consumed by every protocol component.
//!
//! [`CryptoProvider`] is passed explicitly to builders and ciphers; there is
//! no process-wide provider. [`DefaultCryptoProvider`] implements it with
//! X25519, XEdDSA, HMAC/HKDF-SHA256 and ChaCha20-Poly1305.

use crate::error::{Error, Result};
use crate::keys::{DhOutput, KeyPair, PrivateKey, PublicKey};
use crate::xeddsa::{self, SigningKey};

use chacha20poly1305::{
    aead::{Aead, Payload},
    ChaCha20Poly1305, Key, KeyInit, Nonce,
};
use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use rand_chacha::ChaCha20Rng;
use rand_core::{OsRng, RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use x25519_dalek::{PublicKey as X25519PublicKey, StaticSecret};
use zeroize::{Zeroize, Zeroizing};

pub const KEY_SIZE_32: usize = 32;
pub const IV_SIZE: usize = 16;
pub const NONCE_SIZE: usize = 12;
pub const TAG_SIZE: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Primitive operations the protocol core calls into.
///
/// Implementations must be usable through a shared reference and should not
/// block. Every method that can fail reports one of the crate's error kinds;
/// AEAD authentication failures are always [`Error::DecryptionFailed`].
pub trait CryptoProvider {
    /// Fill `dest` with cryptographically secure random bytes.
    fn fill_random(&self, dest: &mut [u8]) -> Result<()>;

    fn random_bytes(&self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.fill_random(&mut bytes)?;
        Ok(bytes)
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32];

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32]>;

    /// HKDF-SHA256. An empty `salt` means no salt.
    fn hkdf(&self, ikm: &[u8], info: &[u8], len: usize, salt: &[u8])
        -> Result<Zeroizing<Vec<u8>>>;

    fn aead_encrypt(
        &self,
        key: &[u8; KEY_SIZE_32],
        iv: &[u8; IV_SIZE],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>>;

    fn aead_decrypt(
        &self,
        key: &[u8; KEY_SIZE_32],
        iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>>;

    fn generate_key_pair(&self) -> Result<KeyPair>;

    /// Derive the public key belonging to `private`.
    fn public_key(&self, private: &PrivateKey) -> Result<PublicKey>;

    /// Diffie-Hellman agreement.
    fn agree(&self, private: &PrivateKey, public: &PublicKey) -> Result<DhOutput>;

    fn sign(&self, private: &PrivateKey, message: &[u8]) -> Result<Vec<u8>>;

    /// `Ok(false)` for a well-formed call whose signature does not match.
    fn verify(&self, public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<bool>;
}

/// Default backend built on the dalek and RustCrypto crates.
///
/// Randomness comes from a ChaCha20 generator seeded from the operating
/// system, or from a caller-supplied seed for reproducible tests.
pub struct DefaultCryptoProvider {
    rng: Mutex<ChaCha20Rng>,
}

impl DefaultCryptoProvider {
    #[must_use]
    pub fn new() -> Self {
        let mut seed = [0u8; 32];
        OsRng.fill_bytes(&mut seed);
        let provider = Self::from_seed(seed);
        seed.zeroize();
        provider
    }

    /// Deterministic provider. Two providers built from the same seed produce
    /// the same keys and signatures.
    #[must_use]
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            rng: Mutex::new(ChaCha20Rng::from_seed(seed)),
        }
    }
}

impl Default for DefaultCryptoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefaultCryptoProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DefaultCryptoProvider([REDACTED])")
    }
}

fn clamp(mut bytes: [u8; KEY_SIZE_32]) -> [u8; KEY_SIZE_32] {
    bytes[0] &= 248;
    bytes[31] &= 127;
    bytes[31] |= 64;
    bytes
}

fn nonce_from_iv(iv: &[u8; IV_SIZE]) -> &Nonce {
    Nonce::from_slice(&iv[..NONCE_SIZE])
}

impl CryptoProvider for DefaultCryptoProvider {
    fn fill_random(&self, dest: &mut [u8]) -> Result<()> {
        let mut rng = self.rng.lock().map_err(|_| Error::CryptoError)?;
        rng.fill_bytes(dest);
        Ok(())
    }

    fn sha256(&self, data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    fn hmac_sha256(&self, key: &[u8], data: &[u8]) -> Result<[u8; 32]> {
        let mut mac = <HmacSha256 as Mac>::new_from_slice(key).map_err(|_| Error::CryptoError)?;
        mac.update(data);
        Ok(mac.finalize().into_bytes().into())
    }

    fn hkdf(
        &self,
        ikm: &[u8],
        info: &[u8],
        len: usize,
        salt: &[u8],
    ) -> Result<Zeroizing<Vec<u8>>> {
        let salt = (!salt.is_empty()).then_some(salt);
        let hkdf = Hkdf::<Sha256>::new(salt, ikm);
        let mut output = Zeroizing::new(vec![0u8; len]);
        hkdf.expand(info, &mut output)
            .map_err(|_| Error::CryptoError)?;
        Ok(output)
    }

    fn aead_encrypt(
        &self,
        key: &[u8; KEY_SIZE_32],
        iv: &[u8; IV_SIZE],
        plaintext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let payload = Payload {
            msg: plaintext,
            aad: associated_data,
        };
        cipher
            .encrypt(nonce_from_iv(iv), payload)
            .map_err(|_| Error::CryptoError)
    }

    fn aead_decrypt(
        &self,
        key: &[u8; KEY_SIZE_32],
        iv: &[u8; IV_SIZE],
        ciphertext: &[u8],
        associated_data: &[u8],
    ) -> Result<Vec<u8>> {
        let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
        let payload = Payload {
            msg: ciphertext,
            aad: associated_data,
        };
        cipher
            .decrypt(nonce_from_iv(iv), payload)
            .map_err(|_| Error::DecryptionFailed)
    }

    fn generate_key_pair(&self) -> Result<KeyPair> {
        let mut bytes = [0u8; KEY_SIZE_32];
        self.fill_random(&mut bytes)?;
        let private_key = PrivateKey::from_bytes(clamp(bytes));
        bytes.zeroize();
        let public_key = self.public_key(&private_key)?;
        Ok(KeyPair::new(public_key, private_key))
    }

    fn public_key(&self, private: &PrivateKey) -> Result<PublicKey> {
        let secret = StaticSecret::from(*private.as_bytes());
        Ok(PublicKey::from_bytes(
            X25519PublicKey::from(&secret).to_bytes(),
        ))
    }

    fn agree(&self, private: &PrivateKey, public: &PublicKey) -> Result<DhOutput> {
        let secret = StaticSecret::from(*private.as_bytes());
        let shared = secret.diffie_hellman(&X25519PublicKey::from(*public.as_bytes()));
        if !shared.was_contributory() {
            return Err(Error::InvalidKey);
        }
        Ok(DhOutput::from_bytes(shared.to_bytes()))
    }

    fn sign(&self, private: &PrivateKey, message: &[u8]) -> Result<Vec<u8>> {
        let mut random = Zeroizing::new([0u8; xeddsa::RANDOM_LENGTH]);
        self.fill_random(&mut random[..])?;
        let signer = SigningKey::from_x25519(private.as_bytes());
        Ok(signer.sign(message, &random).to_vec())
    }

    fn verify(&self, public: &PublicKey, message: &[u8], signature: &[u8]) -> Result<bool> {
        Ok(xeddsa::verify(public.as_bytes(), message, signature))
    }
}
