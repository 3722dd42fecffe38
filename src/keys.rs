//! Key material: curve key pairs and long-term identities.
//!
//! These are plain value types. Generation, agreement and signing are
//! delegated to the [`CryptoProvider`] handed in by the caller.

use crate::{
    codec::{Reader, Writer},
    crypto::{CryptoProvider, KEY_SIZE_32},
    error::{Error, Result},
};
use subtle::ConstantTimeEq;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// X25519 public key (32 bytes)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PublicKey([u8; KEY_SIZE_32]);

impl PublicKey {
    /// Size in bytes
    pub const SIZE: usize = KEY_SIZE_32;

    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE_32] = bytes.try_into().map_err(|_| Error::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey([REDACTED])")
    }
}

/// X25519 private key with automatic zeroization
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PrivateKey([u8; KEY_SIZE_32]);

impl PrivateKey {
    /// Create from raw bytes
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    /// Create from a slice, which must be exactly 32 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let bytes: [u8; KEY_SIZE_32] = bytes.try_into().map_err(|_| Error::InvalidKey)?;
        Ok(Self(bytes))
    }

    /// Get raw bytes
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.ct_eq(&other.0).into()
    }
}

impl Eq for PrivateKey {}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// Output of Diffie-Hellman operation (32 bytes)
/// Automatically zeroized on drop
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DhOutput([u8; KEY_SIZE_32]);

impl DhOutput {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    /// Returns a byte slice of the Diffie-Hellman operation output
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }
}

impl std::fmt::Debug for DhOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "DhOutput([REDACTED])")
    }
}

/// Curve key pair used for ephemeral, ratchet and pre-keys.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct KeyPair {
    pub public_key: PublicKey,
    pub private_key: PrivateKey,
}

impl KeyPair {
    #[must_use]
    pub fn new(public_key: PublicKey, private_key: PrivateKey) -> Self {
        Self {
            public_key,
            private_key,
        }
    }

    /// Generate a fresh key pair through the backend
    pub fn generate<C: CryptoProvider + ?Sized>(crypto: &C) -> Result<Self> {
        crypto.generate_key_pair()
    }

    /// Rebuild a key pair from its private half
    pub fn from_private_key<C: CryptoProvider + ?Sized>(
        crypto: &C,
        private_key: PrivateKey,
    ) -> Result<Self> {
        let public_key = crypto.public_key(&private_key)?;
        Ok(Self::new(public_key, private_key))
    }

    /// Perform Diffie-Hellman key agreement with a remote public key
    pub fn agree<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        their_public: &PublicKey,
    ) -> Result<DhOutput> {
        crypto.agree(&self.private_key, their_public)
    }
}

/// Long-term public identity of a peer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentityKey {
    public_key: PublicKey,
}

impl IdentityKey {
    #[must_use]
    pub fn new(public_key: PublicKey) -> Self {
        Self { public_key }
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    #[must_use]
    pub fn serialize(&self) -> Vec<u8> {
        self.public_key.as_bytes().to_vec()
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        Ok(Self::new(PublicKey::from_slice(bytes)?))
    }

    /// Checks `signature` over `message` against this identity.
    pub fn verify_signature<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        message: &[u8],
        signature: &[u8],
    ) -> Result<bool> {
        crypto.verify(&self.public_key, message, signature)
    }
}

/// Local long-term identity: the public identity plus its private key.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct IdentityKeyPair {
    identity_key: IdentityKey,
    private_key: PrivateKey,
}

impl IdentityKeyPair {
    #[must_use]
    pub fn new(identity_key: IdentityKey, private_key: PrivateKey) -> Self {
        Self {
            identity_key,
            private_key,
        }
    }

    /// Generate a new identity key pair
    pub fn generate<C: CryptoProvider + ?Sized>(crypto: &C) -> Result<Self> {
        let pair = crypto.generate_key_pair()?;
        Ok(Self::new(IdentityKey::new(pair.public_key), pair.private_key))
    }

    #[must_use]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        self.identity_key.public_key()
    }

    #[must_use]
    pub fn private_key(&self) -> &PrivateKey {
        &self.private_key
    }

    /// The identity viewed as a plain agreement key pair.
    #[must_use]
    pub fn key_pair(&self) -> KeyPair {
        KeyPair::new(*self.public_key(), self.private_key.clone())
    }

    /// Sign a message with the identity key
    pub fn sign<C: CryptoProvider + ?Sized>(&self, crypto: &C, message: &[u8]) -> Result<Vec<u8>> {
        crypto.sign(&self.private_key, message)
    }

    /// Layout: `privLen:u16 | priv | pubLen:u16 | pub`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(4 + 2 * KEY_SIZE_32);
        writer.bytes_u16(self.private_key.as_bytes())?;
        writer.bytes_u16(&self.identity_key.serialize())?;
        Ok(writer.finish())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, Error::SerializationError);
        let private_key = PrivateKey::from_slice(reader.bytes_u16()?)?;
        let identity_key = IdentityKey::deserialize(reader.bytes_u16()?)?;
        reader.finish()?;
        Ok(Self::new(identity_key, private_key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    #[test]
    fn test_key_generation() {
        let crypto = DefaultCryptoProvider::new();
        let pair = KeyPair::generate(&crypto).unwrap();
        let rebuilt = KeyPair::from_private_key(&crypto, pair.private_key.clone()).unwrap();
        assert_eq!(pair, rebuilt);
    }

    #[test]
    fn test_diffie_hellman() {
        let crypto = DefaultCryptoProvider::new();
        let alice = KeyPair::generate(&crypto).unwrap();
        let bob = KeyPair::generate(&crypto).unwrap();

        let shared1 = alice.agree(&crypto, &bob.public_key).unwrap();
        let shared2 = bob.agree(&crypto, &alice.public_key).unwrap();

        assert_eq!(shared1.as_bytes(), shared2.as_bytes());
    }

    #[test]
    fn test_identity_signing() {
        let crypto = DefaultCryptoProvider::new();
        let identity = IdentityKeyPair::generate(&crypto).unwrap();
        let message = b"test message";
        let signature = identity.sign(&crypto, message).unwrap();

        let identity_key = identity.identity_key();
        assert!(identity_key
            .verify_signature(&crypto, message, &signature)
            .unwrap());
        assert!(!identity_key
            .verify_signature(&crypto, b"wrong message", &signature)
            .unwrap());
    }

    #[test]
    fn test_identity_key_pair_serialization() {
        let crypto = DefaultCryptoProvider::new();
        let identity = IdentityKeyPair::generate(&crypto).unwrap();

        let bytes = identity.serialize().unwrap();
        assert_eq!(bytes.len(), 2 + 32 + 2 + 32);
        assert_eq!(&bytes[..2], &[0, 32]);
        assert_eq!(&bytes[2..34], identity.private_key().as_bytes());

        let restored = IdentityKeyPair::deserialize(&bytes).unwrap();
        assert_eq!(restored, identity);
    }

    #[test]
    fn test_identity_key_pair_rejects_short_key() {
        let mut bytes = vec![0, 31];
        bytes.extend_from_slice(&[1u8; 31]);
        bytes.extend_from_slice(&[0, 32]);
        bytes.extend_from_slice(&[2u8; 32]);
        assert_eq!(IdentityKeyPair::deserialize(&bytes), Err(Error::InvalidKey));
    }

    #[test]
    fn test_public_key_from_slice() {
        assert!(PublicKey::from_slice(&[7u8; 32]).is_ok());
        assert_eq!(PublicKey::from_slice(&[7u8; 33]), Err(Error::InvalidKey));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let key = PrivateKey::from_bytes([9u8; 32]);
        assert_eq!(format!("{key:?}"), "PrivateKey([REDACTED])");
    }
}
