//! Root, chain and message key derivations.
//!
//! ```text
//! initial:     RK0 || CK0       = HKDF(master, salt = 0^32, "WhisperText", 64)
//! DH step:     RK' || CK        = HKDF(DH(ours, theirs), salt = RK, "WhisperRatchet", 64)
//! per message: ikm              = HMAC(CK, 0x01)
//!              cipher||mac||iv  = HKDF(ikm, no salt, "WhisperMessageKeys", 80)
//! advance:     CK'              = HMAC(CK, 0x02)
//! ```

use crate::{
    crypto::{CryptoProvider, IV_SIZE, KEY_SIZE_32},
    error::{Error, Result},
    keys::{KeyPair, PublicKey},
};
use zeroize::{Zeroize, ZeroizeOnDrop};

const INITIAL_INFO: &[u8] = b"WhisperText";
const RATCHET_INFO: &[u8] = b"WhisperRatchet";
const MESSAGE_KEYS_INFO: &[u8] = b"WhisperMessageKeys";

const MESSAGE_KEY_SEED: &[u8] = &[0x01];
const CHAIN_KEY_SEED: &[u8] = &[0x02];

fn split_pair(output: &[u8]) -> Result<([u8; KEY_SIZE_32], [u8; KEY_SIZE_32])> {
    if output.len() != 2 * KEY_SIZE_32 {
        return Err(Error::CryptoError);
    }
    let (first, second) = output.split_at(KEY_SIZE_32);
    let first = first.try_into().map_err(|_| Error::CryptoError)?;
    let second = second.try_into().map_err(|_| Error::CryptoError)?;
    Ok((first, second))
}

#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RootKey([u8; KEY_SIZE_32]);

impl RootKey {
    #[must_use]
    pub fn from_bytes(bytes: [u8; KEY_SIZE_32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE_32] {
        &self.0
    }

    /// Root and chain key from the initial agreement's master secret.
    pub fn derive_initial<C: CryptoProvider + ?Sized>(
        crypto: &C,
        master_secret: &[u8],
    ) -> Result<(Self, ChainKey)> {
        let output = crypto.hkdf(master_secret, INITIAL_INFO, 64, &[0u8; KEY_SIZE_32])?;
        let (root, chain) = split_pair(&output)?;
        Ok((Self(root), ChainKey::new(chain, 0)))
    }

    /// One DH-ratchet step: mixes `DH(ours, theirs)` into the root.
    pub fn create_chain<C: CryptoProvider + ?Sized>(
        &self,
        crypto: &C,
        their_ratchet_key: &PublicKey,
        our_ratchet_key: &KeyPair,
    ) -> Result<(Self, ChainKey)> {
        let shared = our_ratchet_key.agree(crypto, their_ratchet_key)?;
        let output = crypto.hkdf(shared.as_bytes(), RATCHET_INFO, 64, &self.0)?;
        let (root, chain) = split_pair(&output)?;
        Ok((Self(root), ChainKey::new(chain, 0)))
    }
}

impl std::fmt::Debug for RootKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "RootKey([REDACTED])")
    }
}

/// Symmetric ratchet cursor: a key plus the counter of the next message it
/// will derive.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ChainKey {
    key: [u8; KEY_SIZE_32],
    #[zeroize(skip)]
    index: u32,
}

impl ChainKey {
    #[must_use]
    pub fn new(key: [u8; KEY_SIZE_32], index: u32) -> Self {
        Self { key, index }
    }

    #[must_use]
    pub fn key(&self) -> &[u8; KEY_SIZE_32] {
        &self.key
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Keys for the message numbered [`index`](Self::index).
    pub fn message_keys<C: CryptoProvider + ?Sized>(&self, crypto: &C) -> Result<MessageKeys> {
        let mut seed = crypto.hmac_sha256(&self.key, MESSAGE_KEY_SEED)?;
        let output = crypto.hkdf(&seed, MESSAGE_KEYS_INFO, MessageKeys::DERIVED_LEN, &[]);
        seed.zeroize();
        MessageKeys::from_derived(&output?, self.index)
    }

    /// The chain key one step ahead.
    pub fn next<C: CryptoProvider + ?Sized>(&self, crypto: &C) -> Result<Self> {
        let index = self.index.checked_add(1).ok_or(Error::InvalidState)?;
        let key = crypto.hmac_sha256(&self.key, CHAIN_KEY_SEED)?;
        Ok(Self::new(key, index))
    }
}

impl std::fmt::Debug for ChainKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainKey")
            .field("key", &"[REDACTED]")
            .field("index", &self.index)
            .finish()
    }
}

/// Single-use keys for one message.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MessageKeys {
    cipher_key: [u8; KEY_SIZE_32],
    mac_key: [u8; KEY_SIZE_32],
    iv: [u8; IV_SIZE],
    #[zeroize(skip)]
    counter: u32,
}

impl MessageKeys {
    const DERIVED_LEN: usize = KEY_SIZE_32 * 2 + IV_SIZE;

    fn from_derived(output: &[u8], counter: u32) -> Result<Self> {
        if output.len() != Self::DERIVED_LEN {
            return Err(Error::CryptoError);
        }
        let (cipher_key, rest) = output.split_at(KEY_SIZE_32);
        let (mac_key, iv) = rest.split_at(KEY_SIZE_32);
        Ok(Self {
            cipher_key: cipher_key.try_into().map_err(|_| Error::CryptoError)?,
            mac_key: mac_key.try_into().map_err(|_| Error::CryptoError)?,
            iv: iv.try_into().map_err(|_| Error::CryptoError)?,
            counter,
        })
    }

    #[must_use]
    pub fn cipher_key(&self) -> &[u8; KEY_SIZE_32] {
        &self.cipher_key
    }

    #[must_use]
    pub fn mac_key(&self) -> &[u8; KEY_SIZE_32] {
        &self.mac_key
    }

    #[must_use]
    pub fn iv(&self) -> &[u8; IV_SIZE] {
        &self.iv
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }
}

impl std::fmt::Debug for MessageKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageKeys")
            .field("keys", &"[REDACTED]")
            .field("counter", &self.counter)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::DefaultCryptoProvider;

    #[test]
    fn test_chain_advance() {
        let crypto = DefaultCryptoProvider::new();
        let chain = ChainKey::new([42u8; 32], 0);
        let next = chain.next(&crypto).unwrap();

        assert_eq!(next.index(), 1);
        assert_eq!(next.key(), &crypto.hmac_sha256(&[42u8; 32], &[0x02]).unwrap());
        assert_ne!(chain.message_keys(&crypto).unwrap(), next.message_keys(&crypto).unwrap());
    }

    #[test]
    fn test_message_keys_layout() {
        let crypto = DefaultCryptoProvider::new();
        let chain = ChainKey::new([3u8; 32], 17);
        let keys = chain.message_keys(&crypto).unwrap();

        let seed = crypto.hmac_sha256(&[3u8; 32], &[0x01]).unwrap();
        let expected = crypto.hkdf(&seed, b"WhisperMessageKeys", 80, &[]).unwrap();
        assert_eq!(keys.cipher_key(), &expected[..32]);
        assert_eq!(keys.mac_key(), &expected[32..64]);
        assert_eq!(keys.iv(), &expected[64..]);
        assert_eq!(keys.counter(), 17);
    }

    #[test]
    fn test_message_keys_deterministic() {
        let crypto = DefaultCryptoProvider::new();
        let chain = ChainKey::new([9u8; 32], 0);
        assert_eq!(
            chain.message_keys(&crypto).unwrap(),
            chain.message_keys(&crypto).unwrap()
        );
    }

    #[test]
    fn test_index_overflow_is_rejected() {
        let crypto = DefaultCryptoProvider::new();
        let chain = ChainKey::new([1u8; 32], u32::MAX);
        assert_eq!(chain.next(&crypto), Err(Error::InvalidState));
    }

    #[test]
    fn test_dh_step_agrees() {
        let crypto = DefaultCryptoProvider::new();
        let root = RootKey::from_bytes([5u8; 32]);
        let alice = crypto.generate_key_pair().unwrap();
        let bob = crypto.generate_key_pair().unwrap();

        let (root_a, chain_a) = root.create_chain(&crypto, &bob.public_key, &alice).unwrap();
        let (root_b, chain_b) = root.create_chain(&crypto, &alice.public_key, &bob).unwrap();

        assert_eq!(root_a, root_b);
        assert_eq!(chain_a, chain_b);
        assert_ne!(root_a, root);
    }

    #[test]
    fn test_initial_split() {
        let crypto = DefaultCryptoProvider::new();
        let (root, chain) = RootKey::derive_initial(&crypto, &[8u8; 96]).unwrap();
        let output = crypto.hkdf(&[8u8; 96], b"WhisperText", 64, &[0u8; 32]).unwrap();

        assert_eq!(root.as_bytes(), &output[..32]);
        assert_eq!(chain.key(), &output[32..]);
        assert_eq!(chain.index(), 0);
    }
}
