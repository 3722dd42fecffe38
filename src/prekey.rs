//! One-time pre-keys, signed pre-keys and the public bundle built from them.

use crate::{
    codec::{Reader, Writer},
    crypto::CryptoProvider,
    error::{Error, Result},
    keys::{IdentityKey, IdentityKeyPair, KeyPair, PrivateKey, PublicKey},
};

/// One-time pre-key, consumed by the first session that references it.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreKeyRecord {
    id: u32,
    key_pair: KeyPair,
}

impl PreKeyRecord {
    #[must_use]
    pub fn new(id: u32, key_pair: KeyPair) -> Self {
        Self { id, key_pair }
    }

    pub fn generate<C: CryptoProvider + ?Sized>(id: u32, crypto: &C) -> Result<Self> {
        Ok(Self::new(id, crypto.generate_key_pair()?))
    }

    /// Generates `count` records with consecutive ids starting at `start`.
    /// Ids wrap around at `u32::MAX`.
    pub fn generate_batch<C: CryptoProvider + ?Sized>(
        start: u32,
        count: u32,
        crypto: &C,
    ) -> Result<Vec<Self>> {
        (0..count)
            .map(|offset| Self::generate(start.wrapping_add(offset), crypto))
            .collect()
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key_pair.public_key
    }

    /// Layout: `id:u32 | pubLen:u16 | pub | privLen:u16 | priv`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(4 + 2 + 32 + 2 + 32);
        writer.u32(self.id);
        writer.bytes_u16(self.key_pair.public_key.as_bytes())?;
        writer.bytes_u16(self.key_pair.private_key.as_bytes())?;
        Ok(writer.finish())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, Error::SerializationError);
        let id = reader.u32()?;
        let public_key = PublicKey::from_slice(reader.bytes_u16()?)?;
        let private_key = PrivateKey::from_slice(reader.bytes_u16()?)?;
        reader.finish()?;
        Ok(Self::new(id, KeyPair::new(public_key, private_key)))
    }
}

/// Medium-lived pre-key whose public half is signed by the identity key.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SignedPreKeyRecord {
    id: u32,
    timestamp: u64,
    key_pair: KeyPair,
    signature: Vec<u8>,
}

impl SignedPreKeyRecord {
    #[must_use]
    pub fn new(id: u32, timestamp: u64, key_pair: KeyPair, signature: Vec<u8>) -> Self {
        Self {
            id,
            timestamp,
            key_pair,
            signature,
        }
    }

    /// Generates a key pair and signs its raw public key with `identity`.
    pub fn generate<C: CryptoProvider + ?Sized>(
        id: u32,
        timestamp: u64,
        identity: &IdentityKeyPair,
        crypto: &C,
    ) -> Result<Self> {
        let key_pair = crypto.generate_key_pair()?;
        let signature = identity.sign(crypto, key_pair.public_key.as_bytes())?;
        Ok(Self::new(id, timestamp, key_pair, signature))
    }

    #[must_use]
    pub fn id(&self) -> u32 {
        self.id
    }

    /// Seconds since the Unix epoch at generation time.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    #[must_use]
    pub fn key_pair(&self) -> &KeyPair {
        &self.key_pair
    }

    #[must_use]
    pub fn public_key(&self) -> &PublicKey {
        &self.key_pair.public_key
    }

    #[must_use]
    pub fn signature(&self) -> &[u8] {
        &self.signature
    }

    pub fn verify<C: CryptoProvider + ?Sized>(
        &self,
        identity_key: &IdentityKey,
        crypto: &C,
    ) -> Result<bool> {
        identity_key.verify_signature(crypto, self.public_key().as_bytes(), &self.signature)
    }

    /// Layout: `id:u32 | timestamp:u64 | pubLen:u16 | pub | privLen:u16 | priv | sigLen:u16 | sig`
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(12 + 6 + 64 + self.signature.len());
        writer.u32(self.id).u64(self.timestamp);
        writer.bytes_u16(self.key_pair.public_key.as_bytes())?;
        writer.bytes_u16(self.key_pair.private_key.as_bytes())?;
        writer.bytes_u16(&self.signature)?;
        Ok(writer.finish())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, Error::SerializationError);
        let id = reader.u32()?;
        let timestamp = reader.u64()?;
        let public_key = PublicKey::from_slice(reader.bytes_u16()?)?;
        let private_key = PrivateKey::from_slice(reader.bytes_u16()?)?;
        let signature = reader.bytes_u16()?.to_vec();
        reader.finish()?;
        Ok(Self::new(
            id,
            timestamp,
            KeyPair::new(public_key, private_key),
            signature,
        ))
    }
}

/// Public material a peer publishes so others can open a session.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PreKeyBundle {
    pub registration_id: u32,
    pub device_id: u32,
    /// Optional one-time pre-key id and public key
    pub pre_key: Option<(u32, PublicKey)>,
    pub signed_pre_key_id: u32,
    pub signed_pre_key: PublicKey,
    pub signed_pre_key_signature: Vec<u8>,
    pub identity_key: IdentityKey,
}

impl PreKeyBundle {
    /// Assembles a bundle from local records.
    #[must_use]
    pub fn from_records(
        registration_id: u32,
        device_id: u32,
        pre_key: Option<&PreKeyRecord>,
        signed_pre_key: &SignedPreKeyRecord,
        identity_key: IdentityKey,
    ) -> Self {
        Self {
            registration_id,
            device_id,
            pre_key: pre_key.map(|record| (record.id(), *record.public_key())),
            signed_pre_key_id: signed_pre_key.id(),
            signed_pre_key: *signed_pre_key.public_key(),
            signed_pre_key_signature: signed_pre_key.signature().to_vec(),
            identity_key,
        }
    }

    #[must_use]
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key.map(|(id, _)| id)
    }

    /// Checks the signed pre-key signature against the bundle's identity.
    pub fn verify_signature<C: CryptoProvider + ?Sized>(&self, crypto: &C) -> Result<()> {
        let valid = self.identity_key.verify_signature(
            crypto,
            self.signed_pre_key.as_bytes(),
            &self.signed_pre_key_signature,
        )?;
        if valid {
            Ok(())
        } else {
            Err(Error::InvalidSignature)
        }
    }
}
