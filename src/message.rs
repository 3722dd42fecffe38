//! Wire messages.
//!
//! ```text
//! SignalMessage:
//!   version:u8 | counter:u32 | previousCounter:u32
//!   | keyLen:u32 | senderRatchetKey | ctLen:u32 | ciphertext
//!
//! PreKeySignalMessage:
//!   version:u8 | registrationId:u32 | hasPreKeyId:u8 | [preKeyId:u32]
//!   | signedPreKeyId:u32 | baseKeyLen:u32 | baseKey
//!   | identityLen:u32 | identityKey | msgLen:u32 | SignalMessage
//! ```
//!
//! All integers are big-endian.

use crate::{
    codec::{Reader, Writer},
    error::{Error, Result},
    keys::{IdentityKey, PublicKey},
};

/// The only protocol version this crate reads or writes.
pub const CURRENT_VERSION: u8 = 3;

fn check_version(version: u8) -> Result<()> {
    if version == CURRENT_VERSION {
        Ok(())
    } else {
        Err(Error::UnsupportedVersion(version))
    }
}

fn read_key(reader: &mut Reader<'_>) -> Result<PublicKey> {
    PublicKey::from_slice(reader.bytes_u32()?).map_err(|_| Error::InvalidMessage)
}

/// Ratchet message carrying one encrypted payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignalMessage {
    sender_ratchet_key: PublicKey,
    counter: u32,
    previous_counter: u32,
    ciphertext: Vec<u8>,
}

impl SignalMessage {
    #[must_use]
    pub fn new(
        sender_ratchet_key: PublicKey,
        counter: u32,
        previous_counter: u32,
        ciphertext: Vec<u8>,
    ) -> Self {
        Self {
            sender_ratchet_key,
            counter,
            previous_counter,
            ciphertext,
        }
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        CURRENT_VERSION
    }

    #[must_use]
    pub fn sender_ratchet_key(&self) -> &PublicKey {
        &self.sender_ratchet_key
    }

    #[must_use]
    pub fn counter(&self) -> u32 {
        self.counter
    }

    #[must_use]
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    #[must_use]
    pub fn ciphertext(&self) -> &[u8] {
        &self.ciphertext
    }

    /// Everything before the ciphertext length. Authenticated as associated
    /// data by the AEAD.
    pub fn header_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = Writer::with_capacity(13 + PublicKey::SIZE);
        writer
            .u8(CURRENT_VERSION)
            .u32(self.counter)
            .u32(self.previous_counter);
        writer.bytes_u32(self.sender_ratchet_key.as_bytes())?;
        Ok(writer.finish())
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let mut bytes = self.header_bytes()?;
        let len = u32::try_from(self.ciphertext.len()).map_err(|_| Error::SerializationError)?;
        bytes.reserve(4 + self.ciphertext.len());
        bytes.extend_from_slice(&len.to_be_bytes());
        bytes.extend_from_slice(&self.ciphertext);
        Ok(bytes)
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, Error::InvalidMessage);
        check_version(reader.u8()?)?;
        let counter = reader.u32()?;
        let previous_counter = reader.u32()?;
        let sender_ratchet_key = read_key(&mut reader)?;
        let ciphertext = reader.bytes_u32()?.to_vec();
        reader.finish()?;
        Ok(Self::new(
            sender_ratchet_key,
            counter,
            previous_counter,
            ciphertext,
        ))
    }
}

/// First messages of a session, carrying what the responder needs to run
/// the initial agreement.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PreKeySignalMessage {
    registration_id: u32,
    pre_key_id: Option<u32>,
    signed_pre_key_id: u32,
    base_key: PublicKey,
    identity_key: IdentityKey,
    message: SignalMessage,
}

impl PreKeySignalMessage {
    #[must_use]
    pub fn new(
        registration_id: u32,
        pre_key_id: Option<u32>,
        signed_pre_key_id: u32,
        base_key: PublicKey,
        identity_key: IdentityKey,
        message: SignalMessage,
    ) -> Self {
        Self {
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
        }
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        CURRENT_VERSION
    }

    #[must_use]
    pub fn registration_id(&self) -> u32 {
        self.registration_id
    }

    #[must_use]
    pub fn pre_key_id(&self) -> Option<u32> {
        self.pre_key_id
    }

    #[must_use]
    pub fn signed_pre_key_id(&self) -> u32 {
        self.signed_pre_key_id
    }

    /// The initiator's ephemeral key.
    #[must_use]
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    #[must_use]
    pub fn identity_key(&self) -> &IdentityKey {
        &self.identity_key
    }

    #[must_use]
    pub fn message(&self) -> &SignalMessage {
        &self.message
    }

    pub fn serialize(&self) -> Result<Vec<u8>> {
        let inner = self.message.serialize()?;
        let mut writer = Writer::with_capacity(22 + 2 * PublicKey::SIZE + 8 + inner.len());
        writer.u8(CURRENT_VERSION).u32(self.registration_id);
        match self.pre_key_id {
            Some(id) => writer.u8(1).u32(id),
            None => writer.u8(0),
        };
        writer.u32(self.signed_pre_key_id);
        writer.bytes_u32(self.base_key.as_bytes())?;
        writer.bytes_u32(&self.identity_key.serialize())?;
        writer.bytes_u32(&inner)?;
        Ok(writer.finish())
    }

    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes, Error::InvalidMessage);
        check_version(reader.u8()?)?;
        let registration_id = reader.u32()?;
        let pre_key_id = match reader.u8()? {
            0 => None,
            1 => Some(reader.u32()?),
            _ => return Err(Error::InvalidMessage),
        };
        let signed_pre_key_id = reader.u32()?;
        let base_key = read_key(&mut reader)?;
        let identity_key = IdentityKey::new(read_key(&mut reader)?);
        let message = SignalMessage::deserialize(reader.bytes_u32()?)?;
        reader.finish()?;
        Ok(Self::new(
            registration_id,
            pre_key_id,
            signed_pre_key_id,
            base_key,
            identity_key,
            message,
        ))
    }
}

/// Tag telling the receiver how to parse a ciphertext body.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum MessageType {
    Whisper = 2,
    PreKey = 3,
}

impl TryFrom<u8> for MessageType {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            2 => Ok(Self::Whisper),
            3 => Ok(Self::PreKey),
            _ => Err(Error::InvalidMessage),
        }
    }
}

/// Output of [`SessionCipher::encrypt`](crate::SessionCipher::encrypt).
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CiphertextMessage {
    pub message_type: MessageType,
    pub body: Vec<u8>,
}

impl CiphertextMessage {
    pub fn from_signal_message(message: &SignalMessage) -> Result<Self> {
        Ok(Self {
            message_type: MessageType::Whisper,
            body: message.serialize()?,
        })
    }

    pub fn from_pre_key_message(message: &PreKeySignalMessage) -> Result<Self> {
        Ok(Self {
            message_type: MessageType::PreKey,
            body: message.serialize()?,
        })
    }
}
