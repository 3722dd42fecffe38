//! Error types for session establishment and the session cipher.

use crate::address::ProtocolAddress;
use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during protocol operations.
///
/// Every variant is surfaced to the caller as-is; the protocol code never
/// swallows a cryptographic or protocol failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Key has the wrong length, is not a valid curve point, or produced a
    /// non-contributory agreement.
    #[error("invalid key")]
    InvalidKey,

    /// Signed pre-key signature does not verify against the identity key
    #[error("invalid signature")]
    InvalidSignature,

    /// The identity store refused the remote identity key.
    #[error("untrusted identity for {0}")]
    UntrustedIdentity(ProtocolAddress),

    /// No session record exists for the remote address.
    #[error("no session for {0}")]
    NoSessionForPeer(ProtocolAddress),

    /// Session state is missing a chain required by the operation.
    ///
    /// Occurs when encrypting before a sending chain exists.
    #[error("invalid session state")]
    InvalidState,

    /// Malformed wire bytes, or a ratchet key that fails key agreement.
    #[error("invalid message")]
    InvalidMessage,

    /// Message carries a protocol version this crate does not speak.
    #[error("unsupported message version {0}")]
    UnsupportedVersion(u8),

    /// Message key was already consumed, or the chain advanced past it
    /// without caching it.
    #[error("duplicate or too old message")]
    DuplicateOrTooOld,

    /// Counter gap on a receiving chain exceeds the configured bound.
    #[error("message skips {gap} keys, more than the allowed {max_skip}")]
    SkipTooFar { gap: u32, max_skip: u32 },

    /// Referenced pre-key or signed pre-key is not in the local store.
    #[error("no local pre-key with id {0}")]
    InvalidKeyId(u32),

    /// Record bytes could not be encoded or decoded.
    #[error("serialization error")]
    SerializationError,

    /// AEAD decryption failed.
    ///
    /// Wrong key, tampered ciphertext and wrong IV all report this one kind.
    #[error("decryption failed")]
    DecryptionFailed,

    /// Internal cryptographic error
    #[error("cryptographic error")]
    CryptoError,

    /// Storage backend operation failed.
    #[error("storage error: {0}")]
    StorageError(String),
}

#[cfg(feature = "serde")]
impl From<bincode::error::EncodeError> for Error {
    fn from(_: bincode::error::EncodeError) -> Self {
        Error::SerializationError
    }
}

#[cfg(feature = "serde")]
impl From<bincode::error::DecodeError> for Error {
    fn from(_: bincode::error::DecodeError) -> Self {
        Error::SerializationError
    }
}
