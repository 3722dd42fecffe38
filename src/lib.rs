//! Session establishment and ratcheting for end-to-end encrypted messaging.
//!
//! Two peers agree on initial keys with X3DH, asynchronously: the responder
//! publishes a [`PreKeyBundle`] and need not be online when the initiator
//! uses it. Messages are then protected by the Double Ratchet, which derives
//! a fresh key per message and mixes in a new Diffie-Hellman output whenever
//! the peer's ratchet key changes.
//!
//! # Security Properties
//!
//! ## Forward Secrecy
//! Chain keys only move forward and message keys are deleted after use, so
//! a compromised state does not reveal earlier messages.
//!
//! ## Post-Compromise Security
//! Each DH-ratchet step mixes in fresh key material, so a leaked state stops
//! being useful after the next round trip.
//!
//! ## Atomic State Updates
//! Decryption works on a copy of the session state. Malformed, replayed or
//! tampered messages are rejected without changing what is stored.
//!
//! # Concurrency
//!
//! Operations on one remote address must not run concurrently; the store or
//! the caller serializes them. Different addresses are independent.
//!
//! # Protocol Flow
//!
//! ```rust
//! use signal_session::{
//!     DefaultCryptoProvider, IdentityKeyPair, InMemoryProtocolStore, PreKeyBundle,
//!     PreKeyRecord, ProtocolAddress, SessionBuilder, SessionCipher, SignedPreKeyRecord,
//! };
//! use signal_session::storage::{PreKeyStore, SignedPreKeyStore};
//!
//! let crypto = DefaultCryptoProvider::new();
//! let alice_address = ProtocolAddress::new("alice", 1);
//! let bob_address = ProtocolAddress::new("bob", 1);
//!
//! // Bob publishes a bundle
//! let bob_identity = IdentityKeyPair::generate(&crypto).unwrap();
//! let mut bob_store = InMemoryProtocolStore::new(bob_identity.clone(), 2);
//! let signed = SignedPreKeyRecord::generate(1, 0, &bob_identity, &crypto).unwrap();
//! let one_time = PreKeyRecord::generate(7, &crypto).unwrap();
//! let bundle = PreKeyBundle::from_records(
//!     2, 1, Some(&one_time), &signed, *bob_identity.identity_key(),
//! );
//! bob_store.store_signed_pre_key(1, signed).unwrap();
//! bob_store.store_pre_key(7, one_time).unwrap();
//!
//! // Alice builds a session from it and sends the first message
//! let mut alice_store =
//!     InMemoryProtocolStore::new(IdentityKeyPair::generate(&crypto).unwrap(), 1);
//! SessionBuilder::new(&mut alice_store, &crypto, bob_address.clone())
//!     .process_pre_key_bundle(&bundle)
//!     .unwrap();
//! let hello = SessionCipher::new(&mut alice_store, &crypto, bob_address.clone())
//!     .encrypt(b"Hello Bob!")
//!     .unwrap();
//!
//! // Bob decrypts and replies
//! let mut bob_cipher = SessionCipher::new(&mut bob_store, &crypto, alice_address);
//! assert_eq!(bob_cipher.decrypt_ciphertext(&hello).unwrap(), b"Hello Bob!");
//! let reply = bob_cipher.encrypt(b"Hello Alice!").unwrap();
//!
//! let mut alice_cipher = SessionCipher::new(&mut alice_store, &crypto, bob_address);
//! assert_eq!(alice_cipher.decrypt_ciphertext(&reply).unwrap(), b"Hello Alice!");
//! ```
//!
//! # Modules
//!
//! - [`x3dh`]: initial key agreement for both roles
//! - [`state`], [`ratchet`]: the ratchet state machine and its key derivations
//! - [`builder`], [`cipher`]: session setup and per-message operations
//! - [`crypto`]: the crypto backend trait and its default implementation
//! - [`keys`], [`prekey`]: key material and records
//! - [`message`]: wire formats
//! - [`storage`]: store interfaces and an in-memory store
//! - [`error`]: error types

#![forbid(unsafe_code)]
#![deny(rust_2018_idioms, unreachable_pub)]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![warn(clippy::all, clippy::pedantic, clippy::cargo)]
#![allow(
    missing_docs,
    clippy::missing_errors_doc,
    clippy::missing_fields_in_debug,
    clippy::module_name_repetitions
)]

pub mod address;
pub mod builder;
pub mod cipher;
mod codec;
pub mod config;
pub mod crypto;
pub mod error;
pub mod keys;
pub mod message;
pub mod prekey;
pub mod ratchet;
pub mod record;
pub mod state;
pub mod storage;
pub mod x3dh;
mod xeddsa;

pub use address::ProtocolAddress;
pub use builder::SessionBuilder;
pub use cipher::SessionCipher;
pub use config::SessionConfig;
pub use crypto::{CryptoProvider, DefaultCryptoProvider};
pub use error::{Error, Result};
pub use keys::{IdentityKey, IdentityKeyPair, KeyPair, PrivateKey, PublicKey};
pub use message::{CiphertextMessage, MessageType, PreKeySignalMessage, SignalMessage};
pub use prekey::{PreKeyBundle, PreKeyRecord, SignedPreKeyRecord};
pub use record::SessionRecord;
pub use state::SessionState;
pub use storage::{Direction, InMemoryProtocolStore, ProtocolStore};
