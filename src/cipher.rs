//! Per-message encryption and decryption for one remote address.
//!
//! Every operation loads the session record, works on a copy and writes it
//! back only on success. A message that fails to decrypt never changes what
//! is stored.

use tracing::{debug, trace, warn};

use crate::{
    address::ProtocolAddress,
    builder::SessionBuilder,
    config::SessionConfig,
    crypto::CryptoProvider,
    error::{Error, Result},
    keys::IdentityKey,
    message::{CiphertextMessage, MessageType, PreKeySignalMessage, SignalMessage},
    record::SessionRecord,
    state::SessionState,
    storage::{Direction, ProtocolStore},
};

/// Sender identity, receiver identity, then the message header.
fn associated_data(
    sender: &IdentityKey,
    receiver: &IdentityKey,
    message: &SignalMessage,
) -> Result<Vec<u8>> {
    let header = message.header_bytes()?;
    let mut data = Vec::with_capacity(64 + header.len());
    data.extend_from_slice(sender.public_key().as_bytes());
    data.extend_from_slice(receiver.public_key().as_bytes());
    data.extend_from_slice(&header);
    Ok(data)
}

pub struct SessionCipher<'a, S: ProtocolStore, C: CryptoProvider + ?Sized> {
    store: &'a mut S,
    crypto: &'a C,
    remote_address: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore, C: CryptoProvider + ?Sized> SessionCipher<'a, S, C> {
    pub fn new(store: &'a mut S, crypto: &'a C, remote_address: ProtocolAddress) -> Self {
        Self {
            store,
            crypto,
            remote_address,
            config: SessionConfig::default(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn remote_address(&self) -> &ProtocolAddress {
        &self.remote_address
    }

    fn load_record(&self) -> Result<SessionRecord> {
        self.store
            .load_session(&self.remote_address)?
            .ok_or_else(|| Error::NoSessionForPeer(self.remote_address.clone()))
    }

    fn check_trust(&self, identity: &IdentityKey, direction: Direction) -> Result<()> {
        if self
            .store
            .is_trusted_identity(&self.remote_address, identity, direction)?
        {
            Ok(())
        } else {
            warn!(address = %self.remote_address, ?direction, "untrusted identity");
            Err(Error::UntrustedIdentity(self.remote_address.clone()))
        }
    }

    /// Encrypts `plaintext` under the next sending-chain key.
    ///
    /// Until the peer has answered, the result is a pre-key message so the
    /// peer can build its side of the session.
    pub fn encrypt(&mut self, plaintext: &[u8]) -> Result<CiphertextMessage> {
        let mut record = self.load_record()?;
        let state = record
            .session_state_mut()
            .ok_or_else(|| Error::NoSessionForPeer(self.remote_address.clone()))?;
        let remote_identity = *state.remote_identity_key();
        self.check_trust(&remote_identity, Direction::Sending)?;

        let (keys, ratchet_key) = state.next_sending_keys(self.crypto)?;
        let previous_counter = state.previous_counter();
        let header = SignalMessage::new(ratchet_key, keys.counter(), previous_counter, Vec::new());
        let ad = associated_data(state.local_identity_key(), &remote_identity, &header)?;
        let ciphertext = self
            .crypto
            .aead_encrypt(keys.cipher_key(), keys.iv(), plaintext, &ad)?;
        let message = SignalMessage::new(ratchet_key, keys.counter(), previous_counter, ciphertext);

        let output = match state.pending_pre_key() {
            Some(pending) => CiphertextMessage::from_pre_key_message(&PreKeySignalMessage::new(
                state.local_registration_id(),
                pending.pre_key_id,
                pending.signed_pre_key_id,
                pending.base_key,
                *state.local_identity_key(),
                message,
            ))?,
            None => CiphertextMessage::from_signal_message(&message)?,
        };

        self.store.store_session(&self.remote_address, &record)?;
        trace!(address = %self.remote_address, counter = keys.counter(), "encrypted message");
        Ok(output)
    }

    /// Decrypts a ratchet message for an existing session.
    pub fn decrypt_signal_message(&mut self, message: &SignalMessage) -> Result<Vec<u8>> {
        let mut record = self.load_record()?;
        let plaintext = self.decrypt_with_record(&mut record, message)?;

        let remote_identity = record
            .session_state()
            .map(|state| *state.remote_identity_key())
            .ok_or(Error::InvalidState)?;
        self.check_trust(&remote_identity, Direction::Receiving)?;

        self.store.store_session(&self.remote_address, &record)?;
        self.store
            .save_identity(&self.remote_address, &remote_identity)?;
        Ok(plaintext)
    }

    /// Decrypts the first messages of a session, building the responder
    /// state when the message refers to a session the record does not hold.
    ///
    /// The new session, the remote identity and the removal of the one-time
    /// pre-key are only stored once the embedded message decrypts.
    pub fn decrypt_pre_key_message(&mut self, message: &PreKeySignalMessage) -> Result<Vec<u8>> {
        let mut record = self
            .store
            .load_session(&self.remote_address)?
            .unwrap_or_default();

        let consumed = SessionBuilder::new(&mut *self.store, self.crypto, self.remote_address.clone())
            .with_config(self.config)
            .process_pre_key_message_into(&mut record, message)?;
        let plaintext = self.decrypt_with_record(&mut record, message.message())?;

        self.store.store_session(&self.remote_address, &record)?;
        self.store
            .save_identity(&self.remote_address, message.identity_key())?;
        if let Some(id) = consumed {
            self.store.remove_pre_key(id)?;
            debug!(address = %self.remote_address, pre_key_id = id, "consumed one-time pre-key");
        }
        Ok(plaintext)
    }

    /// Parses `message` according to its type tag and decrypts it.
    pub fn decrypt_ciphertext(&mut self, message: &CiphertextMessage) -> Result<Vec<u8>> {
        match message.message_type {
            MessageType::PreKey => {
                self.decrypt_pre_key_message(&PreKeySignalMessage::deserialize(&message.body)?)
            }
            MessageType::Whisper => {
                self.decrypt_signal_message(&SignalMessage::deserialize(&message.body)?)
            }
        }
    }

    pub fn remote_registration_id(&self) -> Result<u32> {
        let record = self.load_record()?;
        record
            .session_state()
            .map(SessionState::remote_registration_id)
            .ok_or_else(|| Error::NoSessionForPeer(self.remote_address.clone()))
    }

    pub fn session_version(&self) -> Result<u8> {
        let record = self.load_record()?;
        record
            .session_state()
            .map(SessionState::version)
            .ok_or_else(|| Error::NoSessionForPeer(self.remote_address.clone()))
    }

    /// Tries the current state, then each archived state. A matching archived
    /// state becomes current.
    ///
    /// All attempts draw skipped-key derivations from one budget of
    /// `max_skip`, so a message costs at most that much chain work in total.
    fn decrypt_with_record(
        &self,
        record: &mut SessionRecord,
        message: &SignalMessage,
    ) -> Result<Vec<u8>> {
        let mut skip_budget = self.config.max_skip;
        let mut current_error = None;
        if let Some(current) = record.session_state() {
            let mut candidate = current.clone();
            match self.decrypt_with_state(&mut candidate, message, &mut skip_budget) {
                Ok(plaintext) => {
                    if let Some(slot) = record.session_state_mut() {
                        *slot = candidate;
                    }
                    return Ok(plaintext);
                }
                Err(error) => current_error = Some(error),
            }
        }

        let mut duplicate = matches!(current_error, Some(Error::DuplicateOrTooOld));
        let mut first_previous_error = None;
        let mut found = None;
        for (index, previous) in record.previous_session_states().enumerate() {
            let mut candidate = previous.clone();
            match self.decrypt_with_state(&mut candidate, message, &mut skip_budget) {
                Ok(plaintext) => {
                    found = Some((index, candidate, plaintext));
                    break;
                }
                Err(error) => {
                    duplicate |= error == Error::DuplicateOrTooOld;
                    first_previous_error.get_or_insert(error);
                }
            }
        }

        if let Some((index, candidate, plaintext)) = found {
            record.set_previous_state(index, candidate)?;
            record.promote_previous_state_bounded(index, self.config.max_archived_states)?;
            debug!(address = %self.remote_address, index, "promoted archived session state");
            return Ok(plaintext);
        }

        if duplicate {
            return Err(Error::DuplicateOrTooOld);
        }
        Err(current_error
            .or(first_previous_error)
            .unwrap_or_else(|| Error::NoSessionForPeer(self.remote_address.clone())))
    }

    fn decrypt_with_state(
        &self,
        state: &mut SessionState,
        message: &SignalMessage,
        skip_budget: &mut u32,
    ) -> Result<Vec<u8>> {
        if message.version() != state.version() {
            return Err(Error::UnsupportedVersion(message.version()));
        }

        let keys = state.receiving_keys(
            self.crypto,
            message.sender_ratchet_key(),
            message.counter(),
            &self.config,
            skip_budget,
        )?;
        let ad = associated_data(state.remote_identity_key(), state.local_identity_key(), message)?;
        let plaintext = self
            .crypto
            .aead_decrypt(keys.cipher_key(), keys.iv(), message.ciphertext(), &ad)?;

        state.clear_pending_pre_key();
        trace!(counter = message.counter(), "decrypted message");
        Ok(plaintext)
    }
}
