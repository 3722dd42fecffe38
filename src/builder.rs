//! Session establishment from a pre-key bundle or a pre-key message.

use tracing::{debug, warn};

use crate::{
    address::ProtocolAddress,
    config::SessionConfig,
    crypto::CryptoProvider,
    error::{Error, Result},
    keys::IdentityKey,
    message::PreKeySignalMessage,
    prekey::PreKeyBundle,
    record::SessionRecord,
    state::PendingPreKey,
    storage::{Direction, ProtocolStore},
    x3dh::{self, InitiatorParameters, ResponderParameters},
};

/// Creates sessions with one remote address.
pub struct SessionBuilder<'a, S: ProtocolStore, C: CryptoProvider + ?Sized> {
    store: &'a mut S,
    crypto: &'a C,
    remote_address: ProtocolAddress,
    config: SessionConfig,
}

impl<'a, S: ProtocolStore, C: CryptoProvider + ?Sized> SessionBuilder<'a, S, C> {
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

    /// Starts a session as initiator from the peer's published bundle.
    ///
    /// An existing session for the address is archived, not discarded.
    /// Nothing is stored if the identity is untrusted or the signed
    /// pre-key signature is invalid.
    pub fn process_pre_key_bundle(&mut self, bundle: &PreKeyBundle) -> Result<()> {
        self.check_trust(&bundle.identity_key, Direction::Sending)?;
        bundle.verify_signature(self.crypto).inspect_err(|_| {
            warn!(address = %self.remote_address, "bundle signature does not verify");
        })?;

        let our_identity = self.store.identity_key_pair()?;
        let base_key_pair = self.crypto.generate_key_pair()?;
        let one_time_pre_key = bundle.pre_key.map(|(_, key)| key);

        let mut state = x3dh::initialize_as_initiator(
            self.crypto,
            &InitiatorParameters {
                our_identity_key_pair: &our_identity,
                our_base_key_pair: &base_key_pair,
                their_identity_key: &bundle.identity_key,
                their_signed_pre_key: &bundle.signed_pre_key,
                their_one_time_pre_key: one_time_pre_key.as_ref(),
            },
        )?;
        state.set_pending_pre_key(PendingPreKey {
            pre_key_id: bundle.pre_key_id(),
            signed_pre_key_id: bundle.signed_pre_key_id,
            base_key: base_key_pair.public_key,
        });
        state.set_registration_ids(self.store.local_registration_id()?, bundle.registration_id);

        let mut record = self
            .store
            .load_session(&self.remote_address)?
            .unwrap_or_default();
        record.promote_state_bounded(state, self.config.max_archived_states);

        self.store.store_session(&self.remote_address, &record)?;
        self.store
            .save_identity(&self.remote_address, &bundle.identity_key)?;
        debug!(address = %self.remote_address, "stored new initiator session");
        Ok(())
    }

    /// Installs the responder state for `message` into `record` without
    /// touching the store.
    ///
    /// Returns the one-time pre-key id the new state consumed, or `None` when
    /// the message belongs to a state the record already holds.
    pub(crate) fn process_pre_key_message_into(
        &self,
        record: &mut SessionRecord,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>> {
        self.check_trust(message.identity_key(), Direction::Receiving)?;

        if record.has_session_state(message.version(), message.base_key()) {
            debug!(address = %self.remote_address, "pre-key message for known session");
            return Ok(None);
        }

        let signed_pre_key_id = message.signed_pre_key_id();
        let signed_pre_key = self
            .store
            .load_signed_pre_key(signed_pre_key_id)?
            .ok_or(Error::InvalidKeyId(signed_pre_key_id))?;
        let one_time_pre_key = match message.pre_key_id() {
            Some(id) => Some(self.store.load_pre_key(id)?.ok_or(Error::InvalidKeyId(id))?),
            None => None,
        };
        let our_identity = self.store.identity_key_pair()?;

        let mut state = x3dh::initialize_as_responder(
            self.crypto,
            &ResponderParameters {
                our_identity_key_pair: &our_identity,
                our_signed_pre_key_pair: signed_pre_key.key_pair(),
                our_one_time_pre_key_pair: one_time_pre_key.as_ref().map(|record| record.key_pair()),
                their_identity_key: message.identity_key(),
                their_base_key: message.base_key(),
            },
        )?;
        state.set_registration_ids(self.store.local_registration_id()?, message.registration_id());
        record.promote_state_bounded(state, self.config.max_archived_states);

        Ok(message.pre_key_id())
    }

    /// Creates and stores the responder session for `message`, removing the
    /// consumed one-time pre-key.
    ///
    /// [`SessionCipher::decrypt_pre_key_message`](crate::SessionCipher::decrypt_pre_key_message)
    /// does the same but only stores anything once the embedded message
    /// decrypts.
    pub fn process_pre_key_signal_message(
        &mut self,
        message: &PreKeySignalMessage,
    ) -> Result<Option<u32>> {
        let mut record = self
            .store
            .load_session(&self.remote_address)?
            .unwrap_or_default();
        let consumed = self.process_pre_key_message_into(&mut record, message)?;

        self.store.store_session(&self.remote_address, &record)?;
        self.store
            .save_identity(&self.remote_address, message.identity_key())?;
        if let Some(id) = consumed {
            self.store.remove_pre_key(id)?;
            debug!(address = %self.remote_address, pre_key_id = id, "consumed one-time pre-key");
        }
        Ok(consumed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::DefaultCryptoProvider,
        keys::IdentityKeyPair,
        prekey::{PreKeyRecord, SignedPreKeyRecord},
        storage::{IdentityKeyStore, InMemoryProtocolStore, PreKeyStore, SessionStore, SignedPreKeyStore},
    };

    fn responder(crypto: &DefaultCryptoProvider) -> (InMemoryProtocolStore, PreKeyBundle) {
        let identity = IdentityKeyPair::generate(crypto).unwrap();
        let mut store = InMemoryProtocolStore::new(identity.clone(), 2);
        let signed = SignedPreKeyRecord::generate(1, 0, &identity, crypto).unwrap();
        let one_time = PreKeyRecord::generate(5, crypto).unwrap();
        let bundle = PreKeyBundle::from_records(
            2,
            1,
            Some(&one_time),
            &signed,
            *identity.identity_key(),
        );
        store.store_signed_pre_key(1, signed).unwrap();
        store.store_pre_key(5, one_time).unwrap();
        (store, bundle)
    }

    #[test]
    fn test_process_bundle_stores_session() {
        let crypto = DefaultCryptoProvider::new();
        let (_, bundle) = responder(&crypto);
        let mut store =
            InMemoryProtocolStore::new(IdentityKeyPair::generate(&crypto).unwrap(), 1);
        let bob = ProtocolAddress::new("bob", 1);

        SessionBuilder::new(&mut store, &crypto, bob.clone())
            .process_pre_key_bundle(&bundle)
            .unwrap();

        let record = store.load_session(&bob).unwrap().unwrap();
        let state = record.session_state().unwrap();
        assert!(state.has_sending_chain());
        assert_eq!(state.remote_registration_id(), 2);
        assert_eq!(state.pending_pre_key().unwrap().pre_key_id, Some(5));
        assert_eq!(store.identity(&bob).unwrap(), Some(bundle.identity_key));
    }

    #[test]
    fn test_second_bundle_archives_old_state() {
        let crypto = DefaultCryptoProvider::new();
        let (_, bundle) = responder(&crypto);
        let mut store =
            InMemoryProtocolStore::new(IdentityKeyPair::generate(&crypto).unwrap(), 1);
        let bob = ProtocolAddress::new("bob", 1);

        let mut builder = SessionBuilder::new(&mut store, &crypto, bob.clone());
        builder.process_pre_key_bundle(&bundle).unwrap();
        builder.process_pre_key_bundle(&bundle).unwrap();

        let record = store.load_session(&bob).unwrap().unwrap();
        assert_eq!(record.previous_session_states().count(), 1);
    }

    #[test]
    fn test_missing_signed_pre_key() {
        let crypto = DefaultCryptoProvider::new();
        let (mut bob_store, bundle) = responder(&crypto);
        bob_store.remove_signed_pre_key(1).unwrap();

        let alice_identity = IdentityKeyPair::generate(&crypto).unwrap();
        let message = PreKeySignalMessage::new(
            1,
            bundle.pre_key_id(),
            1,
            crypto.generate_key_pair().unwrap().public_key,
            *alice_identity.identity_key(),
            crate::message::SignalMessage::new(
                crypto.generate_key_pair().unwrap().public_key,
                0,
                0,
                vec![0u8; 16],
            ),
        );

        let alice = ProtocolAddress::new("alice", 1);
        let result = SessionBuilder::new(&mut bob_store, &crypto, alice.clone())
            .process_pre_key_signal_message(&message);
        assert_eq!(result, Err(Error::InvalidKeyId(1)));
        assert!(bob_store.load_session(&alice).unwrap().is_none());
        assert!(bob_store.contains_pre_key(5).unwrap());
    }
}
