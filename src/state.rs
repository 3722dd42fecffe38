//! Per-peer ratchet state.
//!
//! A [`SessionState`] holds the root key, at most one sending chain and a
//! bounded list of receiving chains keyed by the remote ratchet key. All
//! mutation goes through [`SessionCipher`](crate::SessionCipher), which works
//! on a copy and only stores it once a message has been authenticated.

use std::collections::VecDeque;

use tracing::{debug, trace, warn};

use crate::{
    config::SessionConfig,
    crypto::CryptoProvider,
    error::{Error, Result},
    keys::{IdentityKey, KeyPair, PublicKey},
    message::CURRENT_VERSION,
    ratchet::{ChainKey, MessageKeys, RootKey},
};

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SendingChain {
    ratchet_key: KeyPair,
    chain_key: ChainKey,
}

impl SendingChain {
    #[must_use]
    pub fn new(ratchet_key: KeyPair, chain_key: ChainKey) -> Self {
        Self {
            ratchet_key,
            chain_key,
        }
    }

    #[must_use]
    pub fn ratchet_key(&self) -> &KeyPair {
        &self.ratchet_key
    }

    #[must_use]
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    /// Counter the next outgoing message will carry.
    #[must_use]
    pub fn index(&self) -> u32 {
        self.chain_key.index()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ReceivingChain {
    ratchet_key: PublicKey,
    chain_key: ChainKey,
    message_keys: VecDeque<MessageKeys>,
}

impl ReceivingChain {
    #[must_use]
    pub fn new(ratchet_key: PublicKey, chain_key: ChainKey) -> Self {
        Self {
            ratchet_key,
            chain_key,
            message_keys: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn ratchet_key(&self) -> &PublicKey {
        &self.ratchet_key
    }

    #[must_use]
    pub fn chain_key(&self) -> &ChainKey {
        &self.chain_key
    }

    #[must_use]
    pub fn index(&self) -> u32 {
        self.chain_key.index()
    }

    /// Counters of skipped messages whose keys are still cached.
    pub fn cached_counters(&self) -> impl Iterator<Item = u32> + '_ {
        self.message_keys.iter().map(MessageKeys::counter)
    }

    fn take_cached(&mut self, counter: u32) -> Option<MessageKeys> {
        let position = self
            .message_keys
            .iter()
            .position(|keys| keys.counter() == counter)?;
        self.message_keys.remove(position)
    }

    fn cache(&mut self, keys: MessageKeys, limit: usize) {
        self.message_keys.push_back(keys);
        while self.message_keys.len() > limit {
            self.message_keys.pop_front();
        }
    }

    /// Derives keys for `counter`, caching every key skipped on the way.
    ///
    /// The gap is charged against `skip_budget` before any key is derived.
    fn message_keys_for<C: CryptoProvider + ?Sized>(
        &mut self,
        crypto: &C,
        counter: u32,
        skip_budget: &mut u32,
        cache_limit: usize,
    ) -> Result<MessageKeys> {
        let index = self.chain_key.index();
        if counter < index {
            return self.take_cached(counter).ok_or_else(|| {
                warn!(counter, index, "duplicate or expired message counter");
                Error::DuplicateOrTooOld
            });
        }

        let gap = counter - index;
        check_skip(gap, *skip_budget)?;
        *skip_budget -= gap;

        let mut chain_key = self.chain_key.clone();
        while chain_key.index() < counter {
            self.cache(chain_key.message_keys(crypto)?, cache_limit);
            chain_key = chain_key.next(crypto)?;
        }
        if gap > 0 {
            trace!(skipped = gap, "cached skipped message keys");
        }

        let keys = chain_key.message_keys(crypto)?;
        self.chain_key = chain_key.next(crypto)?;
        Ok(keys)
    }
}

fn check_skip(gap: u32, skip_budget: u32) -> Result<()> {
    if gap > skip_budget {
        warn!(gap, remaining = skip_budget, "message counter too far ahead");
        return Err(Error::SkipTooFar {
            gap,
            max_skip: skip_budget,
        });
    }
    Ok(())
}

/// Initiator-side note of the pre-keys used, repeated in every outgoing
/// message until the peer has answered.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PendingPreKey {
    pub pre_key_id: Option<u32>,
    pub signed_pre_key_id: u32,
    pub base_key: PublicKey,
}

#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionState {
    version: u8,
    local_identity_key: IdentityKey,
    remote_identity_key: IdentityKey,
    root_key: RootKey,
    previous_counter: u32,
    sending_chain: Option<SendingChain>,
    receiving_chains: VecDeque<ReceivingChain>,
    /// Local ratchet key in use before the first sending chain exists.
    pending_ratchet_key: Option<KeyPair>,
    pending_pre_key: Option<PendingPreKey>,
    base_key: PublicKey,
    local_registration_id: u32,
    remote_registration_id: u32,
}

impl SessionState {
    pub(crate) fn new(
        local_identity_key: IdentityKey,
        remote_identity_key: IdentityKey,
        root_key: RootKey,
        base_key: PublicKey,
    ) -> Self {
        Self {
            version: CURRENT_VERSION,
            local_identity_key,
            remote_identity_key,
            root_key,
            previous_counter: 0,
            sending_chain: None,
            receiving_chains: VecDeque::new(),
            pending_ratchet_key: None,
            pending_pre_key: None,
            base_key,
            local_registration_id: 0,
            remote_registration_id: 0,
        }
    }

    #[must_use]
    pub fn version(&self) -> u8 {
        self.version
    }

    #[must_use]
    pub fn local_identity_key(&self) -> &IdentityKey {
        &self.local_identity_key
    }

    #[must_use]
    pub fn remote_identity_key(&self) -> &IdentityKey {
        &self.remote_identity_key
    }

    #[must_use]
    pub fn root_key(&self) -> &RootKey {
        &self.root_key
    }

    /// Sending-chain index at the last DH-ratchet step. Decrypting on an
    /// existing chain leaves it unchanged.
    #[must_use]
    pub fn previous_counter(&self) -> u32 {
        self.previous_counter
    }

    #[must_use]
    pub fn sending_chain(&self) -> Option<&SendingChain> {
        self.sending_chain.as_ref()
    }

    #[must_use]
    pub fn has_sending_chain(&self) -> bool {
        self.sending_chain.is_some()
    }

    /// Receiving chains, oldest first.
    pub fn receiving_chains(&self) -> impl Iterator<Item = &ReceivingChain> + '_ {
        self.receiving_chains.iter()
    }

    #[must_use]
    pub fn receiving_chain(&self, ratchet_key: &PublicKey) -> Option<&ReceivingChain> {
        self.receiving_chains
            .iter()
            .find(|chain| chain.ratchet_key == *ratchet_key)
    }

    #[must_use]
    pub fn pending_ratchet_key(&self) -> Option<&KeyPair> {
        self.pending_ratchet_key.as_ref()
    }

    #[must_use]
    pub fn pending_pre_key(&self) -> Option<&PendingPreKey> {
        self.pending_pre_key.as_ref()
    }

    /// The initiator's ephemeral key. Identifies the session.
    #[must_use]
    pub fn base_key(&self) -> &PublicKey {
        &self.base_key
    }

    #[must_use]
    pub fn local_registration_id(&self) -> u32 {
        self.local_registration_id
    }

    #[must_use]
    pub fn remote_registration_id(&self) -> u32 {
        self.remote_registration_id
    }

    pub(crate) fn set_sending_chain(&mut self, chain: SendingChain) {
        self.sending_chain = Some(chain);
    }

    pub(crate) fn set_pending_ratchet_key(&mut self, key_pair: KeyPair) {
        self.pending_ratchet_key = Some(key_pair);
    }

    pub(crate) fn set_pending_pre_key(&mut self, pending: PendingPreKey) {
        self.pending_pre_key = Some(pending);
    }

    pub(crate) fn clear_pending_pre_key(&mut self) {
        self.pending_pre_key = None;
    }

    pub(crate) fn set_registration_ids(&mut self, local: u32, remote: u32) {
        self.local_registration_id = local;
        self.remote_registration_id = remote;
    }

    /// Replaces every receiving chain with `chain`.
    pub(crate) fn set_initial_receiving_chain(&mut self, chain: ReceivingChain) {
        self.receiving_chains.clear();
        self.receiving_chains.push_back(chain);
    }

    /// Appends a receiving chain, evicting the oldest beyond `max_chains`.
    pub(crate) fn add_receiving_chain(&mut self, chain: ReceivingChain, max_chains: usize) {
        self.receiving_chains.push_back(chain);
        while self.receiving_chains.len() > max_chains.max(1) {
            self.receiving_chains.pop_front();
        }
    }

    /// Keys for the next outgoing message; advances the sending chain.
    ///
    /// Returns the keys together with the ratchet public key to put in the
    /// message header.
    pub(crate) fn next_sending_keys<C: CryptoProvider + ?Sized>(
        &mut self,
        crypto: &C,
    ) -> Result<(MessageKeys, PublicKey)> {
        let chain = self.sending_chain.as_mut().ok_or(Error::InvalidState)?;
        let keys = chain.chain_key.message_keys(crypto)?;
        chain.chain_key = chain.chain_key.next(crypto)?;
        trace!(counter = keys.counter(), "advanced sending chain");
        Ok((keys, chain.ratchet_key.public_key))
    }

    /// Keys for an incoming message, running a DH-ratchet step first when
    /// `their_ratchet_key` has not been seen.
    ///
    /// Skipped keys derived here are subtracted from `skip_budget`; a gap
    /// beyond what is left fails with [`Error::SkipTooFar`] before any DH or
    /// chain work.
    pub(crate) fn receiving_keys<C: CryptoProvider + ?Sized>(
        &mut self,
        crypto: &C,
        their_ratchet_key: &PublicKey,
        counter: u32,
        config: &SessionConfig,
        skip_budget: &mut u32,
    ) -> Result<MessageKeys> {
        let position = match self
            .receiving_chains
            .iter()
            .position(|chain| chain.ratchet_key == *their_ratchet_key)
        {
            Some(position) => position,
            None => {
                // A new chain starts at index 0
                check_skip(counter, *skip_budget)?;
                self.dh_ratchet(crypto, their_ratchet_key, config.max_receiver_chains)?
            }
        };
        let chain = self
            .receiving_chains
            .get_mut(position)
            .ok_or(Error::InvalidState)?;
        chain.message_keys_for(crypto, counter, skip_budget, config.max_cached_message_keys())
    }

    /// Derives a receiving chain for `their_ratchet_key` and a fresh sending
    /// chain. Returns the position of the new receiving chain.
    fn dh_ratchet<C: CryptoProvider + ?Sized>(
        &mut self,
        crypto: &C,
        their_ratchet_key: &PublicKey,
        max_chains: usize,
    ) -> Result<usize> {
        let our_ratchet_key = self
            .sending_chain
            .as_ref()
            .map(|chain| &chain.ratchet_key)
            .or(self.pending_ratchet_key.as_ref())
            .ok_or(Error::InvalidState)?;

        let (root_key, receiving_chain_key) = self
            .root_key
            .create_chain(crypto, their_ratchet_key, our_ratchet_key)
            .map_err(|_| Error::InvalidMessage)?;

        let new_ratchet_key = crypto.generate_key_pair()?;
        let (root_key, sending_chain_key) =
            root_key.create_chain(crypto, their_ratchet_key, &new_ratchet_key)?;

        self.previous_counter = self.sending_chain.as_ref().map_or(0, SendingChain::index);
        self.root_key = root_key;
        self.sending_chain = Some(SendingChain::new(new_ratchet_key, sending_chain_key));
        self.pending_ratchet_key = None;
        self.add_receiving_chain(
            ReceivingChain::new(*their_ratchet_key, receiving_chain_key),
            max_chains,
        );
        debug!(
            previous_counter = self.previous_counter,
            receiving_chains = self.receiving_chains.len(),
            "performed DH ratchet step"
        );

        Ok(self.receiving_chains.len() - 1)
    }
}
