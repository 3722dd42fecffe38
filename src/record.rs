//! A peer's current session state plus the states it superseded.

use std::collections::VecDeque;

use tracing::debug;

use crate::{
    config::DEFAULT_MAX_ARCHIVED_STATES,
    error::{Error, Result},
    keys::PublicKey,
    state::SessionState,
};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SessionRecord {
    current: Option<SessionState>,
    /// Most recently archived first.
    previous: VecDeque<SessionState>,
}

impl SessionRecord {
    /// A record with no session state.
    #[must_use]
    pub fn new_fresh() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(state: SessionState) -> Self {
        Self {
            current: Some(state),
            previous: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn session_state(&self) -> Option<&SessionState> {
        self.current.as_ref()
    }

    pub(crate) fn session_state_mut(&mut self) -> Option<&mut SessionState> {
        self.current.as_mut()
    }

    pub fn previous_session_states(&self) -> impl Iterator<Item = &SessionState> + '_ {
        self.previous.iter()
    }

    #[must_use]
    pub fn is_fresh(&self) -> bool {
        self.current.is_none() && self.previous.is_empty()
    }

    /// Whether the current or an archived state was created from `base_key`.
    #[must_use]
    pub fn has_session_state(&self, version: u8, base_key: &PublicKey) -> bool {
        self.current
            .iter()
            .chain(self.previous.iter())
            .any(|state| state.version() == version && state.base_key() == base_key)
    }

    /// Moves the current state to the front of the archive.
    pub fn archive_current_state(&mut self) {
        self.archive_current_state_bounded(DEFAULT_MAX_ARCHIVED_STATES);
    }

    pub(crate) fn archive_current_state_bounded(&mut self, max_archived: usize) {
        if let Some(state) = self.current.take() {
            debug!(archived = self.previous.len() + 1, "archived session state");
            self.previous.push_front(state);
            self.previous.truncate(max_archived);
        }
    }

    /// Archives the current state and installs `state`.
    pub fn promote_state(&mut self, state: SessionState) {
        self.promote_state_bounded(state, DEFAULT_MAX_ARCHIVED_STATES);
    }

    pub(crate) fn promote_state_bounded(&mut self, state: SessionState, max_archived: usize) {
        self.archive_current_state_bounded(max_archived);
        self.current = Some(state);
    }

    /// Makes archived state `index` current, archiving the old current one.
    pub fn promote_previous_state(&mut self, index: usize) -> Result<()> {
        self.promote_previous_state_bounded(index, DEFAULT_MAX_ARCHIVED_STATES)
    }

    pub(crate) fn promote_previous_state_bounded(
        &mut self,
        index: usize,
        max_archived: usize,
    ) -> Result<()> {
        let state = self.previous.remove(index).ok_or(Error::InvalidState)?;
        self.promote_state_bounded(state, max_archived);
        Ok(())
    }

    /// Replaces archived state `index` in place.
    pub(crate) fn set_previous_state(&mut self, index: usize, state: SessionState) -> Result<()> {
        let slot = self.previous.get_mut(index).ok_or(Error::InvalidState)?;
        *slot = state;
        Ok(())
    }

    #[cfg(feature = "serde")]
    pub fn serialize(&self) -> Result<Vec<u8>> {
        Ok(bincode::serde::encode_to_vec(
            self,
            bincode::config::standard(),
        )?)
    }

    #[cfg(feature = "serde")]
    pub fn deserialize(bytes: &[u8]) -> Result<Self> {
        let (record, read) =
            bincode::serde::decode_from_slice(bytes, bincode::config::standard())?;
        if read != bytes.len() {
            return Err(Error::SerializationError);
        }
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        crypto::{CryptoProvider, DefaultCryptoProvider},
        keys::IdentityKey,
        ratchet::RootKey,
    };

    fn state(crypto: &DefaultCryptoProvider) -> SessionState {
        let identity = IdentityKey::new(crypto.generate_key_pair().unwrap().public_key);
        let base_key = crypto.generate_key_pair().unwrap().public_key;
        SessionState::new(identity, identity, RootKey::from_bytes([0u8; 32]), base_key)
    }

    #[test]
    fn test_archive_and_promote() {
        let crypto = DefaultCryptoProvider::new();
        let first = state(&crypto);
        let second = state(&crypto);

        let mut record = SessionRecord::new(first.clone());
        record.promote_state(second.clone());

        assert_eq!(record.session_state(), Some(&second));
        assert_eq!(record.previous_session_states().next(), Some(&first));
        assert!(record.has_session_state(3, first.base_key()));
        assert!(!record.has_session_state(2, first.base_key()));

        record.promote_previous_state(0).unwrap();
        assert_eq!(record.session_state(), Some(&first));
        assert_eq!(record.previous_session_states().next(), Some(&second));
        assert_eq!(record.promote_previous_state(5), Err(Error::InvalidState));
    }

    #[test]
    fn test_archive_is_bounded() {
        let crypto = DefaultCryptoProvider::new();
        let mut record = SessionRecord::new_fresh();
        assert!(record.is_fresh());

        let states: Vec<SessionState> = (0..45).map(|_| state(&crypto)).collect();
        for state in &states {
            record.promote_state(state.clone());
        }

        assert_eq!(record.previous_session_states().count(), 40);
        assert!(!record.has_session_state(3, states[3].base_key()));
        assert!(record.has_session_state(3, states[4].base_key()));
    }

    #[test]
    fn test_archive_fresh_record_is_noop() {
        let mut record = SessionRecord::new_fresh();
        record.archive_current_state();
        assert!(record.is_fresh());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialization_roundtrip() {
        let crypto = DefaultCryptoProvider::new();
        let mut record = SessionRecord::new(state(&crypto));
        record.archive_current_state();
        record.promote_state(state(&crypto));

        let bytes = record.serialize().unwrap();
        assert_eq!(SessionRecord::deserialize(&bytes).unwrap(), record);
        assert_eq!(
            SessionRecord::deserialize(&bytes[..bytes.len() / 2]),
            Err(Error::SerializationError)
        );
    }
}
